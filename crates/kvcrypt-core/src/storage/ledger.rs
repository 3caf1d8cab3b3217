use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted encryption status of one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusRecord {
    pub encrypted: bool,
    /// Keystore alias, `None` when the key is caller-managed.
    pub alias: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(encrypted: bool, alias: Option<String>) -> Self {
        Self {
            encrypted,
            alias,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger could not be read or written durably.
    #[error("ledger persistence failed: {reason}")]
    Persistence { reason: String },
    /// The persisted ledger is not valid.
    #[error("ledger is corrupt: {reason}")]
    Corrupt { reason: String },
}

/// Source of truth for which instances are encrypted, consulted on the next
/// start before the engine is.
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Create or overwrite the record for `instance_id`. Returns only once the
    /// write is durable.
    async fn record(
        &self,
        instance_id: &str,
        encrypted: bool,
        alias: Option<&str>,
    ) -> Result<(), LedgerError>;

    async fn lookup(&self, instance_id: &str) -> Result<Option<StatusRecord>, LedgerError>;

    /// Snapshot of every record, ordered by instance id.
    async fn entries(&self) -> Result<BTreeMap<String, StatusRecord>, LedgerError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    records: BTreeMap<String, StatusRecord>,
    failing: bool,
}

/// Volatile ledger for tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record` fail with [`LedgerError::Persistence`].
    /// Reads keep working.
    pub fn set_failing(&self, failing: bool) -> Result<(), LedgerError> {
        self.lock()?.failing = failing;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, LedgerError> {
        self.inner.lock().map_err(|err| LedgerError::Persistence {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl StatusLedger for InMemoryLedger {
    async fn record(
        &self,
        instance_id: &str,
        encrypted: bool,
        alias: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        if state.failing {
            return Err(LedgerError::Persistence {
                reason: "simulated write failure".to_string(),
            });
        }
        state.records.insert(
            instance_id.to_string(),
            StatusRecord::new(encrypted, alias.map(str::to_string)),
        );
        Ok(())
    }

    async fn lookup(&self, instance_id: &str) -> Result<Option<StatusRecord>, LedgerError> {
        Ok(self.lock()?.records.get(instance_id).cloned())
    }

    async fn entries(&self) -> Result<BTreeMap<String, StatusRecord>, LedgerError> {
        Ok(self.lock()?.records.clone())
    }
}
