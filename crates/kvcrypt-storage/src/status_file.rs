use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use kvcrypt_core::storage::{LedgerError, StatusLedger, StatusRecord};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// File name of the ledger inside the data directory.
pub const LEDGER_FILE: &str = "encryption-status.json";

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    instances: BTreeMap<String, StatusRecord>,
}

/// Status ledger persisted as a JSON document.
///
/// Every `record` rewrites the whole document through a temp file in the same
/// directory, fsyncs it and renames it into place, so a crash leaves either the
/// old or the new ledger on disk.
pub struct FileStatusLedger {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, StatusRecord>>,
}

impl FileStatusLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let instances = read_ledger(&path)?;
        debug!(?path, entries = instances.len(), "opened status ledger");
        Ok(Self {
            path,
            cache: Mutex::new(instances),
        })
    }

    /// Open `LEDGER_FILE` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open(dir.as_ref().join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StatusRecord>>, LedgerError> {
        self.cache.lock().map_err(|err| LedgerError::Persistence {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl StatusLedger for FileStatusLedger {
    #[instrument(skip_all, fields(instance_id = %instance_id, encrypted = encrypted))]
    async fn record(
        &self,
        instance_id: &str,
        encrypted: bool,
        alias: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut cache = self.lock()?;
        let mut next = cache.clone();
        next.insert(
            instance_id.to_string(),
            StatusRecord::new(encrypted, alias.map(str::to_string)),
        );

        write_ledger(&self.path, &next)?;
        *cache = next;
        Ok(())
    }

    async fn lookup(&self, instance_id: &str) -> Result<Option<StatusRecord>, LedgerError> {
        Ok(self.lock()?.get(instance_id).cloned())
    }

    async fn entries(&self) -> Result<BTreeMap<String, StatusRecord>, LedgerError> {
        Ok(self.lock()?.clone())
    }
}

fn read_ledger(path: &Path) -> Result<BTreeMap<String, StatusRecord>, LedgerError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(persistence_err(err)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    let file: LedgerFile = serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
        reason: e.to_string(),
    })?;
    if file.version != LEDGER_VERSION {
        return Err(LedgerError::Corrupt {
            reason: format!(
                "unsupported ledger version {} (expected {LEDGER_VERSION})",
                file.version
            ),
        });
    }
    Ok(file.instances)
}

fn write_ledger(path: &Path, instances: &BTreeMap<String, StatusRecord>) -> Result<(), LedgerError> {
    let parent = path.parent().ok_or_else(|| LedgerError::Persistence {
        reason: "invalid ledger path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(persistence_err)?;

    let file = LedgerFile {
        version: LEDGER_VERSION,
        instances: instances.clone(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(persistence_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(persistence_err)?;
    tmp.write_all(&json).map_err(persistence_err)?;
    tmp.flush().map_err(persistence_err)?;
    tmp.as_file().sync_all().map_err(persistence_err)?;
    tmp.persist(path).map_err(|e| persistence_err(e.error))?;
    sync_dir(parent)
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), LedgerError> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(persistence_err)
}

// Windows cannot open a directory as a file; `persist` uses MoveFileEx there.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), LedgerError> {
    Ok(())
}

fn persistence_err<E: ToString>(err: E) -> LedgerError {
    LedgerError::Persistence {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = FileStatusLedger::in_dir(dir.path()).expect("open");
        assert!(ledger.entries().await.expect("entries").is_empty());
        assert!(!ledger.path().exists());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let ledger = FileStatusLedger::in_dir(dir.path()).expect("open");
            ledger
                .record("orders", true, Some("6170705f6f7264657273"))
                .await
                .expect("record orders");
            ledger
                .record("cache", true, None)
                .await
                .expect("record cache");
        }

        let reopened = FileStatusLedger::in_dir(dir.path()).expect("reopen");
        let orders = reopened
            .lookup("orders")
            .await
            .expect("lookup")
            .expect("orders present");
        assert!(orders.encrypted);
        assert_eq!(orders.alias.as_deref(), Some("6170705f6f7264657273"));

        let cache = reopened
            .lookup("cache")
            .await
            .expect("lookup")
            .expect("cache present");
        assert_eq!(cache.alias, None);
    }

    #[tokio::test]
    async fn record_overwrites_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = FileStatusLedger::in_dir(dir.path()).expect("open");
        ledger
            .record("orders", true, Some("6f72"))
            .await
            .expect("encrypt");
        ledger.record("orders", false, None).await.expect("decrypt");

        let on_disk = fs::read_to_string(ledger.path()).expect("read ledger");
        let parsed: LedgerFile = serde_json::from_str(&on_disk).expect("parse");
        assert_eq!(parsed.instances.len(), 1);
        assert!(!parsed.instances["orders"].encrypted);
        assert_eq!(parsed.instances["orders"].alias, None);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(LEDGER_FILE);
        fs::write(&path, b"{not json").expect("write");

        let err = FileStatusLedger::open(&path)
            .err()
            .expect("open should fail");
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(LEDGER_FILE);
        fs::write(&path, br#"{"version":9,"instances":{}}"#).expect("write");

        let err = FileStatusLedger::open(&path)
            .err()
            .expect("open should fail");
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn write_ledger_syncs_into_missing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(LEDGER_FILE);
        let mut instances = BTreeMap::new();
        instances.insert("orders".to_string(), StatusRecord::new(true, None));

        write_ledger(&path, &instances).expect("write");
        assert_eq!(read_ledger(&path).expect("read"), instances);
        sync_dir(dir.path()).expect("sync existing dir");
    }

    #[cfg(unix)]
    #[test]
    fn sync_dir_reports_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = sync_dir(&dir.path().join("gone")).expect_err("missing dir");
        assert!(matches!(err, LedgerError::Persistence { .. }));
    }
}
