mod cli;
mod config;
mod storage;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use kvcrypt_core::{
    alias,
    keygen::KeyGenerator,
    storage::{SecureKeystore, StatusLedger, StatusRecord},
};
use kvcrypt_storage::key_generator::OsKeyGenerator;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HEALTH_CHECK_NAME: &str = "health-check";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Status { instance: None }) {
        cli::Command::Status { instance } => run_status(instance, &config).await?,
        cli::Command::Alias { name, prefix } => {
            let prefix = prefix.as_deref().unwrap_or(config.alias_prefix());
            println!("{}", alias::derive(prefix, &name));
        }
        cli::Command::Keygen => println!("{}", OsKeyGenerator.generate()?),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("kvcrypt {}", env!("CARGO_PKG_VERSION"));
}

async fn run_status(instance: Option<String>, config: &config::Config) -> Result<()> {
    let ledger = storage::ledger_from_config(config)?;
    for line in status_lines(&ledger, instance.as_deref()).await? {
        println!("{line}");
    }
    Ok(())
}

async fn status_lines<L: StatusLedger>(ledger: &L, instance: Option<&str>) -> Result<Vec<String>> {
    let lines = match instance {
        Some(id) => match ledger.lookup(id).await? {
            Some(record) => vec![format_record(id, &record)],
            None => vec![format!("{id}: no status recorded")],
        },
        None => {
            let entries = ledger.entries().await?;
            if entries.is_empty() {
                vec!["No instances recorded yet.".to_string()]
            } else {
                entries
                    .iter()
                    .map(|(id, record)| format_record(id, record))
                    .collect()
            }
        }
    };
    Ok(lines)
}

fn format_record(instance_id: &str, record: &StatusRecord) -> String {
    let state = if record.encrypted {
        "encrypted"
    } else {
        "unencrypted"
    };
    let alias = record.alias.as_deref().unwrap_or("-");
    format!(
        "{instance_id} [{state}] alias={alias} updated={}",
        record.updated_at.to_rfc3339()
    )
}

/// Runs a quick health check of the keystore and ledger paths.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let ledger = storage::ledger_from_config(config)?;
    let entries = ledger.entries().await?.len();
    println!("Ledger: ok ({entries} instances, {})", ledger.path().display());

    let keystore = storage::keystore_from_config(config);
    let check_alias = alias::derive(config.alias_prefix(), HEALTH_CHECK_NAME);
    run_keystore_health(&keystore, &check_alias, config.accessible_mode()).await?;
    println!("Keystore: ok (service {})", keystore.service());
    Ok(())
}

async fn run_keystore_health<K: SecureKeystore>(
    keystore: &K,
    check_alias: &str,
    accessible_mode: &str,
) -> Result<()> {
    let secret = OsKeyGenerator.generate()?;
    keystore.store(check_alias, &secret, accessible_mode).await?;
    let round_trip = keystore.fetch(check_alias).await?;
    keystore.remove(check_alias).await?;

    if round_trip.as_deref() != Some(secret.as_str()) {
        color_eyre::eyre::bail!("keystore round-trip failed");
    }
    info!("keystore round-trip succeeded");
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvcrypt_core::storage::{InMemoryKeystore, InMemoryLedger};

    #[tokio::test]
    async fn keystore_health_with_memory_keystore_succeeds() {
        let keystore = InMemoryKeystore::new();
        run_keystore_health(&keystore, "636865636b", "AccessibleWhenUnlocked")
            .await
            .expect("health check should succeed");
        assert!(
            keystore.is_empty().expect("is_empty"),
            "health-check entry should be removed"
        );
    }

    #[tokio::test]
    async fn keystore_health_reports_denial() {
        let keystore = InMemoryKeystore::new();
        keystore.set_unavailable(true).expect("toggle");
        run_keystore_health(&keystore, "636865636b", "AccessibleWhenUnlocked")
            .await
            .expect_err("health check should fail");
    }

    #[tokio::test]
    async fn status_lines_list_every_instance() {
        let ledger = InMemoryLedger::new();
        ledger
            .record("orders", true, Some("6170705f6f7264657273"))
            .await
            .expect("record");
        ledger.record("cache", false, None).await.expect("record");

        let lines = status_lines(&ledger, None).await.expect("lines");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("cache [unencrypted] alias=-"));
        assert!(lines[1].starts_with("orders [encrypted] alias=6170705f6f7264657273"));
    }

    #[tokio::test]
    async fn status_lines_for_unknown_instance() {
        let ledger = InMemoryLedger::new();
        let lines = status_lines(&ledger, Some("orders")).await.expect("lines");
        assert_eq!(lines, vec!["orders: no status recorded".to_string()]);
    }
}
