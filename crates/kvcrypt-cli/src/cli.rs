use clap::{Parser, Subcommand};

/// Operator CLI for inspecting and probing kvcrypt encryption state.
#[derive(Parser, Debug)]
#[command(
    name = "kvcrypt",
    about = "Inspect encryption status of key-value storage instances",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to `status` when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show ledger status for one instance, or all of them.
    Status {
        /// Instance identifier.
        instance: Option<String>,
    },
    /// Print the keystore alias derived for a name.
    Alias {
        /// Instance identifier or custom alias.
        name: String,
        /// Alias prefix; defaults to the configured one.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Generate a fresh random key and print it.
    Keygen,
    /// Check the OS keystore and the status ledger.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_status_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["kvcrypt"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_status_for_single_instance() {
        let cli = Cli::try_parse_from(["kvcrypt", "status", "orders"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Status {
                instance: Some("orders".into())
            })
        );
    }

    #[test]
    fn parses_alias_with_prefix() {
        let cli = Cli::try_parse_from(["kvcrypt", "alias", "orders", "--prefix", "app_"])
            .expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Alias {
                name: "orders".into(),
                prefix: Some("app_".into())
            })
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["kvcrypt", "config", "init"]).expect("parse");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
