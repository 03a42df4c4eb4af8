//! CLI definitions for Conductor.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conductor CLI.
#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Error-recovery core: retries, circuit breakers, dead letters, schedules and webhooks")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/conductor.toml", global = true, env = "CONDUCTOR_CONFIG")]
    pub config: PathBuf,

    /// Data directory for logs and file-backed stores (overrides general.data_dir)
    #[arg(long, global = true, env = "CONDUCTOR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Emit console logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the recovery workers in the foreground (default)
    Run,

    /// Cron expression tools
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },

    /// Configuration tools
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum CronAction {
    /// Print the upcoming fire times of an expression
    Next {
        /// Five-field cron expression, e.g. "*/15 9-17 * * 1-5"
        expression: String,

        /// Number of fire times to print
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// IANA timezone the expression is evaluated in
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },

    /// Check that an expression parses
    Validate {
        expression: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Validate the configuration file
    Validate,

    /// Print the effective configuration as TOML
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cron_next() {
        let cli = Cli::try_parse_from([
            "conductor",
            "--log-json",
            "cron",
            "next",
            "0 9 * * 1",
            "-n",
            "3",
            "--timezone",
            "Europe/Berlin",
        ])
        .unwrap();
        assert!(cli.log_json);
        match cli.command {
            Some(Commands::Cron {
                action:
                    CronAction::Next {
                        expression,
                        count,
                        timezone,
                    },
            }) => {
                assert_eq!(expression, "0 9 * * 1");
                assert_eq!(count, 3);
                assert_eq!(timezone, "Europe/Berlin");
            }
            _ => panic!("expected cron next"),
        }
    }

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["conductor", "--data-dir", "/tmp/c"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/c")));
    }
}
