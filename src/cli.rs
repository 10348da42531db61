//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "psegli")]
#[command(about = "PSEG usage bridge: cookie gateway and Home Assistant statistics importer")]
#[command(version = env!("APP_VERSION"))]
pub struct Cli {
    /// Configuration file (YAML); default locations are searched otherwise
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the cookie acquisition gateway
    Gateway,

    /// Run one sync and exit
    Sync {
        /// Days before today to include
        #[arg(long)]
        days_back: Option<u32>,
    },

    /// Sync on the configured interval until interrupted
    Run,

    /// Replace the stored cookie with a fresh one from the gateway
    RefreshCookie,

    /// Log in once through the local browser and print the cookie string
    Acquire,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_with_days_back() {
        let cli = Cli::parse_from(["psegli", "--config", "/tmp/c.yaml", "sync", "--days-back", "3"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.yaml")));
        match cli.command {
            Command::Sync { days_back } => assert_eq!(days_back, Some(3)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_flag_after_subcommand() {
        let cli = Cli::parse_from(["psegli", "refresh-cookie", "--config", "x.yaml"]);
        assert!(matches!(cli.command, Command::RefreshCookie));
        assert!(cli.config.is_some());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["psegli"]).is_err());
        assert!(Cli::try_parse_from(["psegli", "gateway"]).is_ok());
    }
}
