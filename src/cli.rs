//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Edge authentication gate - OAuth2/OIDC login in front of a web origin
#[derive(Parser, Debug)]
#[command(name = "edge-auth-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGE_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "EDGE_AUTH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "EDGE_AUTH_HOST")]
    pub host: Option<String>,

    /// Origin to forward authenticated and public requests to
    #[arg(long, env = "EDGE_AUTH_ORIGIN")]
    pub origin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "EDGE_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGE_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gate (default)
    Serve,

    /// Load and validate the configuration, then exit
    Check,

    /// Decode a token and print its header and claims (no validation)
    Inspect {
        /// Compact JWT
        #[arg(required = true)]
        token: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_server_mode() {
        let cli = Cli::try_parse_from(["edge-auth-gate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn parses_inspect_with_global_flags() {
        let cli = Cli::try_parse_from([
            "edge-auth-gate",
            "inspect",
            "a.b.c",
            "--config",
            "gate.yaml",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Command::Inspect { ref token }) if token == "a.b.c"));
        assert_eq!(cli.config, Some(PathBuf::from("gate.yaml")));
        assert_eq!(cli.log_format.as_deref(), Some("json"));
    }

    #[test]
    fn inspect_requires_token() {
        assert!(Cli::try_parse_from(["edge-auth-gate", "inspect"]).is_err());
    }
}
