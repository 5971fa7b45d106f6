//! CLI argument definitions for authwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// authwatch authentication log monitoring daemon.
///
/// Tails access and auth logs, runs the bruteforce, password spray,
/// and SQL injection detectors, and records alerts to the configured sink.
#[derive(Parser, Debug)]
#[command(name = "authwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to authwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/authwatch/authwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = DaemonCli::try_parse_from(["authwatch-daemon"]).expect("should parse");
        assert_eq!(cli.config, PathBuf::from("/etc/authwatch/authwatch.toml"));
        assert!(cli.log_level.is_none());
        assert!(cli.log_format.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn test_overrides() {
        let cli = DaemonCli::try_parse_from([
            "authwatch-daemon",
            "-c",
            "/tmp/aw.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
        ])
        .expect("should parse");
        assert_eq!(cli.config, PathBuf::from("/tmp/aw.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.validate);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        DaemonCli::command().debug_assert();
    }
}
