//! Command-line surface: flags controlling logging/tracing, a `--validate`
//! short-circuit, an `auth` subcommand, and a default mode that runs the
//! stdio server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bridges an ACP-compliant editor to the `cursor-agent` CLI over JSON-RPC
/// on stdio.
#[derive(Parser, Debug, Clone)]
#[command(name = "cursor-agent-acp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Check that configuration loads and the session directory is
    /// writable, then exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Enable diagnostic mode (auto-log to a file).
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode).
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode).
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    /// RUST_LOG, if set, takes priority over this flag.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only). RUST_LOG takes priority over this flag.
    #[arg(short, long)]
    pub quiet: bool,

    /// OpenTelemetry OTLP endpoint. Accepted but ignored when the `otel`
    /// feature is disabled.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// OpenTelemetry service name.
    #[arg(long, value_name = "NAME", default_value = "cursor-agent-acp")]
    pub otel_service_name: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage `cursor-agent` CLI authentication.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Logout,
    Status,
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            command: None,
            validate: false,
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            otel_endpoint: None,
            otel_service_name: "cursor-agent-acp".to_string(),
        }
    }
}

impl Cli {
    /// True if `--diagnostic`, `--log-dir`, or `--log-file` was given.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    #[cfg(feature = "otel")]
    pub fn is_otel_enabled(&self) -> bool {
        self.otel_endpoint.is_some()
    }

    #[cfg(not(feature = "otel"))]
    pub fn is_otel_enabled(&self) -> bool {
        if self.otel_endpoint.is_some() {
            tracing::warn!("--otel-endpoint specified but the otel feature is not enabled, ignoring");
        }
        false
    }

    /// `--quiet` -> ERROR, default -> INFO, `-v` -> DEBUG, `-vv`+ -> TRACE.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Log file path for diagnostic mode: the given dir/file, or a
    /// timestamped default under the system temp directory.
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);
        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("cursor-agent-acp-{timestamp}.log")
        });
        dir.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cli_runs_quietly_at_info() {
        let cli = Cli::default();
        assert!(!cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn log_dir_or_file_implies_diagnostic() {
        assert!(Cli { log_dir: Some(PathBuf::from("/tmp")), ..Default::default() }.is_diagnostic());
        assert!(Cli { log_file: Some("x.log".into()), ..Default::default() }.is_diagnostic());
    }

    #[test]
    fn verbosity_maps_to_level() {
        assert_eq!(Cli { quiet: true, ..Default::default() }.log_level(), tracing::Level::ERROR);
        assert_eq!(Cli { verbose: 1, ..Default::default() }.log_level(), tracing::Level::DEBUG);
        assert_eq!(Cli { verbose: 5, ..Default::default() }.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn log_path_honors_explicit_dir_and_file() {
        let cli = Cli { log_dir: Some(PathBuf::from("/var/log")), log_file: Some("x.log".into()), ..Default::default() };
        assert_eq!(cli.log_path(), PathBuf::from("/var/log/x.log"));
    }
}
