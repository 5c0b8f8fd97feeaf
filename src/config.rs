//! Agent-wide configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the adapter instance, loaded once at startup.
///
/// Every field has a documented environment variable and a sane default,
/// and nothing here panics: invalid values fall back to defaults with a
/// `tracing::warn!`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path or bare name of the `cursor-agent` executable.
    pub cursor_agent_bin: String,
    /// Directory session JSON files are persisted under.
    pub session_dir: PathBuf,
    /// A session whose `lastActivity` is older than this is evicted by the sweep.
    pub session_timeout: Duration,
    /// Maximum number of live sessions held in memory at once.
    pub max_sessions: usize,
    /// Per-attempt subprocess timeout for the cursor bridge.
    pub cursor_timeout: Duration,
    /// Number of retries (in addition to the first attempt) for bridge commands.
    pub cursor_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cursor_agent_bin: "cursor-agent".to_string(),
            session_dir: default_session_dir(),
            session_timeout: Duration::from_secs(86_400),
            max_sessions: 256,
            cursor_timeout: Duration::from_millis(120_000),
            cursor_retries: 2,
        }
    }
}

fn default_session_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cursor-agent-acp")
        .join("sessions")
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cursor_agent_bin =
            std::env::var("CURSOR_AGENT_BIN").unwrap_or(defaults.cursor_agent_bin);

        let session_dir = std::env::var_os("CURSOR_AGENT_ACP_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_dir);

        let session_timeout = parse_env_secs(
            "CURSOR_AGENT_ACP_SESSION_TIMEOUT_SECS",
            defaults.session_timeout,
        );

        let max_sessions = parse_env(
            "CURSOR_AGENT_ACP_MAX_SESSIONS",
            defaults.max_sessions,
        );

        let cursor_timeout = parse_env_millis(
            "CURSOR_AGENT_ACP_TIMEOUT_MS",
            defaults.cursor_timeout,
        );

        let cursor_retries = parse_env("CURSOR_AGENT_ACP_RETRIES", defaults.cursor_retries);

        Self {
            cursor_agent_bin,
            session_dir,
            session_timeout,
            max_sessions,
            cursor_timeout,
            cursor_retries,
        }
    }

    /// Validate the configuration is usable: the session directory can be
    /// created (or already exists) and is writable. Used by `--validate`.
    pub fn validate(&self) -> crate::error::Result<()> {
        std::fs::create_dir_all(&self.session_dir)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn parse_env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_are_sane() {
        for key in [
            "CURSOR_AGENT_BIN",
            "CURSOR_AGENT_ACP_SESSION_DIR",
            "CURSOR_AGENT_ACP_SESSION_TIMEOUT_SECS",
            "CURSOR_AGENT_ACP_MAX_SESSIONS",
            "CURSOR_AGENT_ACP_TIMEOUT_MS",
            "CURSOR_AGENT_ACP_RETRIES",
        ] {
            unsafe { std::env::remove_var(key) };
        }
        let config = AppConfig::from_env();
        assert_eq!(config.cursor_agent_bin, "cursor-agent");
        assert_eq!(config.max_sessions, 256);
        assert_eq!(config.cursor_retries, 2);
    }

    #[test]
    #[serial]
    fn env_overrides_are_honored() {
        unsafe {
            std::env::set_var("CURSOR_AGENT_BIN", "/opt/cursor/bin/cursor-agent");
            std::env::set_var("CURSOR_AGENT_ACP_MAX_SESSIONS", "10");
            std::env::set_var("CURSOR_AGENT_ACP_RETRIES", "5");
        }
        let config = AppConfig::from_env();
        assert_eq!(config.cursor_agent_bin, "/opt/cursor/bin/cursor-agent");
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.cursor_retries, 5);
        unsafe {
            std::env::remove_var("CURSOR_AGENT_BIN");
            std::env::remove_var("CURSOR_AGENT_ACP_MAX_SESSIONS");
            std::env::remove_var("CURSOR_AGENT_ACP_RETRIES");
        }
    }

    #[test]
    #[serial]
    fn malformed_numeric_env_falls_back_to_default() {
        unsafe { std::env::set_var("CURSOR_AGENT_ACP_MAX_SESSIONS", "not-a-number") };
        let config = AppConfig::from_env();
        assert_eq!(config.max_sessions, 256);
        unsafe { std::env::remove_var("CURSOR_AGENT_ACP_MAX_SESSIONS") };
    }
}
