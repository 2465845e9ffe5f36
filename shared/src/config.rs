/// Runtime configuration for the bootstrapper.
///
/// Everything is read from `STREAMBOOT_*` environment variables (a `.env`
/// file is loaded by the binary first). Unparsable numbers fall back to the
/// defaults rather than aborting startup.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_LOCK_PATH: &str = "/tmp/streamdownload.lock";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_LOG_CAPACITY: usize = 200;
pub const DEFAULT_ENTRY: &str = "python3 -c \"import main; main.main()\"";
pub const DEFAULT_SECRETS_FILE: &str = ".streamlit/secrets.toml";

#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Sentinel file marking a completed download.
    pub lock_path: PathBuf,
    /// Directory bundle paths are resolved against.
    pub target_dir: PathBuf,
    pub request_timeout: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause after a transport error.
    pub retry_delay: Duration,
    pub log_capacity: usize,
    /// When set, the rendered log is rewritten to this file on every write.
    pub log_view_path: Option<PathBuf>,
    pub mirror_stderr: bool,
    /// When set, the HTTP log viewer binds here.
    pub view_addr: Option<SocketAddr>,
    /// Command line that starts the downloaded application.
    pub entry_command: String,
    pub secrets_file: PathBuf,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            target_dir: PathBuf::from("."),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_view_path: None,
            mirror_stderr: true,
            view_addr: None,
            entry_command: DEFAULT_ENTRY.to_string(),
            secrets_file: PathBuf::from(DEFAULT_SECRETS_FILE),
        }
    }
}

impl BootConfig {
    /// Read configuration from the process environment.
    ///
    /// Returns the config plus any warnings about ignored values. Loading runs
    /// before logging is set up, so the caller logs them with [`log_warnings`].
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut warnings = Vec::new();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let lock_path = var("STREAMBOOT_LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.lock_path);
        let target_dir = var("STREAMBOOT_TARGET_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.target_dir);
        let request_timeout = var("STREAMBOOT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let max_attempts = var("STREAMBOOT_MAX_ATTEMPTS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_attempts)
            .max(1);
        let retry_delay = var("STREAMBOOT_RETRY_DELAY_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);
        let log_capacity = var("STREAMBOOT_LOG_CAPACITY")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.log_capacity)
            .max(1);
        let log_view_path = var("STREAMBOOT_LOG_VIEW").map(PathBuf::from);
        let mirror_stderr = var("STREAMBOOT_LOG_STDERR")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.mirror_stderr);
        let view_addr = var("STREAMBOOT_VIEW_ADDR").and_then(|v| match v.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warnings.push(format!("Ignoring STREAMBOOT_VIEW_ADDR={}: {}", v, e));
                None
            }
        });
        let entry_command = var("STREAMBOOT_ENTRY").unwrap_or(defaults.entry_command);
        let secrets_file = var("STREAMBOOT_SECRETS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.secrets_file);

        let config = Self {
            lock_path,
            target_dir,
            request_timeout,
            max_attempts,
            retry_delay,
            log_capacity,
            log_view_path,
            mirror_stderr,
            view_addr,
            entry_command,
            secrets_file,
        };
        (config, warnings)
    }
}

/// Emit configuration warnings once a subscriber is installed.
pub fn log_warnings(warnings: &[String]) {
    for warning in warnings {
        warn!("{}", warning);
    }
}
