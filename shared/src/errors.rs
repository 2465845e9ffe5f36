/// Unified error types for streamboot.
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for setup and configuration failures.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secrets file error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse classification of a download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing secrets or an unusable client setup. Never retried.
    Config,
    /// Network error or timeout before any response arrived.
    Transport,
    /// The server answered, but not with an accepted bundle.
    Protocol,
    /// Writing the bundle to disk failed.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Io => write!(f, "io"),
        }
    }
}

/// Errors produced while fetching and materializing a bundle.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Missing secrets: url={url} streamuser={streamuser} key={key}")]
    MissingSecrets {
        url: bool,
        streamuser: bool,
        key: bool,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Every attempt ended in a transport error. `last` is the final attempt's message.
    #[error("Download failed: {last}")]
    Transport { attempts: u32, last: String },

    #[error("Download failed: HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Download failed: Bad status: {payload}")]
    BadStatus { payload: String },

    #[error("Download failed: invalid bundle payload: {0}")]
    Parse(String),

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::MissingSecrets { .. } | DownloadError::Client(_) => ErrorKind::Config,
            DownloadError::Transport { .. } => ErrorKind::Transport,
            DownloadError::Http { .. }
            | DownloadError::BadStatus { .. }
            | DownloadError::Parse(_) => ErrorKind::Protocol,
            DownloadError::Write { .. } => ErrorKind::Io,
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Only transport failures qualify; an HTTP answer of any kind ends the
    /// retry loop.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

/// Result type alias for streamboot setup operations.
pub type BootResult<T> = Result<T, BootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_secrets_message_lists_presence() {
        let err = DownloadError::MissingSecrets {
            url: true,
            streamuser: false,
            key: true,
        };
        assert_eq!(
            err.to_string(),
            "Missing secrets: url=true streamuser=false key=true"
        );
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_http_error_is_protocol() {
        let err = DownloadError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "Download failed: HTTP 500: boom");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_transport_error_is_retriable() {
        let err = DownloadError::Transport {
            attempts: 3,
            last: "Attempt 3 error: connection refused".into(),
        };
        assert!(err.is_retriable());
        assert_eq!(
            err.to_string(),
            "Download failed: Attempt 3 error: connection refused"
        );
    }
}
