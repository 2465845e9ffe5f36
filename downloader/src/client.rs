/// Lock-guarded bundle download with a fixed retry budget.
///
/// Only transport errors (connect failures, timeouts) are retried. The first
/// attempt that gets an HTTP response ends the loop, whatever the status.
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use streamboot_shared::config::BootConfig;
use streamboot_shared::errors::DownloadError;
use streamboot_shared::models::{Bundle, BundleReply};
use streamboot_shared::secrets::{Credentials, SecretsStore};
use tracing::{debug, info, warn};

use crate::bundle::write_bundle;
use crate::lock::DownloadLock;

pub const HEADER_STREAMUSER: &str = "X-Streamuser";
pub const HEADER_DOWNLOADER_KEY: &str = "X-Downloaderkey";

/// Message reported when the lock short-circuits a download.
pub const ALREADY_DOWNLOADED: &str = "already_downloaded";

/// Longest slice of an error body kept in messages.
const MAX_ERROR_BODY: usize = 200;

/// Result of one `download_files` call.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Bundle written and lock marked.
    Downloaded { files: usize, attempts: u32 },
    /// The lock was already present; nothing was fetched.
    AlreadyDownloaded,
    Failed(DownloadError),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Downloaded { .. })
    }

    /// Human-readable summary, suitable for the log.
    pub fn message(&self) -> String {
        match self {
            DownloadOutcome::Downloaded { files, .. } => format!("Downloaded {} files", files),
            DownloadOutcome::AlreadyDownloaded => ALREADY_DOWNLOADED.to_string(),
            DownloadOutcome::Failed(e) => e.to_string(),
        }
    }

    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            DownloadOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Downloads the application bundle at most once per environment.
pub struct BundleDownloader {
    config: BootConfig,
    lock: DownloadLock,
    secrets: Arc<dyn SecretsStore>,
}

impl BundleDownloader {
    pub fn new(config: BootConfig, secrets: impl SecretsStore + 'static) -> Self {
        Self {
            lock: DownloadLock::new(config.lock_path.clone()),
            config,
            secrets: Arc::new(secrets),
        }
    }

    pub fn lock(&self) -> &DownloadLock {
        &self.lock
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    /// Fetch the bundle, write it, and mark the lock.
    ///
    /// Never panics or returns early with `?`: every failure is folded into
    /// [`DownloadOutcome::Failed`] and the lock stays unmarked.
    pub async fn download_files(&self) -> DownloadOutcome {
        if self.lock.is_downloaded() {
            debug!("Lock {} present, skipping download", self.lock.path().display());
            return DownloadOutcome::AlreadyDownloaded;
        }

        let credentials = match Credentials::resolve(self.secrets.as_ref()) {
            Ok(c) => c,
            Err(e) => return DownloadOutcome::Failed(e),
        };

        let (bundle, attempts) = match self.fetch(&credentials).await {
            Ok(fetched) => fetched,
            Err(e) => return DownloadOutcome::Failed(e),
        };

        let files = match write_bundle(&self.config.target_dir, &bundle).await {
            Ok(n) => n,
            Err(e) => return DownloadOutcome::Failed(e),
        };

        self.lock.mark_downloaded();
        DownloadOutcome::Downloaded { files, attempts }
    }

    /// Run the request loop. Returns the bundle and the attempt that produced it.
    async fn fetch(&self, credentials: &Credentials) -> Result<(Bundle, u32), DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;
        let headers = auth_headers(credentials)?;
        let endpoint = credentials.endpoint();
        let max_attempts = self.config.max_attempts.max(1);

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            info!("Download attempt {}...", attempt);

            match client.get(&endpoint).headers(headers.clone()).send().await {
                Ok(response) => return read_reply(response, attempt).await,
                Err(e) => {
                    last_error = format!("Attempt {} error: {}", attempt, e);
                    warn!("{}", last_error);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }

        Err(DownloadError::Transport {
            attempts: max_attempts,
            last: last_error,
        })
    }
}

fn auth_headers(credentials: &Credentials) -> Result<HeaderMap, DownloadError> {
    let value = |name: &str, raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|e| DownloadError::Client(format!("invalid {} header value: {}", name, e)))
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-streamuser"),
        value(HEADER_STREAMUSER, &credentials.streamuser)?,
    );
    let mut key = value(HEADER_DOWNLOADER_KEY, &credentials.downloader_key)?;
    key.set_sensitive(true);
    headers.insert(HeaderName::from_static("x-downloaderkey"), key);
    Ok(headers)
}

/// Interpret the single response the loop stops on.
async fn read_reply(response: reqwest::Response, attempt: u32) -> Result<(Bundle, u32), DownloadError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| DownloadError::Transport {
        attempts: attempt,
        last: format!("Attempt {} error: {}", attempt, e),
    })?;

    if status != StatusCode::OK {
        return Err(DownloadError::Http {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    match BundleReply::from_body(&body)? {
        BundleReply::Accepted(bundle) => Ok((bundle, attempt)),
        BundleReply::Rejected(payload) => Err(DownloadError::BadStatus {
            payload: payload.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};
    use streamboot_shared::errors::ErrorKind;
    use streamboot_shared::secrets::{MapSecrets, KEY_DOWNLOADER_KEY, KEY_STREAMUSER, KEY_URL};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &Path) -> BootConfig {
        BootConfig {
            lock_path: dir.join("streamdownload.lock"),
            target_dir: dir.join("app"),
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_millis(20),
            ..BootConfig::default()
        }
    }

    fn secrets_for(url: &str) -> MapSecrets {
        MapSecrets::new()
            .with(KEY_URL, url)
            .with(KEY_STREAMUSER, "alice")
            .with(KEY_DOWNLOADER_KEY, "k3y")
    }

    fn ok_body() -> serde_json::Value {
        serde_json::json!({"status": "ok", "files": {"a.txt": "hello"}})
    }

    #[tokio::test]
    async fn test_success_writes_files_and_marks_lock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .and(header("X-Streamuser", "alice"))
            .and(header("X-Downloaderkey", "k3y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        assert!(outcome.is_success(), "{}", outcome.message());
        assert_eq!(outcome.message(), "Downloaded 1 files");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app/a.txt")).unwrap(),
            "hello"
        );
        assert!(downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_lock_present_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.lock_path, "1234").unwrap();
        let downloader = BundleDownloader::new(config, secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        assert!(matches!(outcome, DownloadOutcome::AlreadyDownloaded));
        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), "already_downloaded");
    }

    #[tokio::test]
    async fn test_missing_secret_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let secrets = secrets_for(&server.uri()).with(KEY_DOWNLOADER_KEY, "");
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets);

        let outcome = downloader.download_files().await;
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.message(),
            "Missing secrets: url=true streamuser=true key=false"
        );
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Config));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_http_500_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(500)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        match outcome.error() {
            Some(DownloadError::Http { status, body }) => {
                assert_eq!(*status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        assert!(outcome.message().starts_with("Download failed: HTTP 500: "));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_bad_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "expired"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        assert!(matches!(outcome.error(), Some(DownloadError::BadStatus { .. })));
        assert!(outcome.message().contains("expired"));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        assert!(matches!(outcome.error(), Some(DownloadError::Parse(_))));
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Protocol));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_write_failure_leaves_lock_unmarked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        // A plain file where the target directory should be.
        std::fs::write(&config.target_dir, "").unwrap();
        let downloader = BundleDownloader::new(config, secrets_for(&server.uri()));

        let outcome = downloader.download_files().await;
        assert!(!outcome.is_success());
        assert!(
            matches!(outcome.error(), Some(DownloadError::Write { .. })),
            "{outcome:?}"
        );
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Io));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_two_timeouts_then_success() {
        let server = MockServer::start().await;
        let calls = AtomicU32::new(0);
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(move |_: &wiremock::Request| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let template = ResponseTemplate::new(200).set_body_json(ok_body());
                if n < 2 {
                    template.set_delay(Duration::from_secs(2))
                } else {
                    template
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = BootConfig {
            request_timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(100),
            ..test_config(dir.path())
        };
        let downloader = BundleDownloader::new(config, secrets_for(&server.uri()));

        let started = Instant::now();
        let outcome = downloader.download_files().await;
        let elapsed = started.elapsed();

        match outcome {
            DownloadOutcome::Downloaded { files, attempts } => {
                assert_eq!(files, 1);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Downloaded, got {other:?}"),
        }
        // Two timeouts plus two retry delays.
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
        assert!(downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts_attempts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let config = BootConfig {
            retry_delay: Duration::from_millis(100),
            ..test_config(dir.path())
        };
        let downloader = BundleDownloader::new(config, secrets_for(&format!("http://{addr}")));

        let started = Instant::now();
        let outcome = downloader.download_files().await;
        // Every failed attempt is followed by a delay, the last one included.
        assert!(
            started.elapsed() >= Duration::from_millis(300),
            "elapsed {:?}",
            started.elapsed()
        );
        match outcome.error() {
            Some(DownloadError::Transport { attempts, last }) => {
                assert_eq!(*attempts, 3);
                assert!(last.starts_with("Attempt 3 error:"), "{last}");
            }
            other => panic!("expected Transport error, got {other:?}"),
        }
        assert!(outcome.message().starts_with("Download failed: Attempt 3 error:"));
        assert!(!downloader.lock().is_downloaded());
    }

    #[tokio::test]
    async fn test_second_call_is_already_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streamdownload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = BundleDownloader::new(test_config(dir.path()), secrets_for(&server.uri()));

        assert!(downloader.download_files().await.is_success());
        let second = downloader.download_files().await;
        assert!(matches!(second, DownloadOutcome::AlreadyDownloaded));
        assert_eq!(second.message(), ALREADY_DOWNLOADED);
    }
}
