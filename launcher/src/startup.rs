/// Startup sequence: download once, then hand off to the application.
///
/// Nothing here propagates a fault. Every path ends in a log line and a
/// [`StartupReport`]; the host process keeps running regardless.
use std::fmt::Display;

use streamboot_downloader::{BundleDownloader, DownloadOutcome};
use streamboot_shared::errors::ErrorKind;
use tracing::{error, info, warn};

use crate::app::Application;

/// How a startup attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupReport {
    /// Bundle downloaded and the application ran to completion.
    AppFinished,
    /// Bundle downloaded but the application could not be resolved, failed, or panicked.
    AppFailed,
    /// Lock present; assumed another instance started the application.
    AlreadyDownloaded,
    DownloadFailed(ErrorKind),
}

/// Download the bundle and start the application it contains.
///
/// `resolve` is only called once the bundle is on disk.
pub async fn start_app<A, E, F>(downloader: &BundleDownloader, resolve: F) -> StartupReport
where
    A: Application,
    E: Display,
    F: FnOnce() -> Result<A, E>,
{
    info!("streamboot starting...");

    let outcome = downloader.download_files().await;
    match &outcome {
        DownloadOutcome::Downloaded { attempts, .. } => {
            info!("{} (attempt {})", outcome.message(), attempts);
        }
        DownloadOutcome::AlreadyDownloaded => {
            let holder = downloader
                .lock()
                .holder_pid()
                .map(|pid| format!(" by pid {}", pid))
                .unwrap_or_default();
            warn!(
                "Already downloaded (lock exists{}) - application may already be running",
                holder
            );
            return StartupReport::AlreadyDownloaded;
        }
        DownloadOutcome::Failed(e) => {
            error!("[{}] {}", e.kind(), e);
            return StartupReport::DownloadFailed(e.kind());
        }
    }

    let app = match resolve() {
        Ok(app) => app,
        Err(e) => {
            error!("Could not resolve application entry: {}", e);
            return StartupReport::AppFailed;
        }
    };

    info!("Starting application entry: {}", app.name());
    let name = app.name().to_string();
    let handle = tokio::spawn(async move { app.run().await });

    match handle.await {
        Ok(Ok(())) => {
            info!("Application {} finished", name);
            StartupReport::AppFinished
        }
        Ok(Err(e)) => {
            error!("Application {} crashed: {:?}", name, e);
            StartupReport::AppFailed
        }
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!("Application {} panicked: {}", name, reason);
            StartupReport::AppFailed
        }
        Err(join_error) => {
            error!("Application {} was cancelled: {}", name, join_error);
            StartupReport::AppFailed
        }
    }
}
