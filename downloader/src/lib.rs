//! Bundle downloader.
//!
//! Fetches a JSON bundle of files from the configured endpoint once per
//! environment, writes it under the target directory, and marks a lock file
//! so later starts skip the download.
pub mod bundle;
pub mod client;
pub mod lock;

pub use client::{BundleDownloader, DownloadOutcome};
pub use lock::DownloadLock;
