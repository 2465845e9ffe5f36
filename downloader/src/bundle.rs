/// Materializes a downloaded bundle on disk.
use std::path::{Component, Path};

use streamboot_shared::errors::DownloadError;
use streamboot_shared::models::Bundle;
use tracing::{info, warn};

/// Whether a bundle key could land outside the target directory.
pub fn escapes_target(key: &str) -> bool {
    let path = Path::new(key);
    path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

/// Write every file of `bundle` under `target_dir`, overwriting existing files.
///
/// Keys are used as given; escaping keys are written anyway and only logged.
/// Returns the number of files written.
pub async fn write_bundle(target_dir: &Path, bundle: &Bundle) -> Result<usize, DownloadError> {
    for (name, content) in &bundle.files {
        if escapes_target(name) {
            warn!("Bundle path {:?} escapes {}", name, target_dir.display());
        }

        let path = target_dir.join(name);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| DownloadError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|source| DownloadError::Write {
                path: path.clone(),
                source,
            })?;
        info!("Saved: {}", name);
    }

    Ok(bundle.len())
}
