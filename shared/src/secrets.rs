/// Secrets stores and credential resolution.
///
/// Credentials live under three keys: `downloaderurl`, `streamuser` and
/// `downloaderkey`. A value that is missing or empty counts as absent.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{BootResult, DownloadError};

pub const KEY_URL: &str = "downloaderurl";
pub const KEY_STREAMUSER: &str = "streamuser";
pub const KEY_DOWNLOADER_KEY: &str = "downloaderkey";

/// A read-only source of named string secrets.
pub trait SecretsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory secrets, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapSecrets {
    values: HashMap<String, String>,
}

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretsStore for MapSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Reads secrets from environment variables, key upper-cased
/// (`downloaderurl` -> `DOWNLOADERURL`).
#[derive(Debug, Clone, Default)]
pub struct EnvSecrets;

impl SecretsStore for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key.to_ascii_uppercase()).ok()
    }
}

/// Streamlit-style `secrets.toml`: top-level `key = "value"` pairs.
#[derive(Debug, Clone, Default)]
pub struct TomlSecrets {
    path: Option<PathBuf>,
    table: toml::Table,
}

impl TomlSecrets {
    /// Parse secrets from TOML text.
    pub fn parse(text: &str) -> BootResult<Self> {
        let table: toml::Table = text.parse()?;
        Ok(Self { path: None, table })
    }

    /// Load a secrets file. A missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> BootResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No secrets file at {}", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                table: toml::Table::new(),
            });
        }

        let text = std::fs::read_to_string(path)?;
        let mut secrets = Self::parse(&text)?;
        secrets.path = Some(path.to_path_buf());
        info!("Loaded {} secrets from {}", secrets.table.len(), path.display());
        Ok(secrets)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SecretsStore for TomlSecrets {
    fn get(&self, key: &str) -> Option<String> {
        match self.table.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Consults stores in order; the first non-empty value wins.
#[derive(Default)]
pub struct LayeredSecrets {
    layers: Vec<Box<dyn SecretsStore>>,
}

impl LayeredSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, store: impl SecretsStore + 'static) -> Self {
        self.layers.push(Box::new(store));
        self
    }
}

impl SecretsStore for LayeredSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.layers
            .iter()
            .filter_map(|store| store.get(key))
            .find(|v| !v.is_empty())
    }
}

/// Endpoint and header credentials for the bundle server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub streamuser: String,
    pub downloader_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("streamuser", &self.streamuser)
            .field("downloader_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Pull all three values from `store`, failing if any is absent.
    pub fn resolve(store: &dyn SecretsStore) -> Result<Self, DownloadError> {
        let lookup = |key: &str| store.get(key).filter(|v| !v.is_empty());
        let url = lookup(KEY_URL);
        let streamuser = lookup(KEY_STREAMUSER);
        let downloader_key = lookup(KEY_DOWNLOADER_KEY);

        match (url, streamuser, downloader_key) {
            (Some(url), Some(streamuser), Some(downloader_key)) => Ok(Self {
                url,
                streamuser,
                downloader_key,
            }),
            (url, streamuser, key) => Err(DownloadError::MissingSecrets {
                url: url.is_some(),
                streamuser: streamuser.is_some(),
                key: key.is_some(),
            }),
        }
    }

    /// Full download endpoint, `<url>/streamdownload`.
    pub fn endpoint(&self) -> String {
        format!("{}/streamdownload", self.url.trim_end_matches('/'))
    }
}
