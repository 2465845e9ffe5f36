/// Wire models for the bundle endpoint.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DownloadError;

/// Value of `status` in an accepted envelope.
pub const STATUS_OK: &str = "ok";

/// A set of files keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl Bundle {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Decoded body of a `200 OK` from `/streamdownload`.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleReply {
    /// `status` was `"ok"`.
    Accepted(Bundle),
    /// Any other `status` (or none); carries the whole payload for diagnostics.
    Rejected(serde_json::Value),
}

impl BundleReply {
    /// Decode a response body.
    ///
    /// The `status` field is checked before `files` is interpreted, so a
    /// rejected payload never fails on a malformed `files` map.
    pub fn from_body(body: &str) -> Result<Self, DownloadError> {
        let payload: serde_json::Value =
            serde_json::from_str(body).map_err(|e| DownloadError::Parse(e.to_string()))?;

        let accepted = payload.get("status").and_then(|v| v.as_str()) == Some(STATUS_OK);
        if !accepted {
            return Ok(BundleReply::Rejected(payload));
        }

        let bundle: Bundle =
            serde_json::from_value(payload).map_err(|e| DownloadError::Parse(e.to_string()))?;
        Ok(BundleReply::Accepted(bundle))
    }
}
