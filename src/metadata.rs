// Filesystem-level metadata about a prefetch file itself (not its decoded
// contents): stat times, size and content hashes for reporting layers.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};

use crate::filetime::format_timestamp;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub md5: String,
    pub sha1: String,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    /// Not every filesystem records a creation time.
    pub created: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        let meta = std::fs::metadata(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_path = path
            .canonicalize()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());

        Ok(FileMetadata {
            file_name,
            file_path,
            file_size: meta.len(),
            md5: hex::encode(Md5::digest(&data)),
            sha1: hex::encode(Sha1::digest(&data)),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            created: meta.created().ok().map(DateTime::<Utc>::from),
        })
    }

    pub fn to_json(&self) -> Value {
        let fmt = |ts: &Option<DateTime<Utc>>| ts.as_ref().map(format_timestamp);
        json!({
            "file_name": self.file_name,
            "file_path": self.file_path,
            "file_size": self.file_size,
            "md5": self.md5,
            "sha1": self.sha1,
            "modified": fmt(&self.modified),
            "accessed": fmt(&self.accessed),
            "created": fmt(&self.created),
        })
    }
}
