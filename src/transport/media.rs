use crate::error::TransportError;
use std::path::{Path, PathBuf};

pub const MEDIA_MIME: &str = "video/mp4";
const FALLBACK_FILE_NAME: &str = "video.mp4";

/// A local video treated as an opaque byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    path: PathBuf,
    file_name: String,
    len: u64,
}

impl MediaSource {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;

        if !metadata.is_file() || metadata.len() == 0 {
            tracing::warn!("Media at {} is empty or not a file", path.display());
            return Err(TransportError::NoData);
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string();

        Ok(Self {
            len: metadata.len(),
            path,
            file_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}
