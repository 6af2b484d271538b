// src/transport/mod.rs
// Transport - upload, status and result round trips against the Moments API

mod http;
mod media;
mod progress;
mod types;

pub use http::HttpTransport;
pub use media::MediaSource;
pub use progress::UploadProgress;
pub use types::{HealthResponse, JobStatus, StatusResponse, UploadResponse};

use crate::config::VideoConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Receives upload fractions in `[0, 1]`, never decreasing.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// The three network primitives a job session is built from.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Upload the media with the preset's form fields, returning the server-assigned job id.
    /// `on_progress` stays at or below 0.99 until the server acknowledges, then gets `1.0` once.
    async fn upload(
        &self,
        media: &MediaSource,
        video: &VideoConfig,
        on_progress: ProgressFn,
    ) -> Result<String, TransportError>;

    /// One status round trip.
    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, TransportError>;

    /// Persist the finished highlight to a job-scoped local path and return it.
    async fn fetch_result(&self, job_id: &str) -> Result<PathBuf, TransportError>;

    fn name(&self) -> &str;
}
