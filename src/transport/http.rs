// src/transport/http.rs
// reqwest-backed transport for the Moments API

use super::media::MEDIA_MIME;
use super::{
    HealthResponse, JobTransport, MediaSource, ProgressFn, StatusResponse, UploadProgress,
    UploadResponse,
};
use crate::config::{AppConfig, VideoConfig};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{multipart, Body, Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

const JOBS_PATH: &str = "/api/v1/jobs";
const HEALTH_PATH: &str = "/health";

pub struct HttpTransport {
    client: Client,
    base_url: String,
    upload_path: String,
    download_dir: PathBuf,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.api_timeout).build()?;

        tracing::info!(
            "HTTP transport initialized: base={}, timeout={}s",
            config.api_base_url,
            config.api_timeout.as_secs()
        );

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            upload_path: config.upload_path.clone(),
            download_dir: config.download_dir.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    fn job_endpoint(&self, job_id: &str, action: &str) -> Result<Url, TransportError> {
        if job_id.trim().is_empty() {
            return Err(TransportError::InvalidUrl("empty job id".to_string()));
        }
        self.endpoint(&format!(
            "{}/{}/{}",
            JOBS_PATH,
            urlencoding::encode(job_id),
            action
        ))
    }

    /// Where the highlight for `job_id` lands. Stable across calls so a refetch overwrites.
    pub fn result_path(&self, job_id: &str) -> PathBuf {
        let safe: String = job_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.download_dir.join(format!("highlight_{}.mp4", safe))
    }

    pub async fn health_check(&self) -> Result<HealthResponse, TransportError> {
        let url = self.endpoint(HEALTH_PATH)?;
        let response = self.client.get(url).send().await.map_err(send_error)?;
        let body = expect_ok_body(response).await?;
        decode(&body)
    }

    async fn stream_to_file(
        mut response: reqwest::Response,
        part_path: &Path,
    ) -> Result<u64, TransportError> {
        let mut file = tokio::fs::File::create(part_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(send_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn upload(
        &self,
        media: &MediaSource,
        video: &VideoConfig,
        on_progress: ProgressFn,
    ) -> Result<String, TransportError> {
        let url = self.endpoint(&self.upload_path)?;

        tracing::info!(
            "Uploading {} ({} bytes) to {}",
            media.file_name(),
            media.len(),
            url
        );

        let file = tokio::fs::File::open(media.path()).await?;
        let tracker = Arc::new(Mutex::new(UploadProgress::new(media.len())));

        let chunk_tracker = tracker.clone();
        let chunk_progress = on_progress.clone();
        let stream = ReaderStream::new(file).map(move |chunk: std::io::Result<Bytes>| {
            if let Ok(bytes) = &chunk {
                // report under the lock so a late chunk can't land after 1.0
                if let Ok(mut progress) = chunk_tracker.lock() {
                    if let Some(fraction) = progress.advance(bytes.len() as u64) {
                        chunk_progress(fraction);
                    }
                }
            }
            chunk
        });

        let file_part = multipart::Part::stream_with_length(Body::wrap_stream(stream), media.len())
            .file_name(media.file_name().to_string())
            .mime_str(MEDIA_MIME)?;

        let mut form = multipart::Form::new().part("file", file_part);
        for (name, value) in video.form_fields() {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(send_error)?;

        let body = expect_ok_body(response).await?;
        let upload: UploadResponse = decode(&body)?;
        if upload.job_id.trim().is_empty() {
            return Err(TransportError::Decoding("empty job_id".to_string()));
        }

        if let Ok(mut progress) = tracker.lock() {
            if let Some(fraction) = progress.finish() {
                on_progress(fraction);
            }
        }

        tracing::info!(
            "Upload accepted: job_id={}, status={}, message={}",
            upload.job_id,
            upload.status,
            upload.message
        );

        Ok(upload.job_id)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, TransportError> {
        let url = self.job_endpoint(job_id, "status")?;
        let response = self.client.get(url).send().await.map_err(send_error)?;
        let body = expect_ok_body(response).await?;
        let status: StatusResponse = decode(&body)?;

        tracing::debug!(
            "Job {} status={} progress={}",
            job_id,
            status.status,
            status.progress
        );

        Ok(status)
    }

    async fn fetch_result(&self, job_id: &str) -> Result<PathBuf, TransportError> {
        let url = self.job_endpoint(job_id, "download")?;
        let response = self.client.get(url).send().await.map_err(send_error)?;

        if response.status() != StatusCode::OK {
            return Err(TransportError::ServerError {
                code: response.status().as_u16(),
            });
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let destination = self.result_path(job_id);
        let part = PartFile::new(destination.with_extension("mp4.part"));

        let written = Self::stream_to_file(response, part.path()).await?;
        if written == 0 {
            return Err(TransportError::NoData);
        }

        match tokio::fs::remove_file(&destination).await {
            Ok(()) => tracing::debug!("Replaced previous result at {}", destination.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::rename(part.path(), &destination).await?;
        part.keep();

        tracing::info!(
            "Result for job {} saved: {} ({} bytes)",
            job_id,
            destination.display(),
            written
        );

        Ok(destination)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Removes a partially written download unless `keep` is called. Runs on
/// error returns and when the download future is dropped by a cancelled session.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove partial download {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e)
    }
}

async fn expect_ok_body(response: reqwest::Response) -> Result<Bytes, TransportError> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("HTTP {}: {}", status, body);
        return Err(TransportError::ServerError {
            code: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(send_error)?;
    if body.is_empty() {
        return Err(TransportError::NoData);
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransportError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::transport::JobStatus;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer, download_dir: &Path) -> HttpTransport {
        let mut config =
            AppConfig::for_environment(Environment::Development).with_base_url(&server.uri());
        config.download_dir = download_dir.to_path_buf();
        HttpTransport::new(&config).unwrap()
    }

    async fn media_of(dir: &Path, len: usize) -> MediaSource {
        let path = dir.join("clip.mp4");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&vec![42u8; len])
            .unwrap();
        MediaSource::open(&path).await.unwrap()
    }

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressFn = Arc::new(move |f| sink.lock().unwrap().push(f));
        (callback, seen)
    }

    #[tokio::test]
    async fn upload_returns_job_id_and_finishes_progress_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload"))
            .and(body_string_contains("target_duration"))
            .and(body_string_contains("high"))
            .and(body_string_contains("video/mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": "J1",
                "status": "queued",
                "message": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let media = media_of(dir.path(), 256 * 1024).await;
        let (callback, seen) = recorder();

        let job_id = transport
            .upload(&media, &VideoConfig::STANDARD, callback)
            .await
            .unwrap();
        assert_eq!(job_id, "J1");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&1.0));
        assert_eq!(seen.iter().filter(|f| **f == 1.0).count(), 1);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen[..seen.len() - 1].iter().all(|f| *f <= UploadProgress::CAP));
    }

    #[tokio::test]
    async fn upload_server_error_never_reports_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let media = media_of(dir.path(), 4096).await;
        let (callback, seen) = recorder();

        let err = transport
            .upload(&media, &VideoConfig::QUICK, callback)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ServerError { code: 500 }));
        assert!(seen.lock().unwrap().iter().all(|f| *f < 1.0));
    }

    #[tokio::test]
    async fn upload_with_empty_body_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let media = media_of(dir.path(), 128).await;
        let (callback, _) = recorder();

        let err = transport
            .upload(&media, &VideoConfig::STANDARD, callback)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoData));
    }

    #[tokio::test]
    async fn status_decodes_and_rejects_malformed_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": "J1",
                "status": "failed",
                "progress": 40,
                "error_message": "decode error"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J2/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"job_id\":"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J3/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());

        let status = transport.fetch_status("J1").await.unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("decode error"));

        let err = transport.fetch_status("J2").await.unwrap_err();
        assert!(matches!(err, TransportError::Decoding(_)));

        let err = transport.fetch_status("J3").await.unwrap_err();
        assert!(matches!(err, TransportError::ServerError { code: 404 }));
    }

    #[tokio::test]
    async fn fetch_result_overwrites_job_scoped_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh-highlight".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let expected = transport.result_path("J1");
        std::fs::write(&expected, b"stale").unwrap();

        let saved = transport.fetch_result("J1").await.unwrap();
        assert_eq!(saved, expected);
        assert_eq!(std::fs::read(&saved).unwrap(), b"fresh-highlight");
        assert!(!saved.with_extension("mp4.part").exists());
    }

    #[tokio::test]
    async fn fetch_result_non_200_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J1/download"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let err = transport.fetch_result("J1").await.unwrap_err();
        assert!(matches!(err, TransportError::ServerError { code: 400 }));
        assert!(!transport.result_path("J1").exists());
    }

    #[tokio::test]
    async fn fetch_result_empty_body_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs/J1/download"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        let err = transport.fetch_result("J1").await.unwrap_err();
        assert!(matches!(err, TransportError::NoData));

        let destination = transport.result_path("J1");
        assert!(!destination.exists());
        assert!(!destination.with_extension("mp4.part").exists());
    }

    #[tokio::test]
    async fn aborted_download_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("highlight_J1.mp4.part");
        let (written_tx, written_rx) = tokio::sync::oneshot::channel();

        let task_path = part_path.clone();
        let handle = tokio::spawn(async move {
            let part = PartFile::new(task_path);
            tokio::fs::write(part.path(), b"half a highl").await.unwrap();
            let _ = written_tx.send(());
            std::future::pending::<()>().await;
            part.keep();
        });

        written_rx.await.unwrap();
        assert!(part_path.exists());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!part_path.exists());
    }

    #[test]
    fn kept_part_file_survives() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("highlight_J1.mp4.part");
        std::fs::write(&part_path, b"done").unwrap();

        PartFile::new(part_path.clone()).keep();
        assert!(part_path.exists());

        drop(PartFile::new(part_path.clone()));
        assert!(!part_path.exists());
    }

    #[tokio::test]
    async fn health_check_reads_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "healthy",
                "version": "1.0.0",
                "service": "Moments"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let transport = transport_for(&server, dir.path());
        assert!(transport.health_check().await.unwrap().is_healthy());
    }

    #[test]
    fn bad_base_url_is_invalid_url() {
        let config = AppConfig::for_environment(Environment::Development).with_base_url("not a url");
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport.job_endpoint("J1", "status").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn result_path_is_job_scoped_and_sanitized() {
        let mut config = AppConfig::for_environment(Environment::Development);
        config.download_dir = PathBuf::from("/tmp/moments");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.result_path("abc-123"),
            PathBuf::from("/tmp/moments/highlight_abc-123.mp4")
        );
        assert_eq!(
            transport.result_path("../x"),
            PathBuf::from("/tmp/moments/highlight____x.mp4")
        );
    }
}
