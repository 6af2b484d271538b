use crate::config::{AppConfig, VideoConfig};
use crate::error::{ClassifiedError, TransportError};
use crate::transport::{HttpTransport, JobStatus, JobTransport, MediaSource, ProgressFn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub mod job;
pub mod progress;

pub use job::Job;
pub use progress::{SessionPhase, SessionState};

const MSG_UPLOADING: &str = "Uploading video...";
const MSG_PROCESSING: &str = "Processing video...";
const MSG_DOWNLOADING: &str = "Downloading highlight...";
const MSG_COMPLETE: &str = "Complete!";
const MSG_UPLOAD_FAILED: &str = "Upload failed";
const MSG_PROCESSING_FAILED: &str = "Processing failed";
const MSG_DOWNLOAD_FAILED: &str = "Download failed";
const MSG_CANCELLED: &str = "Cancelled";

/// Drives one video through upload, status polling and result download.
///
/// State is published through a `watch` channel: observers get snapshots in
/// the order they were applied. Writes from the background run pass through a
/// gate tied to the run's cancellation token, so after [`JobSession::cancel`]
/// nothing from that run lands.
pub struct JobSession {
    transport: Arc<dyn JobTransport>,
    video: VideoConfig,
    poll_interval: Duration,
    state: Arc<watch::Sender<SessionState>>,
    run: Option<ActiveRun>,
}

struct ActiveRun {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveRun {
    fn stop(self) {
        self.cancel.cancel();
        // best effort: dropping the future drops any request in flight
        self.handle.abort();
        tracing::debug!("Session run {} stopped", self.id);
    }
}

impl JobSession {
    pub fn new(
        transport: Arc<dyn JobTransport>,
        video: VideoConfig,
        poll_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            transport,
            video,
            poll_interval,
            state: Arc::new(state),
            run: None,
        }
    }

    pub fn from_config(config: &AppConfig, video: VideoConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), video, config.poll_interval))
    }

    pub fn video(&self) -> &VideoConfig {
        &self.video
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Begins a fresh attempt. Anything from a previous attempt is cancelled and
    /// cleared first. Must be called from within a tokio runtime.
    pub fn start(&mut self, media: MediaSource) -> Uuid {
        self.reset();

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        self.state.send_modify(|s| {
            s.phase = SessionPhase::Uploading;
            s.status_message = MSG_UPLOADING.to_string();
        });

        tracing::info!(
            "Starting session {} for {} via {} transport (target {}s)",
            run_id,
            media.file_name(),
            self.transport.name(),
            self.video.target_duration
        );

        let driver = Driver {
            transport: self.transport.clone(),
            video: self.video,
            poll_interval: self.poll_interval,
            gate: StateGate {
                state: self.state.clone(),
                cancel: cancel.clone(),
            },
        };

        let handle = tokio::spawn(
            driver
                .run(media)
                .instrument(tracing::info_span!("session", run = %run_id)),
        );

        self.run = Some(ActiveRun {
            id: run_id,
            cancel,
            handle,
        });

        run_id
    }

    /// Stops the active attempt. Does not wait for the in-flight request to wind down.
    pub fn cancel(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.stop();

        let cancelled = self.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                return false;
            }
            s.phase = SessionPhase::Cancelled;
            s.status_message = MSG_CANCELLED.to_string();
            true
        });

        if cancelled {
            tracing::info!("Session cancelled");
        }
    }

    /// Back to `idle` with every field at its default.
    pub fn reset(&mut self) {
        if let Some(run) = self.run.take() {
            run.stop();
        }
        self.state.send_replace(SessionState::default());
    }

    /// Resolves once the session is no longer uploading, processing or downloading.
    pub async fn wait_until_settled(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|s| !s.phase.is_active()).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }
}

impl Drop for JobSession {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.stop();
        }
    }
}

#[derive(Clone)]
struct StateGate {
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
}

impl StateGate {
    /// Applies `update` unless the run was cancelled. `update` returns whether it changed anything.
    fn apply(&self, update: impl FnOnce(&mut SessionState) -> bool) -> bool {
        self.state.send_if_modified(|s| {
            if self.cancel.is_cancelled() {
                return false;
            }
            update(s)
        })
    }

    fn fail(&self, error: &TransportError, message: &str) {
        let classified = ClassifiedError::from(error);

        if classified.kind.is_cancellation() {
            tracing::info!("{}: request cancelled", message);
            self.apply(|s| {
                s.phase = SessionPhase::Cancelled;
                s.status_message = MSG_CANCELLED.to_string();
                true
            });
            return;
        }

        tracing::error!("{}: {} ({})", message, classified.kind, classified.detail);
        self.apply(|s| {
            s.phase = SessionPhase::Failed;
            s.status_message = message.to_string();
            s.last_error = Some(classified);
            true
        });
    }
}

struct Driver {
    transport: Arc<dyn JobTransport>,
    video: VideoConfig,
    poll_interval: Duration,
    gate: StateGate,
}

impl Driver {
    async fn run(self, media: MediaSource) {
        let Some(job_id) = self.upload(&media).await else {
            return;
        };

        if self.poll(&job_id).await {
            self.download(&job_id).await;
        }
    }

    async fn upload(&self, media: &MediaSource) -> Option<String> {
        let gate = self.gate.clone();
        let on_progress: ProgressFn = Arc::new(move |fraction| {
            gate.apply(|s| {
                if s.phase != SessionPhase::Uploading || fraction <= s.upload_progress {
                    return false;
                }
                s.upload_progress = fraction.min(1.0);
                true
            });
        });

        let result = tokio::select! {
            _ = self.gate.cancel.cancelled() => return None,
            result = self.transport.upload(media, &self.video, on_progress) => result,
        };

        match result {
            Ok(job_id) => {
                tracing::info!("Upload complete, job {}", job_id);
                let recorded = self.gate.apply(|s| {
                    s.upload_progress = 1.0;
                    s.job = Some(Job::new(job_id.clone()));
                    s.phase = SessionPhase::Processing;
                    s.status_message = MSG_PROCESSING.to_string();
                    true
                });
                recorded.then_some(job_id)
            }
            Err(e) => {
                self.gate.fail(&e, MSG_UPLOAD_FAILED);
                None
            }
        }
    }

    /// Polls until the job is terminal. True when it completed.
    ///
    /// The interval is measured from the end of each fetch. A failed fetch ends
    /// the session; there is no retry.
    async fn poll(&self, job_id: &str) -> bool {
        let mut polls = 0u32;

        loop {
            let result = tokio::select! {
                _ = self.gate.cancel.cancelled() => return false,
                result = self.transport.fetch_status(job_id) => result,
            };
            polls += 1;

            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.gate.fail(&e, MSG_PROCESSING_FAILED);
                    return false;
                }
            };

            match snapshot.status {
                JobStatus::Completed => {
                    tracing::info!("Job {} completed after {} polls", job_id, polls);
                    return self.gate.apply(|s| {
                        if let Some(job) = s.job.as_mut() {
                            job.apply_snapshot(&snapshot);
                        }
                        s.phase = SessionPhase::Downloading;
                        s.status_message = MSG_DOWNLOADING.to_string();
                        true
                    });
                }
                JobStatus::Failed => {
                    tracing::warn!(
                        "Job {} failed on the server: {}",
                        job_id,
                        snapshot.error_message.as_deref().unwrap_or("no detail")
                    );
                    self.gate.apply(|s| {
                        if let Some(job) = s.job.as_mut() {
                            job.apply_snapshot(&snapshot);
                        }
                        s.phase = SessionPhase::Failed;
                        s.status_message = MSG_PROCESSING_FAILED.to_string();
                        s.last_error = Some(ClassifiedError::job_failed(
                            snapshot.error_message.clone(),
                        ));
                        true
                    });
                    return false;
                }
                _ => {
                    self.gate.apply(|s| {
                        if let Some(job) = s.job.as_mut() {
                            job.apply_snapshot(&snapshot);
                        }
                        s.status_message = snapshot
                            .message
                            .clone()
                            .unwrap_or_else(|| MSG_PROCESSING.to_string());
                        true
                    });
                }
            }

            tokio::select! {
                _ = self.gate.cancel.cancelled() => return false,
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    async fn download(&self, job_id: &str) {
        let result = tokio::select! {
            _ = self.gate.cancel.cancelled() => return,
            result = self.transport.fetch_result(job_id) => result,
        };

        match result {
            Ok(location) => {
                tracing::info!("Highlight ready at {}", location.display());
                self.gate.apply(|s| {
                    if let Some(job) = s.job.as_mut() {
                        job.set_result(location);
                    }
                    s.phase = SessionPhase::Succeeded;
                    s.status_message = MSG_COMPLETE.to_string();
                    true
                });
            }
            Err(e) => self.gate.fail(&e, MSG_DOWNLOAD_FAILED),
        }
    }
}
