use crate::transport::{JobStatus, StatusResponse};
use serde::Serialize;
use std::path::PathBuf;

/// One server-side highlight job as this client last saw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub error_detail: Option<String>,
    pub result_location: Option<PathBuf>,
}

impl Job {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            error_detail: None,
            result_location: None,
        }
    }

    /// Folds a status snapshot in. Returns false when the snapshot was ignored.
    ///
    /// Once `completed` or `failed` has been seen the job is frozen. Status and
    /// progress never move backwards, so a stale reply can't undo newer state.
    pub fn apply_snapshot(&mut self, snapshot: &StatusResponse) -> bool {
        if self.status.is_terminal() {
            tracing::debug!(
                "Job {} already {}, ignoring {} snapshot",
                self.id,
                self.status,
                snapshot.status
            );
            return false;
        }

        if snapshot.job_id != self.id {
            tracing::warn!(
                "Status snapshot for {} applied to job {}",
                snapshot.job_id,
                self.id
            );
        }

        self.status = self.status.max(snapshot.status);
        self.progress = self.progress.max(snapshot.progress.min(100));
        if snapshot.message.is_some() {
            self.message = snapshot.message.clone();
        }
        self.error_detail = match snapshot.status {
            JobStatus::Failed => snapshot.error_message.clone(),
            _ => None,
        };

        true
    }

    pub fn set_result(&mut self, location: PathBuf) {
        self.result_location = Some(location);
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
