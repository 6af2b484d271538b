use super::Job;
use crate::error::ClassifiedError;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Uploading,
    Processing,
    Downloading,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionPhase::Uploading | SessionPhase::Processing | SessionPhase::Downloading
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Succeeded | SessionPhase::Failed | SessionPhase::Cancelled
        )
    }
}

/// Snapshot of one upload-to-result attempt, as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// 0.0-1.0, only meaningful while uploading
    pub upload_progress: f64,
    pub job: Option<Job>,
    pub status_message: String,
    pub last_error: Option<ClassifiedError>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            upload_progress: 0.0,
            job: None,
            status_message: String::new(),
            last_error: None,
        }
    }
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Integer percentage from whichever source is driving the current phase.
    pub fn percent(&self) -> Option<u8> {
        match self.phase {
            SessionPhase::Uploading => {
                Some((self.upload_progress.clamp(0.0, 1.0) * 100.0).round() as u8)
            }
            SessionPhase::Processing | SessionPhase::Downloading => {
                Some(self.job.as_ref().map(|j| j.progress.min(100)).unwrap_or(0))
            }
            _ => None,
        }
    }

    pub fn percent_text(&self) -> String {
        self.percent()
            .map(|p| format!("{}%", p))
            .unwrap_or_default()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|j| j.id.as_str())
    }

    pub fn result_location(&self) -> Option<&Path> {
        self.job.as_ref().and_then(|j| j.result_location.as_deref())
    }

    pub fn friendly_error(&self) -> Option<String> {
        self.last_error.as_ref().map(|e| e.friendly_message())
    }
}
