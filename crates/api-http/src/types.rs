//! HTTP Request/Response Types

use backy_core::application::BackupSummary;
use backy_core::domain::{size_mb, BackupJob, BackupStatus};
use serde::{Deserialize, Serialize};

/// Body of create/get/delete responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResponse {
    pub id: String,
    pub status: BackupStatus,
    pub message: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
}

impl From<&BackupJob> for BackupResponse {
    fn from(job: &BackupJob) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            message: job.message.clone(),
            size_mb: job.size_mb(),
        }
    }
}

/// One row of `GET /backups`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupListItem {
    pub id: Option<String>,
    #[serde(rename = "toolId")]
    pub tool_id: String,
    pub name: String,
    pub date: String,
    pub status: BackupStatus,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
}

impl From<&BackupSummary> for BackupListItem {
    fn from(summary: &BackupSummary) -> Self {
        Self {
            id: summary.id.clone(),
            tool_id: summary.tool_id.clone(),
            name: summary.name.clone(),
            date: summary.date.clone(),
            status: summary.status,
            size_mb: size_mb(summary.size_bytes),
        }
    }
}

/// `GET /backups?raw=true` returns the tool's own listing text
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub raw: bool,
}
