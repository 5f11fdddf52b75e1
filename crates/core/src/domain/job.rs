// Backup Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Caller-facing job handle (UUID v4), generated by the orchestrator
pub type ExternalId = String;

/// Version uid assigned by backy2 once a backup completes
pub type ToolId = String;

/// Size sentinel used until the tool reports a parsable size
pub const UNKNOWN_SIZE: i64 = -1;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Byte count in MiB, or -1 when unknown
pub fn size_mb(size_bytes: i64) -> f64 {
    if size_bytes < 0 {
        return UNKNOWN_SIZE as f64;
    }
    size_bytes as f64 / BYTES_PER_MB
}

/// Backup status as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Running,
    Available,
    Failed,
    Cancelled,
    Deleted,
}

impl BackupStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BackupStatus::Running)
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::Running => write!(f, "running"),
            BackupStatus::Available => write!(f, "available"),
            BackupStatus::Failed => write!(f, "failed"),
            BackupStatus::Cancelled => write!(f, "cancelled"),
            BackupStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Backup Job Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJob {
    pub id: ExternalId,
    pub tool_id: Option<ToolId>,
    pub status: BackupStatus,
    pub size_bytes: i64,
    pub message: String,

    pub started_at: Option<i64>, // epoch ms
    pub finished_at: Option<i64>,
}

impl BackupJob {
    /// Create a freshly submitted job in `running` state
    ///
    /// # Arguments
    ///
    /// * `id` - External ID (injected, not generated)
    /// * `started_at` - Submission timestamp in epoch ms (injected, not system time)
    pub fn new(id: impl Into<String>, started_at: i64) -> Self {
        Self {
            id: id.into(),
            tool_id: None,
            status: BackupStatus::Running,
            size_bytes: UNKNOWN_SIZE,
            message: String::new(),
            started_at: Some(started_at),
            finished_at: None,
        }
    }

    /// Build a job view resolved from the mapping store and the tool listing
    pub fn resolved(
        id: impl Into<String>,
        tool_id: impl Into<String>,
        status: BackupStatus,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: id.into(),
            tool_id: Some(tool_id.into()),
            status,
            size_bytes,
            message: String::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Available once the tool confirmed the new version
    pub fn complete(
        &mut self,
        tool_id: impl Into<String>,
        message: impl Into<String>,
        now_millis: i64,
    ) -> Result<()> {
        if self.status != BackupStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: BackupStatus::Available.to_string(),
            });
        }
        self.status = BackupStatus::Available;
        self.tool_id = Some(tool_id.into());
        self.message = message.into();
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Demote an Available job to Failed (post-backup command failure).
    /// The tool id is kept: the backup itself exists and stays mapped.
    pub fn demote(&mut self, message: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != BackupStatus::Available {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: BackupStatus::Failed.to_string(),
            });
        }
        self.status = BackupStatus::Failed;
        self.message = message.into();
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Mark as Failed with explicit timestamp
    pub fn fail(&mut self, message: impl Into<String>, now_millis: i64) {
        self.status = BackupStatus::Failed;
        self.message = message.into();
        self.finished_at = Some(now_millis);
    }

    /// Mark as Cancelled with explicit timestamp
    pub fn cancel(&mut self, message: impl Into<String>, now_millis: i64) {
        self.status = BackupStatus::Cancelled;
        self.message = message.into();
        self.finished_at = Some(now_millis);
    }

    /// Size in MiB, or -1 when unknown
    pub fn size_mb(&self) -> f64 {
        size_mb(self.size_bytes)
    }
}
