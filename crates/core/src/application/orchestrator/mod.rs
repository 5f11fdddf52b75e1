// Backup Orchestrator - single-flight backup lifecycle
//
// Callers submit, query and delete; the BackupWorker executes. The only state
// shared between them is the RunningSlot.

pub(crate) mod slot;

use crate::application::output_parser::{
    find_in_listing, parse_deletion_confirmation, parse_listing,
};
use crate::application::worker::constants::{
    DEFAULT_MAX_RUNNING_TIME, FAST_PATH_WINDOW, NOT_FINISHED_MESSAGE, PROTECTED_EXIT_CODE,
    PROTECTED_MESSAGE, SUBMISSION_QUEUE_DEPTH,
};
use crate::application::worker::{BackupWorker, Submission};
use crate::domain::{BackupJob, BackupStatus, BackupTool, ExternalId, ToolId, UNKNOWN_SIZE};
use crate::error::{AppError, Result};
use crate::port::{CancellationToken, CommandExecutor, IdProvider, MappingStore, TimeProvider};
use serde::Serialize;
use slot::{ActiveBackup, RunningSlot, SettledReceiver};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Orchestrator settings, resolved once at startup
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub source_path: String,
    pub max_running_time: Duration,
    pub pre_backup_command: Option<String>,
    pub post_backup_command: Option<String>,
    pub fast_path_window: Duration,
    pub tool: BackupTool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_path: "file:///backup-source/backup-this".to_string(),
            max_running_time: DEFAULT_MAX_RUNNING_TIME,
            pre_backup_command: None,
            post_backup_command: None,
            fast_path_window: FAST_PATH_WINDOW,
            tool: BackupTool::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    /// Empty or blank commands disable the hook
    pub fn with_pre_backup_command(mut self, command: impl Into<String>) -> Self {
        self.pre_backup_command = non_blank(command.into());
        self
    }

    pub fn with_post_backup_command(mut self, command: impl Into<String>) -> Self {
        self.post_backup_command = non_blank(command.into());
        self
    }

    pub fn with_max_running_time(mut self, max_running_time: Duration) -> Self {
        self.max_running_time = max_running_time;
        self
    }

    pub fn with_fast_path_window(mut self, window: Duration) -> Self {
        self.fast_path_window = window;
        self
    }

    pub fn with_tool(mut self, tool: BackupTool) -> Self {
        self.tool = tool;
        self
    }
}

fn non_blank(command: String) -> Option<String> {
    if command.trim().is_empty() {
        None
    } else {
        Some(command)
    }
}

/// One row of the tool listing, joined with its external id when mapped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupSummary {
    pub id: Option<ExternalId>,
    pub tool_id: ToolId,
    pub name: String,
    pub date: String,
    pub status: BackupStatus,
    pub size_bytes: i64,
}

/// Result of `list_backups`: tool-native text plus the parsed rows
#[derive(Debug, Clone)]
pub struct BackupListing {
    pub raw: String,
    pub backups: Vec<BackupSummary>,
}

/// Backup Orchestrator
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    executor: Arc<dyn CommandExecutor>,
    store: Arc<dyn MappingStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    slot: Arc<RunningSlot>,
    submissions: mpsc::Sender<Submission>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create the orchestrator and the worker that serves it.
    /// The caller spawns `BackupWorker::run`.
    pub fn new(
        config: OrchestratorConfig,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn MappingStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> (Self, BackupWorker) {
        let config = Arc::new(config);
        let slot = Arc::new(RunningSlot::default());
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(SUBMISSION_QUEUE_DEPTH);

        let worker = BackupWorker::new(
            rx,
            executor.clone(),
            store.clone(),
            time_provider.clone(),
            config.clone(),
            slot.clone(),
            shutdown.clone(),
        );

        let orchestrator = Self {
            config,
            executor,
            store,
            id_provider,
            time_provider,
            slot,
            submissions: tx,
            shutdown,
        };
        (orchestrator, worker)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// External id of the backup currently running, if any
    pub fn running_backup_id(&self) -> Option<ExternalId> {
        self.slot.current_id()
    }

    /// Make sure the backy2 repository is reachable, initializing it if not
    pub async fn ensure_repository(&self) -> Result<()> {
        debug!("Checking if backy2 repo was already initialized");
        let probe = self.run_tool(&self.config.tool.probe_command()).await?;
        if probe.success() {
            info!("backy2 repo already exists and is accessible");
            return Ok(());
        }

        debug!(output = %probe.output, "Couldn't access backy2 repo. Trying to create it");
        let init = self.run_tool(&self.config.tool.init_command()).await?;
        if !init.success() {
            return Err(AppError::CommandFailed(format!(
                "Error creating backy2 repo ({}): {}",
                init.describe(),
                init.output
            )));
        }
        info!(output = %init.output, "backy2 repo created successfully");
        Ok(())
    }

    /// Start a backup.
    ///
    /// Returns the settled job if it finishes within the fast-path window,
    /// otherwise a `running` job the caller polls with `get_backup`.
    ///
    /// # Errors
    /// - AppError::Conflict if another backup is running
    pub async fn create_backup(&self) -> Result<BackupJob> {
        let id = self.id_provider.generate_id();
        let job = BackupJob::new(id.clone(), self.time_provider.now_millis());
        let cancel = self.shutdown.child_token();
        let (settled_tx, settled_rx) = watch::channel(None);

        let active = ActiveBackup {
            id: id.clone(),
            started_at: job.started_at.unwrap_or_default(),
            cancel: cancel.clone(),
            settled: settled_rx.clone(),
        };
        if let Err(running) = self.slot.try_claim(active) {
            info!(running_id = %running, "Another backup is already running. Aborting");
            return Err(AppError::Conflict(format!(
                "Another backup id {} is already running. Aborting.",
                running
            )));
        }
        debug!(job_id = %id, "Created backup id");

        let submission = Submission {
            job: job.clone(),
            cancel,
            settled: settled_tx,
        };
        if let Err(e) = self.submissions.try_send(submission) {
            self.slot.release(&id);
            return Err(AppError::Internal(format!("backup worker unavailable: {}", e)));
        }

        match tokio::time::timeout(self.config.fast_path_window, wait_settled(settled_rx)).await {
            Ok(settled) => {
                let settled = settled?;
                debug!(job_id = %id, status = %settled.status, "Fast backup finish detected");
                Ok(settled)
            }
            Err(_) => {
                debug!(job_id = %id, "Backup will take some time. Returning status 'running'");
                let mut running = job;
                running.message = format!("backup started {}", NOT_FINISHED_MESSAGE);
                Ok(running)
            }
        }
    }

    /// Resolve the current status of a backup by external id
    ///
    /// # Errors
    /// - AppError::NotFound if the id is unknown to the store or the tool
    pub async fn get_backup(&self, id: &str) -> Result<BackupJob> {
        if let Some(active) = self.slot.get(id) {
            let mut job = BackupJob::new(active.id, active.started_at);
            job.message = "backup in progress".to_string();
            return Ok(job);
        }

        let tool_id = self.resolve_tool_id(id).await?;
        let listing = self.run_listing().await?;
        let entry = find_in_listing(&listing, &tool_id).ok_or_else(|| {
            debug!(job_id = %id, tool_id = %tool_id, "Backup not present in backy2 listing");
            not_found(id)
        })?;

        debug!(job_id = %id, tool_id = %tool_id, status = %entry.status, "Backup found");
        Ok(BackupJob::resolved(id, tool_id, entry.status, entry.size_bytes))
    }

    /// Cancel the running backup, or remove a finished one from the tool.
    ///
    /// # Errors
    /// - AppError::NotFound if the id is unknown
    /// - AppError::Protected if backy2 refuses because the backup is too young
    /// - AppError::Consistency if backy2 reports removing a different version
    pub async fn delete_backup(&self, id: &str) -> Result<BackupJob> {
        if let Some(active) = self.slot.get(id) {
            return self.cancel_running(active).await;
        }

        let tool_id = self.resolve_tool_id(id).await?;
        let listing = self.run_listing().await?;
        if find_in_listing(&listing, &tool_id).is_none() {
            debug!(job_id = %id, tool_id = %tool_id, "Backup not found for removal");
            return Err(not_found(id));
        }

        debug!(job_id = %id, tool_id = %tool_id, "Backup found. Proceeding to deletion");
        let outcome = self
            .run_tool(&self.config.tool.remove_command(&tool_id))
            .await?;
        if !outcome.success() {
            if outcome.exit_code == Some(PROTECTED_EXIT_CODE) {
                warn!(job_id = %id, tool_id = %tool_id, "Backup is protected from removal");
                return Err(AppError::Protected(PROTECTED_MESSAGE.to_string()));
            }
            return Err(AppError::CommandFailed(format!(
                "backy2 rm failed ({}): {}",
                outcome.describe(),
                outcome.output
            )));
        }

        parse_deletion_confirmation(&outcome.output, &tool_id).map_err(|e| {
            error!(job_id = %id, tool_id = %tool_id, error = %e, "Removal not confirmed by backy2");
            AppError::Consistency(e.to_string())
        })?;

        if !self.store.delete(id).await? {
            warn!(job_id = %id, "Mapping entry already gone after removal");
        }

        info!(job_id = %id, tool_id = %tool_id, "Backup removed");
        let mut job = BackupJob::resolved(id, tool_id, BackupStatus::Deleted, UNKNOWN_SIZE);
        job.message = outcome.output;
        Ok(job)
    }

    /// All versions known to backy2, joined with their external ids
    pub async fn list_backups(&self) -> Result<BackupListing> {
        let raw = self.run_listing().await?;
        let by_tool_id: HashMap<ToolId, ExternalId> = self
            .store
            .entries()
            .await?
            .into_iter()
            .map(|(external, tool)| (tool, external))
            .collect();

        let backups = parse_listing(&raw)
            .into_iter()
            .map(|entry| BackupSummary {
                id: by_tool_id.get(&entry.tool_id).cloned(),
                tool_id: entry.tool_id,
                name: entry.name,
                date: entry.date,
                status: entry.status,
                size_bytes: entry.size_bytes,
            })
            .collect();

        Ok(BackupListing { raw, backups })
    }

    /// Stop accepting work and hard-kill any running command
    pub fn shutdown(&self) {
        if let Some(id) = self.slot.cancel_current() {
            info!(job_id = %id, "Cancelling running backup for shutdown");
        }
        self.shutdown.cancel();
    }

    async fn cancel_running(&self, active: ActiveBackup) -> Result<BackupJob> {
        info!(job_id = %active.id, "Cancelling running backup");
        active.cancel.cancel();
        let settled = wait_settled(active.settled).await?;
        if settled.status != BackupStatus::Cancelled {
            warn!(job_id = %settled.id, status = %settled.status, "Backup settled before cancellation took effect");
        }
        Ok(settled)
    }

    async fn resolve_tool_id(&self, id: &str) -> Result<ToolId> {
        self.store.get(id).await?.ok_or_else(|| {
            debug!(job_id = %id, "Tool id not found for external id");
            not_found(id)
        })
    }

    /// Machine listing text. A non-zero exit is tolerated as long as the
    /// output still contains version rows.
    async fn run_listing(&self) -> Result<String> {
        let outcome = self.run_tool(&self.config.tool.list_command()).await?;
        if outcome.success() {
            return Ok(outcome.output);
        }
        if !outcome.timed_out && !outcome.cancelled && !parse_listing(&outcome.output).is_empty() {
            warn!(reason = %outcome.describe(), "backy2 listing exited non-zero; using its output");
            return Ok(outcome.output);
        }
        Err(AppError::CommandFailed(format!(
            "backy2 listing failed ({}): {}",
            outcome.describe(),
            outcome.output
        )))
    }

    async fn run_tool(&self, command: &str) -> Result<crate::port::CommandOutcome> {
        let outcome = self
            .executor
            .run(command, self.config.max_running_time, self.shutdown.child_token())
            .await?;
        debug!(command = %command, reason = %outcome.describe(), "Tool command finished");
        Ok(outcome)
    }
}

async fn wait_settled(mut settled: SettledReceiver) -> Result<BackupJob> {
    let job = settled
        .wait_for(|job| job.is_some())
        .await
        .ok()
        .and_then(|job| (*job).clone());
    job.ok_or_else(|| AppError::Internal("backup worker stopped before settling".to_string()))
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Backup {} not found", id))
}

#[cfg(test)]
mod tests;
