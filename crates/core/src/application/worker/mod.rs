// Worker - sequential backup execution

pub mod constants;

use crate::application::orchestrator::slot::RunningSlot;
use crate::application::orchestrator::OrchestratorConfig;
use crate::application::output_parser::parse_completion_marker;
use crate::domain::BackupJob;
use crate::port::{CancellationToken, CommandExecutor, CommandOutcome, MappingStore, TimeProvider};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// One accepted backup handed from the orchestrator to the worker
pub(crate) struct Submission {
    pub job: BackupJob,
    pub cancel: CancellationToken,
    pub settled: watch::Sender<Option<BackupJob>>,
}

/// Single worker that runs pre-command, backup and post-command for one job
/// at a time. It is the only writer of terminal job state and of the
/// mapping store.
pub struct BackupWorker {
    submissions: mpsc::Receiver<Submission>,
    executor: Arc<dyn CommandExecutor>,
    store: Arc<dyn MappingStore>,
    time_provider: Arc<dyn TimeProvider>,
    config: Arc<OrchestratorConfig>,
    slot: Arc<RunningSlot>,
    shutdown: CancellationToken,
}

impl BackupWorker {
    pub(crate) fn new(
        submissions: mpsc::Receiver<Submission>,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn MappingStore>,
        time_provider: Arc<dyn TimeProvider>,
        config: Arc<OrchestratorConfig>,
        slot: Arc<RunningSlot>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            submissions,
            executor,
            store,
            time_provider,
            config,
            slot,
            shutdown,
        }
    }

    /// Run until the orchestrator shuts down or is dropped
    pub async fn run(mut self) {
        info!("Backup worker started");
        loop {
            let submission = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Backup worker interrupted while idle");
                    break;
                }
                next = self.submissions.recv() => match next {
                    Some(s) => s,
                    None => break,
                },
            };
            self.process(submission).await;
        }
        self.drain_pending();
        info!("Backup worker stopped");
    }

    /// Settle submissions accepted but never started so their slot is freed
    fn drain_pending(&mut self) {
        self.submissions.close();
        while let Ok(Submission {
            mut job,
            settled,
            ..
        }) = self.submissions.try_recv()
        {
            warn!(job_id = %job.id, "Backup dropped by worker shutdown");
            job.cancel("backup cancelled by shutdown before it started", self.now());
            self.slot.release(&job.id);
            let _ = settled.send(Some(job));
        }
    }

    async fn process(&self, submission: Submission) {
        let Submission {
            job,
            cancel,
            settled,
        } = submission;
        let id = job.id.clone();

        info!(job_id = %id, source = %self.config.source_path, "Processing backup");
        let job = self.execute(job, &cancel).await;
        info!(job_id = %id, status = %job.status, tool_id = ?job.tool_id, "Backup settled");

        // Release before notifying so a caller reacting to the result can submit again
        self.slot.release(&id);
        let _ = settled.send(Some(job));
    }

    async fn execute(&self, mut job: BackupJob, cancel: &CancellationToken) -> BackupJob {
        let max_running_time = self.config.max_running_time;

        if let Some(pre) = &self.config.pre_backup_command {
            info!(job_id = %job.id, command = %pre, "Running pre-backup command");
            match self.executor.run(pre, max_running_time, cancel.clone()).await {
                Ok(outcome) if outcome.success() => debug!("Pre-backup command success"),
                Ok(outcome) => {
                    warn!(job_id = %job.id, reason = %outcome.describe(), "Pre-backup command failed");
                    self.settle_unsuccessful(&mut job, "pre-backup command", &outcome);
                    return job;
                }
                Err(e) => {
                    job.fail(format!("pre-backup command could not run: {}", e), self.now());
                    return job;
                }
            }
        }

        let command = self.config.tool.backup_command(&self.config.source_path);
        info!(job_id = %job.id, command = %command, "Calling backy2 to perform backup");
        let outcome = match self.executor.run(&command, max_running_time, cancel.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Backup command could not run");
                job.fail(format!("backup command could not run: {}", e), self.now());
                return job;
            }
        };

        if !outcome.success() {
            warn!(
                job_id = %job.id,
                reason = %outcome.describe(),
                output = %outcome.output,
                "backy2 backup failed"
            );
            self.settle_unsuccessful(&mut job, "backup", &outcome);
            return job;
        }

        let Some(tool_id) = parse_completion_marker(&outcome.output) else {
            error!(job_id = %job.id, output = %outcome.output, "Couldn't find 'Backy complete' or id in command output");
            job.fail(
                format!(
                    "Couldn't find 'Backy complete' or id in command output: {}",
                    outcome.output
                ),
                self.now(),
            );
            return job;
        };

        // Persist before the job can be observed as settled
        if let Err(e) = self.store.put(&job.id, &tool_id).await {
            error!(job_id = %job.id, tool_id = %tool_id, error = %e, "Couldn't save backup id mapping");
            job.fail(
                format!("backup {} created but its id mapping could not be saved: {}", tool_id, e),
                self.now(),
            );
            return job;
        }

        info!(job_id = %job.id, tool_id = %tool_id, "Backup success");
        if let Err(e) = job.complete(tool_id, outcome.output, self.now()) {
            error!(job_id = %job.id, error = %e, "Unexpected job state after backup");
            job.fail(e.to_string(), self.now());
            return job;
        }

        if let Some(post) = &self.config.post_backup_command {
            self.run_post_command(&mut job, post, cancel).await;
        }
        job
    }

    /// A failing post command demotes the job to failed and a cancelled one
    /// settles it as cancelled. Either way the backup and its mapping are kept.
    async fn run_post_command(&self, job: &mut BackupJob, post: &str, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.cancel_stored(job);
            return;
        }

        info!(job_id = %job.id, command = %post, "Running post-backup command");
        let message = match self
            .executor
            .run(post, self.config.max_running_time, cancel.clone())
            .await
        {
            Ok(outcome) if outcome.success() => {
                debug!("Post-backup command success");
                return;
            }
            Ok(outcome) if outcome.cancelled => {
                self.cancel_stored(job);
                return;
            }
            Ok(outcome) => format!(
                "post-backup command failed ({}): {}",
                outcome.describe(),
                outcome.output
            ),
            Err(e) => format!("post-backup command could not run: {}", e),
        };

        warn!(
            job_id = %job.id,
            tool_id = ?job.tool_id,
            message = %message,
            "Post-backup command failed; reporting backup as failed although it was stored"
        );
        if let Err(e) = job.demote(message, self.now()) {
            error!(job_id = %job.id, error = %e, "Unexpected job state after post-backup command");
        }
    }

    fn cancel_stored(&self, job: &mut BackupJob) {
        warn!(
            job_id = %job.id,
            tool_id = ?job.tool_id,
            "Cancelled during post-backup command; backup stays stored and mapped"
        );
        let message = format!(
            "post-backup command cancelled; backup {} was stored",
            job.tool_id.as_deref().unwrap_or_default()
        );
        job.cancel(message, self.now());
    }

    fn settle_unsuccessful(&self, job: &mut BackupJob, phase: &str, outcome: &CommandOutcome) {
        if outcome.cancelled {
            job.cancel(format!("{} cancelled", phase), self.now());
        } else {
            job.fail(
                format!("{} failed ({}): {}", phase, outcome.describe(), outcome.output),
                self.now(),
            );
        }
    }

    fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }
}
