// Running slot: the one piece of state shared between callers and the worker

use crate::domain::{BackupJob, ExternalId};
use crate::port::CancellationToken;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Settlement channel: `None` while running, the final job once settled
pub(crate) type SettledReceiver = watch::Receiver<Option<BackupJob>>;

/// The backup currently owning the single execution slot
#[derive(Clone)]
pub(crate) struct ActiveBackup {
    pub id: ExternalId,
    pub started_at: i64,
    pub cancel: CancellationToken,
    pub settled: SettledReceiver,
}

/// Claimed at submission, released only by the worker after settlement
#[derive(Default)]
pub(crate) struct RunningSlot {
    current: Mutex<Option<ActiveBackup>>,
}

impl RunningSlot {
    /// Claim the slot, or return the id of the backup holding it
    pub fn try_claim(&self, active: ActiveBackup) -> Result<(), ExternalId> {
        let mut current = self.current.lock();
        if let Some(running) = current.as_ref() {
            return Err(running.id.clone());
        }
        *current = Some(active);
        Ok(())
    }

    /// Release the slot if `id` still holds it
    pub fn release(&self, id: &str) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|a| a.id == id) {
            *current = None;
            return true;
        }
        false
    }

    pub fn current_id(&self) -> Option<ExternalId> {
        self.current.lock().as_ref().map(|a| a.id.clone())
    }

    /// Snapshot of the active backup if it is `id`
    pub fn get(&self, id: &str) -> Option<ActiveBackup> {
        self.current
            .lock()
            .as_ref()
            .filter(|a| a.id == id)
            .cloned()
    }

    /// Cancel whatever is running (shutdown path)
    pub fn cancel_current(&self) -> Option<ExternalId> {
        let current = self.current.lock();
        current.as_ref().map(|a| {
            a.cancel.cancel();
            a.id.clone()
        })
    }
}
