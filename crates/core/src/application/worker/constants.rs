// Worker constants (No magic values)
use std::time::Duration;

/// How long a create request waits for the backup to settle before answering `running`
pub const FAST_PATH_WINDOW: Duration = Duration::from_secs(5);

/// Default hard limit for a single backup (and its pre/post commands)
pub const DEFAULT_MAX_RUNNING_TIME: Duration = Duration::from_secs(7200);

/// Submissions handed to the worker at once; more is rejected, never queued
pub const SUBMISSION_QUEUE_DEPTH: usize = 1;

/// Exit code backy2 uses when refusing to remove a version inside its protection window
pub const PROTECTED_EXIT_CODE: i32 = 100;

pub const PROTECTED_MESSAGE: &str =
    "Cannot delete this backup because it is too young. Configure $PROTECT_YOUNG_BACKUP_DAYS if needed";

/// Appended to the message of a create response that is still running
pub const NOT_FINISHED_MESSAGE: &str = "(...not finished yet)";
