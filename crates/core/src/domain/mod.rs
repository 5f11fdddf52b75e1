// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod tool;

// Re-exports
pub use error::DomainError;
pub use job::{size_mb, BackupJob, BackupStatus, ExternalId, ToolId, UNKNOWN_SIZE};
pub use tool::BackupTool;
