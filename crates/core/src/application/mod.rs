// Application Layer - Use Cases and Business Logic

pub mod orchestrator;
pub mod output_parser;
pub mod worker;

// Re-exports
pub use orchestrator::{BackupListing, BackupSummary, Orchestrator, OrchestratorConfig};
pub use worker::BackupWorker;
