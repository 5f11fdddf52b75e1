// Port Layer - Interfaces for external collaborators

pub mod command_executor;
pub mod id_provider; // For deterministic testing
pub mod mapping_store;
pub mod time_provider;

// Re-exports
pub use command_executor::{
    combine_output, CancellationToken, CommandExecutor, CommandOutcome, ExecutionError,
};
pub use id_provider::IdProvider;
pub use mapping_store::MappingStore;
pub use time_provider::TimeProvider;
