// Mapping Store Port (Interface)
// Durable external-id -> tool-id association

use crate::domain::{ExternalId, ToolId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the identifier mapping
///
/// The store exclusively owns the persisted representation. A missing key is
/// `Ok(None)`, never an error; errors mean the storage itself failed.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Create or atomically replace the entry for `external_id`
    async fn put(&self, external_id: &str, tool_id: &str) -> Result<()>;

    /// Look up the tool id for `external_id`
    async fn get(&self, external_id: &str) -> Result<Option<ToolId>>;

    /// Remove an entry (returns false if there was none)
    async fn delete(&self, external_id: &str) -> Result<bool>;

    /// All persisted entries
    async fn entries(&self) -> Result<Vec<(ExternalId, ToolId)>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory MappingStore, optionally failing every call
    #[derive(Default)]
    pub struct InMemoryMappingStore {
        entries: Mutex<BTreeMap<ExternalId, ToolId>>,
        broken: AtomicBool,
    }

    impl InMemoryMappingStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate an I/O failure on every subsequent call
        pub fn set_broken(&self, broken: bool) {
            self.broken.store(broken, Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.entries.lock().len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.lock().is_empty()
        }

        fn check(&self) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(AppError::Storage("mock store is broken".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MappingStore for InMemoryMappingStore {
        async fn put(&self, external_id: &str, tool_id: &str) -> Result<()> {
            self.check()?;
            self.entries
                .lock()
                .insert(external_id.to_string(), tool_id.to_string());
            Ok(())
        }

        async fn get(&self, external_id: &str) -> Result<Option<ToolId>> {
            self.check()?;
            Ok(self.entries.lock().get(external_id).cloned())
        }

        async fn delete(&self, external_id: &str) -> Result<bool> {
            self.check()?;
            Ok(self.entries.lock().remove(external_id).is_some())
        }

        async fn entries(&self) -> Result<Vec<(ExternalId, ToolId)>> {
            self.check()?;
            Ok(self
                .entries
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }
    }
}
