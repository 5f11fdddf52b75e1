// Backy Infrastructure - filesystem adapter
// Implements: MappingStore

mod file_mapping_store;

pub use file_mapping_store::FileMappingStore;
