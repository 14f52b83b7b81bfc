//! Persistence collaborator for the buffered writer.
//!
//! The writer only needs one capability: append an ordered batch of records.
//! Stores may see the same record again after a failed append was retried, so
//! an append that fails halfway must leave the store readable; the writer never
//! re-sends records the store has acknowledged.

mod csv_file;
mod memory;

use std::sync::Arc;

use crate::PersistError;
use crate::types::IndexedRecord;

pub use csv_file::CsvStore;
pub use memory::MemoryStore;

/// Durable destination for decoded records.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Append `records` in order.
    ///
    /// Returning `Err` means the whole batch is considered unwritten and will
    /// be offered again on the next flush.
    async fn append_batch(&self, records: &[Arc<IndexedRecord>]) -> Result<(), PersistError>;
}

#[async_trait::async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn append_batch(&self, records: &[Arc<IndexedRecord>]) -> Result<(), PersistError> {
        (**self).append_batch(records).await
    }
}
