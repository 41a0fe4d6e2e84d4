//! Intake Storage - Record Store abstraction
//!
//! Defines the async seam between the submission coordinator and whatever
//! holds application rows. The Postgres implementation lives in
//! `intake-api`; [`MemoryStore`] here backs tests and local development.
//!
//! # Transaction contract
//!
//! [`ApplicationStore::begin`] hands out a [`SubmissionTransaction`] that owns
//! exactly one session for its whole lifetime. Nothing written through it is
//! visible to other readers until [`SubmissionTransaction::commit`] succeeds.
//! Dropping a transaction without committing (early return, panic, or a
//! cancelled future) must roll it back and give the session back.

use async_trait::async_trait;
use intake_core::{ApplicationData, ApplicationId, ApplicationRecord, RowId, StorageResult, Timestamp};

pub mod memory;

pub use memory::{FaultPoint, MemoryStore};

/// Key and insert time of a freshly inserted, not yet committed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedRow {
    pub id: RowId,
    /// The store's notion of "now" inside the transaction.
    pub created_at: Timestamp,
}

/// Record Store operations.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Acquire one session and open a transaction on it.
    async fn begin(&self) -> StorageResult<Box<dyn SubmissionTransaction>>;

    /// Look up a committed record by display identifier.
    async fn get(&self, application_id: &str) -> StorageResult<Option<ApplicationRecord>>;

    /// All committed records, newest first.
    async fn list(&self) -> StorageResult<Vec<ApplicationRecord>>;

    /// Replace a record's payload wholesale. Returns `false` if no record has
    /// that identifier.
    async fn replace_data(&self, application_id: &str, data: &ApplicationData)
        -> StorageResult<bool>;

    /// Remove a record. Returns `false` if no record has that identifier.
    async fn delete(&self, application_id: &str) -> StorageResult<bool>;

    /// Round-trip to the backing store.
    async fn health_check(&self) -> StorageResult<()>;
}

/// One open submission transaction.
#[async_trait]
pub trait SubmissionTransaction: Send {
    /// Insert the payload and return the key the store assigned to it.
    async fn insert(&mut self, data: &ApplicationData) -> StorageResult<InsertedRow>;

    /// Write the display identifier onto a row inserted by this transaction.
    async fn set_application_id(
        &mut self,
        row_id: RowId,
        application_id: &ApplicationId,
    ) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
