//! In-memory Record Store
//!
//! Behaves like the Postgres table it stands in for: keys come from a
//! sequence that is never rewound (rolled-back keys are lost, as with a
//! `SERIAL` column), uncommitted rows are invisible to readers, the PAN
//! uniqueness constraint is enforced, and a bounded set of sessions is
//! handed out to transactions.
//!
//! Faults can be injected at each protocol step to exercise rollback paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use intake_core::{
    ApplicationData, ApplicationId, ApplicationRecord, Clock, RowId, StorageError, StorageResult,
    SystemClock, Timestamp,
};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

use crate::{ApplicationStore, InsertedRow, SubmissionTransaction};

/// Name of the uniqueness constraint on the applicant PAN.
pub const PAN_UNIQUE_CONSTRAINT: &str = "applications_pan_key";

/// Default number of concurrent transactions.
pub const DEFAULT_SESSIONS: usize = 16;

/// Protocol step at which an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    Insert,
    AssignId,
    Commit,
}

impl FaultPoint {
    fn bit(self) -> u8 {
        match self {
            FaultPoint::Begin => 0b0001,
            FaultPoint::Insert => 0b0010,
            FaultPoint::AssignId => 0b0100,
            FaultPoint::Commit => 0b1000,
        }
    }
}

#[derive(Debug)]
struct Inner {
    rows: RwLock<BTreeMap<RowId, ApplicationRecord>>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
    sessions: Arc<Semaphore>,
    faults: AtomicU8,
}

impl Inner {
    fn check_fault(&self, point: FaultPoint) -> StorageResult<()> {
        if self.faults.load(Ordering::SeqCst) & point.bit() != 0 {
            return Err(StorageError::TransactionFailed {
                reason: format!("injected fault at {:?}", point),
            });
        }
        Ok(())
    }
}

/// Transactional in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store stamped by the system clock with [`DEFAULT_SESSIONS`] sessions.
    pub fn new() -> Self {
        Self::with_options(Arc::new(SystemClock), DEFAULT_SESSIONS)
    }

    pub fn with_options(clock: Arc<dyn Clock>, sessions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: RwLock::new(BTreeMap::new()),
                next_id: AtomicI64::new(1),
                clock,
                sessions: Arc::new(Semaphore::new(sessions)),
                faults: AtomicU8::new(0),
            }),
        }
    }

    /// Make every subsequent pass through `point` fail.
    pub fn inject_fault(&self, point: FaultPoint) {
        self.inner.faults.fetch_or(point.bit(), Ordering::SeqCst);
    }

    pub fn clear_faults(&self) {
        self.inner.faults.store(0, Ordering::SeqCst);
    }

    /// Move the key sequence forward so the next insert gets at least `next`.
    pub fn advance_sequence_to(&self, next: RowId) {
        self.inner.next_id.fetch_max(next, Ordering::SeqCst);
    }

    /// Number of committed rows.
    pub async fn len(&self) -> usize {
        self.inner.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.rows.read().await.is_empty()
    }

    /// Sessions not currently held by a transaction.
    pub fn idle_sessions(&self) -> usize {
        self.inner.sessions.available_permits()
    }

    /// Refuse new sessions, as a pool does after shutdown.
    pub fn close(&self) {
        self.inner.sessions.close();
    }
}

/// Key of the PAN uniqueness constraint, read like `#>> '{personal,pan}'`:
/// strings as sent, other values as JSON text, and nothing for JSON null.
fn pan_of(data: &ApplicationData) -> Option<String> {
    let value = data.as_value().pointer("/personal/pan")?;
    if value.is_null() {
        return None;
    }
    Some(value.as_str().map_or_else(|| value.to_string(), str::to_owned))
}

fn pan_taken(
    rows: &BTreeMap<RowId, ApplicationRecord>,
    pan: &str,
    except: Option<RowId>,
) -> bool {
    rows.values().any(|r| {
        Some(r.id) != except && pan_of(&r.application_data).as_deref() == Some(pan)
    })
}

fn duplicate() -> StorageError {
    StorageError::Duplicate {
        constraint: PAN_UNIQUE_CONSTRAINT.to_string(),
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn begin(&self) -> StorageResult<Box<dyn SubmissionTransaction>> {
        let session = self
            .inner
            .sessions
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::Unavailable {
                reason: "session pool is closed".to_string(),
            })?;
        self.inner.check_fault(FaultPoint::Begin)?;

        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            started_at: self.inner.clock.now(),
            staged: Vec::new(),
            _session: session,
        }))
    }

    async fn get(&self, application_id: &str) -> StorageResult<Option<ApplicationRecord>> {
        let rows = self.inner.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.application_id.as_str() == application_id)
            .cloned())
    }

    async fn list(&self) -> StorageResult<Vec<ApplicationRecord>> {
        let rows = self.inner.rows.read().await;
        Ok(rows.values().rev().cloned().collect())
    }

    async fn replace_data(
        &self,
        application_id: &str,
        data: &ApplicationData,
    ) -> StorageResult<bool> {
        let mut rows = self.inner.rows.write().await;
        let Some(row_id) = rows
            .values()
            .find(|r| r.application_id.as_str() == application_id)
            .map(|r| r.id)
        else {
            return Ok(false);
        };

        if let Some(pan) = pan_of(data) {
            if pan_taken(&rows, &pan, Some(row_id)) {
                return Err(duplicate());
            }
        }

        if let Some(row) = rows.get_mut(&row_id) {
            row.application_data = data.clone();
        }
        Ok(true)
    }

    async fn delete(&self, application_id: &str) -> StorageResult<bool> {
        let mut rows = self.inner.rows.write().await;
        let before = rows.len();
        rows.retain(|_, r| r.application_id.as_str() != application_id);
        Ok(rows.len() != before)
    }

    async fn health_check(&self) -> StorageResult<()> {
        if self.inner.sessions.is_closed() {
            return Err(StorageError::Unavailable {
                reason: "session pool is closed".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct StagedRow {
    id: RowId,
    data: ApplicationData,
    application_id: Option<ApplicationId>,
}

/// Uncommitted work of one submission. Dropping it discards the staged rows
/// and returns the session permit.
struct MemoryTransaction {
    inner: Arc<Inner>,
    started_at: Timestamp,
    staged: Vec<StagedRow>,
    _session: OwnedSemaphorePermit,
}

#[async_trait]
impl SubmissionTransaction for MemoryTransaction {
    async fn insert(&mut self, data: &ApplicationData) -> StorageResult<InsertedRow> {
        self.inner.check_fault(FaultPoint::Insert)?;

        if let Some(pan) = pan_of(data) {
            let rows = self.inner.rows.read().await;
            let staged_clash = self
                .staged
                .iter()
                .any(|s| pan_of(&s.data).as_deref() == Some(pan.as_str()));
            if staged_clash || pan_taken(&rows, &pan, None) {
                return Err(duplicate());
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.staged.push(StagedRow {
            id,
            data: data.clone(),
            application_id: None,
        });

        Ok(InsertedRow {
            id,
            created_at: self.started_at,
        })
    }

    async fn set_application_id(
        &mut self,
        row_id: RowId,
        application_id: &ApplicationId,
    ) -> StorageResult<()> {
        self.inner.check_fault(FaultPoint::AssignId)?;

        let row = self
            .staged
            .iter_mut()
            .find(|s| s.id == row_id)
            .ok_or_else(|| StorageError::Query {
                reason: format!("row {} was not inserted by this transaction", row_id),
            })?;
        if row.application_id.is_some() {
            return Err(StorageError::Query {
                reason: format!("row {} already has a display identifier", row_id),
            });
        }
        row.application_id = Some(application_id.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.inner.check_fault(FaultPoint::Commit)?;

        let mut rows = self.inner.rows.write().await;
        let mut records = Vec::with_capacity(self.staged.len());
        for staged in &self.staged {
            let application_id = staged.application_id.clone().ok_or_else(|| {
                StorageError::TransactionFailed {
                    reason: format!("row {} has no display identifier", staged.id),
                }
            })?;
            if let Some(pan) = pan_of(&staged.data) {
                if pan_taken(&rows, &pan, None) {
                    return Err(duplicate());
                }
            }
            records.push(ApplicationRecord {
                id: staged.id,
                application_id,
                application_data: staged.data.clone(),
                created_at: self.started_at,
            });
        }

        for record in records {
            rows.insert(record.id, record);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
