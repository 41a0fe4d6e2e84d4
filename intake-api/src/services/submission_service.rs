//! Submission Service
//!
//! Coordinates one submission: validate, then insert, assign the display
//! identifier, and commit inside a single transaction, and only then send
//! the confirmation email. Also fronts the read, replace and delete
//! operations so handlers never talk to the store directly.

use std::sync::Arc;
use std::time::Instant;

use intake_core::{
    Applicant, ApplicationData, ApplicationId, ApplicationRecord, Notification, RowId,
    StorageError, StorageResult, Timestamp,
};
use intake_storage::{ApplicationStore, InsertedRow, SubmissionTransaction};

use crate::error::{ApiError, ApiResult};
use crate::mailer::NotificationDispatcher;
use crate::telemetry::metrics;

/// Subject line of the confirmation email.
pub const CONFIRMATION_SUBJECT: &str = "Application Submitted Successfully";

/// Result of a committed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub row_id: RowId,
    pub application_id: ApplicationId,
    pub created_at: Timestamp,
}

/// Build the confirmation email for a committed submission.
pub fn confirmation_email(applicant: &Applicant, application_id: &ApplicationId) -> Notification {
    Notification::new(
        Some(applicant.email.clone()),
        CONFIRMATION_SUBJECT,
        format!(
            "Hello {},\n\nYour application has been submitted successfully.\nApplication ID: {}",
            applicant.full_name, application_id
        ),
    )
}

/// Application intake operations.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn ApplicationStore>,
    notifications: NotificationDispatcher,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn ApplicationStore>, notifications: NotificationDispatcher) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// Accept a new application.
    ///
    /// Required fields are checked before a session is taken. The
    /// confirmation email is attempted only after COMMIT and its outcome
    /// never changes the result.
    ///
    /// # Errors
    /// - `MissingField` / `InvalidInput` when validation fails (no row written)
    /// - `DuplicateApplication` when a uniqueness constraint rejects the row
    /// - `DatabaseError` for any other store failure (rolled back)
    pub async fn submit(&self, data: ApplicationData) -> ApiResult<SubmissionReceipt> {
        let applicant = data.applicant().map_err(|e| {
            record_submission("rejected");
            tracing::debug!(error = %e, "Submission failed validation");
            ApiError::from(e)
        })?;

        let started = Instant::now();
        let persisted = self.persist(&data).await;
        if let Some(metrics) = metrics() {
            metrics.observe_transaction(started.elapsed().as_secs_f64());
        }

        let receipt = persisted.map_err(|e| {
            let outcome = match e {
                StorageError::Duplicate { .. } => "rejected",
                _ => "failed",
            };
            record_submission(outcome);
            ApiError::from(e)
        })?;

        record_submission("accepted");
        tracing::info!(
            application_id = %receipt.application_id,
            row_id = receipt.row_id,
            "Application submitted"
        );

        let outcome = self
            .notifications
            .dispatch(confirmation_email(&applicant, &receipt.application_id))
            .await;
        tracing::debug!(
            application_id = %receipt.application_id,
            outcome = outcome.as_str(),
            "Confirmation email dispatched"
        );

        Ok(receipt)
    }

    /// Insert, assign and commit on one session.
    ///
    /// Any failure before COMMIT rolls back. If this future is dropped
    /// mid-way, the transaction's own drop rolls back instead.
    async fn persist(&self, data: &ApplicationData) -> StorageResult<SubmissionReceipt> {
        let mut tx = self.store.begin().await?;

        match stage(tx.as_mut(), data).await {
            Ok((row, application_id)) => {
                tx.commit().await?;
                Ok(SubmissionReceipt {
                    row_id: row.id,
                    application_id,
                    created_at: row.created_at,
                })
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed submission failed");
                }
                Err(e)
            }
        }
    }

    /// Fetch one record by display identifier.
    pub async fn fetch(&self, application_id: &str) -> ApiResult<ApplicationRecord> {
        self.store
            .get(application_id)
            .await?
            .ok_or_else(|| ApiError::application_not_found(application_id))
    }

    /// All records, newest first.
    pub async fn list(&self) -> ApiResult<Vec<ApplicationRecord>> {
        Ok(self.store.list().await?)
    }

    /// Replace a record's payload wholesale.
    pub async fn replace(&self, application_id: &str, data: ApplicationData) -> ApiResult<()> {
        if !data.is_object() {
            return Err(ApiError::invalid_input(
                "Application data must be a JSON object",
            ));
        }

        if !self.store.replace_data(application_id, &data).await? {
            return Err(ApiError::application_not_found(application_id));
        }
        tracing::info!(%application_id, "Application updated");
        Ok(())
    }

    /// Delete a record.
    pub async fn remove(&self, application_id: &str) -> ApiResult<()> {
        if !self.store.delete(application_id).await? {
            return Err(ApiError::application_not_found(application_id));
        }
        tracing::info!(%application_id, "Application deleted");
        Ok(())
    }
}

async fn stage(
    tx: &mut dyn SubmissionTransaction,
    data: &ApplicationData,
) -> StorageResult<(InsertedRow, ApplicationId)> {
    let row = tx.insert(data).await?;
    let application_id = ApplicationId::assign(row.id, row.created_at);
    tx.set_application_id(row.id, &application_id).await?;
    Ok((row, application_id))
}

fn record_submission(outcome: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_submission(outcome);
    }
}
