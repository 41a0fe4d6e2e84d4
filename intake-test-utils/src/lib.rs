//! Intake Test Utilities
//!
//! Shared test infrastructure for the intake workspace:
//! - Proptest generators for applicants and payloads
//! - Payload fixtures for common scenarios
//! - Recording and failing notifiers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

// Re-export the in-memory store from its source crate
pub use intake_storage::{ApplicationStore, FaultPoint, MemoryStore, SubmissionTransaction};

// Re-export core types for convenience
pub use intake_core::{
    Applicant, ApplicationData, ApplicationId, ApplicationRecord, Clock, FixedClock,
    Notification, NotificationError, Notifier, StorageError, Timestamp,
};

// ============================================================================
// NOTIFIERS
// ============================================================================

/// Notifier that keeps every message it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport {
                reason: "recording notifier lock poisoned".to_string(),
            })?
            .push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Notifier whose relay is always unreachable.
#[derive(Debug, Clone, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport {
            reason: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating applicants and payloads.

    use super::*;
    use proptest::prelude::*;

    /// A PAN in the usual `AAAAA9999A` layout.
    pub fn arb_pan() -> impl Strategy<Value = String> {
        "[A-Z]{5}[0-9]{4}[A-Z]"
    }

    pub fn arb_full_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,10} [A-Z][a-z]{2,12}"
    }

    pub fn arb_mobile() -> impl Strategy<Value = String> {
        "[6-9][0-9]{9}"
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        "[a-z]{3,12}@[a-z]{3,8}\\.(com|in|org)"
    }

    /// A complete valid applicant.
    pub fn arb_applicant() -> impl Strategy<Value = Applicant> {
        (arb_full_name(), arb_pan(), arb_mobile(), arb_email()).prop_map(
            |(full_name, pan, mobile, email)| Applicant {
                full_name,
                pan,
                mobile,
                email,
            },
        )
    }

    /// A valid payload, possibly with extra sections.
    pub fn arb_application_data() -> impl Strategy<Value = ApplicationData> {
        (arb_applicant(), proptest::option::of("[a-z ]{0,40}")).prop_map(
            |(applicant, remarks)| {
                let mut data = fixtures::payload_for(&applicant);
                if let (Some(remarks), Some(obj)) = (remarks, data.as_object_mut()) {
                    obj.insert("remarks".to_string(), serde_json::json!(remarks));
                }
                ApplicationData::new(data)
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and stores for common testing scenarios.

    use super::*;
    use serde_json::{json, Value as JsonValue};

    /// 14 May 2025, 10:30 UTC.
    pub fn may_2025() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 5, 14, 10, 30, 0)
            .single()
            .unwrap_or_default()
    }

    /// A store whose clock is frozen at `at`.
    pub fn store_at(at: Timestamp) -> MemoryStore {
        MemoryStore::with_options(
            Arc::new(FixedClock(at)),
            intake_storage::memory::DEFAULT_SESSIONS,
        )
    }

    pub fn applicant(n: u32) -> Applicant {
        Applicant {
            full_name: format!("Applicant {}", n),
            pan: format!("ABCDE{:04}F", n % 10_000),
            mobile: format!("98765{:05}", n % 100_000),
            email: format!("applicant{}@example.com", n),
        }
    }

    /// The usual nested payload shape for `applicant`.
    pub fn payload_for(applicant: &Applicant) -> JsonValue {
        json!({
            "personal": {
                "fullName": applicant.full_name,
                "pan": applicant.pan,
                "dob": "1990-01-01"
            },
            "contact": {
                "mobile": applicant.mobile,
                "email": applicant.email
            },
            "address": {
                "city": "Pune",
                "pincode": "411001"
            }
        })
    }

    /// A valid payload for the `n`th distinct applicant.
    pub fn valid_payload(n: u32) -> JsonValue {
        payload_for(&applicant(n))
    }

    /// A valid payload with `contact.email` removed.
    pub fn payload_without_email(n: u32) -> JsonValue {
        let mut payload = valid_payload(n);
        if let Some(contact) = payload.get_mut("contact").and_then(JsonValue::as_object_mut) {
            contact.remove("email");
        }
        payload
    }
}
