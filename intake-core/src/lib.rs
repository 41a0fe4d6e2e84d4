//! Intake Core - Entity Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! the display identifier and its assigner, the opaque application payload,
//! the stored record shape, the clock abstraction, the notifier seam and the
//! error taxonomy. Nothing in here touches I/O.

pub mod application;
pub mod clock;
pub mod error;
pub mod identity;
pub mod notify;

pub use application::{
    Applicant, ApplicationData, ApplicationRecord, ApplicationSummary, REQUIRED_FIELDS,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{NotificationError, StorageError, StorageResult, ValidationError};
pub use identity::{ApplicationId, IdParts, RowId, Timestamp, APPLICATION_ID_PREFIX};
pub use notify::{Notification, Notifier};
