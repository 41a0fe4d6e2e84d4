//! Service Layer
//!
//! Business logic between the HTTP handlers and the Record Store. Handlers
//! stay thin; services own transactions and side effects.

mod submission_service;

pub use submission_service::*;
