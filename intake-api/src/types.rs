//! Response envelopes
//!
//! Every successful body carries `"success": true` next to its payload.

use intake_core::{ApplicationId, ApplicationRecord, ApplicationSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `201 Created` after a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    /// Display identifier, e.g. `APP-202505-00007`
    pub application_id: ApplicationId,
}

impl SubmitResponse {
    pub fn new(application_id: ApplicationId) -> Self {
        Self {
            success: true,
            application_id,
        }
    }
}

/// All applications, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListResponse {
    pub success: bool,
    pub applications: Vec<ApplicationSummary>,
}

impl ListResponse {
    pub fn new(records: Vec<ApplicationRecord>) -> Self {
        Self {
            success: true,
            applications: records.into_iter().map(ApplicationSummary::from).collect(),
        }
    }
}

/// One application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GetResponse {
    pub success: bool,
    pub application: ApplicationRecord,
}

impl GetResponse {
    pub fn new(application: ApplicationRecord) -> Self {
        Self {
            success: true,
            application,
        }
    }
}

/// Acknowledgement for update and delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
