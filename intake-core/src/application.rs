//! Application payload and stored record types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;
use crate::identity::{ApplicationId, RowId};

/// Fields a submission must carry, as (dotted name, JSON path) pairs.
pub const REQUIRED_FIELDS: [(&str, &[&str]); 4] = [
    ("personal.fullName", &["personal", "fullName"]),
    ("personal.pan", &["personal", "pan"]),
    ("contact.mobile", &["contact", "mobile"]),
    ("contact.email", &["contact", "email"]),
];

/// Structured submission payload.
///
/// Opaque to the store: it is persisted and returned exactly as received.
/// Only the presence checks in [`ApplicationData::applicant`] look inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = Object))]
#[serde(transparent)]
pub struct ApplicationData(JsonValue);

impl ApplicationData {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }

    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    /// Read the value at `path` as text, if it is present.
    ///
    /// Presence follows JSON truthiness: `null`, `false`, `0` and `""` are
    /// absent, everything else is present. Strings are returned as sent;
    /// other values are rendered as compact JSON.
    pub fn text_at(&self, path: &[&str]) -> Option<String> {
        let mut node = &self.0;
        for key in path {
            node = node.get(key)?;
        }
        match node {
            JsonValue::Null | JsonValue::Bool(false) => None,
            JsonValue::String(s) if s.is_empty() => None,
            JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Extract the applicant's required fields.
    ///
    /// # Errors
    /// Returns [`ValidationError::RequiredFieldsMissing`] listing every
    /// absent field, in declaration order.
    pub fn applicant(&self) -> Result<Applicant, ValidationError> {
        if !self.0.is_object() {
            return Err(ValidationError::InvalidPayload {
                reason: "application payload must be a JSON object".to_string(),
            });
        }

        let mut values = Vec::with_capacity(REQUIRED_FIELDS.len());
        let mut missing = Vec::new();
        for (name, path) in REQUIRED_FIELDS {
            match self.text_at(path) {
                Some(v) => values.push(v),
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ValidationError::RequiredFieldsMissing { fields: missing });
        }

        let mut values = values.into_iter();
        Ok(Applicant {
            full_name: values.next().unwrap_or_default(),
            pan: values.next().unwrap_or_default(),
            mobile: values.next().unwrap_or_default(),
            email: values.next().unwrap_or_default(),
        })
    }
}

impl From<JsonValue> for ApplicationData {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// The required fields of a validated submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicant {
    pub full_name: String,
    pub pan: String,
    pub mobile: String,
    pub email: String,
}

/// A committed application row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    /// Store-assigned row key
    pub id: RowId,
    /// Display identifier derived from `id` and the creation month
    pub application_id: ApplicationId,
    /// Submitted payload, replaced wholesale on update
    pub application_data: ApplicationData,
    /// Insert time
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Listing view of a record (no row key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub application_id: ApplicationId,
    pub application_data: ApplicationData,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ApplicationRecord> for ApplicationSummary {
    fn from(record: ApplicationRecord) -> Self {
        Self {
            application_id: record.application_id,
            application_data: record.application_data,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> ApplicationData {
        ApplicationData::new(json!({
            "personal": { "fullName": "A", "pan": "X" },
            "contact": { "mobile": "1", "email": "a@b.com" }
        }))
    }

    #[test]
    fn test_applicant_extracts_required_fields() {
        let applicant = complete().applicant().expect("complete payload");
        assert_eq!(applicant.full_name, "A");
        assert_eq!(applicant.pan, "X");
        assert_eq!(applicant.mobile, "1");
        assert_eq!(applicant.email, "a@b.com");
    }

    #[test]
    fn test_applicant_reports_missing_email() {
        let data = ApplicationData::new(json!({
            "personal": { "fullName": "A", "pan": "X" },
            "contact": { "mobile": "1" }
        }));
        let err = data.applicant().unwrap_err();
        assert_eq!(
            err,
            ValidationError::RequiredFieldsMissing {
                fields: vec!["contact.email".to_string()]
            }
        );
    }

    #[test]
    fn test_applicant_reports_all_missing_in_order() {
        let data = ApplicationData::new(json!({ "personal": { "pan": "" } }));
        match data.applicant() {
            Err(ValidationError::RequiredFieldsMissing { fields }) => assert_eq!(
                fields,
                vec![
                    "personal.fullName",
                    "personal.pan",
                    "contact.mobile",
                    "contact.email"
                ]
            ),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_numeric_mobile_counts_as_present() {
        let data = ApplicationData::new(json!({
            "personal": { "fullName": "A", "pan": "X" },
            "contact": { "mobile": 9876543210u64, "email": "a@b.com" }
        }));
        assert_eq!(data.applicant().map(|a| a.mobile).ok(), Some("9876543210".to_string()));
    }

    #[test]
    fn test_falsy_fields_are_absent() {
        let data = ApplicationData::new(json!({
            "personal": { "fullName": null, "pan": false },
            "contact": { "mobile": 0, "email": "" }
        }));
        match data.applicant() {
            Err(ValidationError::RequiredFieldsMissing { fields }) => assert_eq!(fields.len(), 4),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_truthy_non_strings_are_present() {
        let data = ApplicationData::new(json!({
            "personal": { "fullName": " ", "pan": true },
            "contact": { "mobile": ["1"], "email": "a@b.com" }
        }));
        let applicant = data.applicant().expect("truthy values count as present");
        assert_eq!(applicant.full_name, " ");
        assert_eq!(applicant.pan, "true");
        assert_eq!(applicant.mobile, "[\"1\"]");
    }

    #[test]
    fn test_non_object_payload_is_invalid() {
        let data = ApplicationData::new(json!(["not", "an", "object"]));
        assert!(matches!(
            data.applicant(),
            Err(ValidationError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_payload_round_trips_untouched() -> Result<(), serde_json::Error> {
        let raw = json!({
            "personal": { "fullName": "A", "pan": "X", "extra": [1, 2, 3] },
            "contact": { "mobile": "1", "email": "a@b.com" },
            "notes": null
        });
        let data: ApplicationData = serde_json::from_value(raw.clone())?;
        assert_eq!(serde_json::to_value(&data)?, raw);
        Ok(())
    }

    #[test]
    fn test_record_serializes_camel_case() -> Result<(), serde_json::Error> {
        use chrono::TimeZone;
        let created_at = chrono::Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let record = ApplicationRecord {
            id: 7,
            application_id: ApplicationId::assign(7, created_at),
            application_data: complete(),
            created_at,
        };
        let json = serde_json::to_value(ApplicationSummary::from(record))?;
        assert_eq!(json["applicationId"], "APP-202505-00007");
        assert!(json.get("applicationData").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("id").is_none());
        Ok(())
    }
}
