//! Identity types for application records
//!
//! Every stored application carries two identifiers: the numeric row key
//! handed out by the store's sequence, and the human-readable display
//! identifier `APP-{YYYYMM}-{row:05}` derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Numeric primary key assigned by the store. Always positive.
pub type RowId = i64;

/// Literal prefix of every display identifier.
pub const APPLICATION_ID_PREFIX: &str = "APP";

/// Minimum width of the zero-padded row component.
const ROW_WIDTH: usize = 5;

/// Human-readable display identifier of an application.
///
/// Values are only minted by [`ApplicationId::assign`] or loaded back from
/// the store; path parameters stay plain strings so that lookups of
/// malformed identifiers resolve to "not found" rather than a format error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String, example = "APP-202505-00007"))]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Derive the display identifier for `row_id` in the month of `at`.
    ///
    /// Pure and deterministic. The month is taken in UTC. Row ids of six or
    /// more digits widen the field instead of being truncated.
    pub fn assign(row_id: RowId, at: Timestamp) -> Self {
        debug_assert!(row_id > 0, "row ids come from the store sequence and are positive");
        Self(format!(
            "{}-{}-{:0width$}",
            APPLICATION_ID_PREFIX,
            at.format("%Y%m"),
            row_id,
            width = ROW_WIDTH
        ))
    }

    /// Wrap an identifier that was read back from the store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Split the identifier into its month and row components.
    ///
    /// Returns `None` when the value does not follow the `APP-YYYYMM-NNNNN`
    /// layout.
    pub fn parts(&self) -> Option<IdParts> {
        let rest = self.0.strip_prefix(APPLICATION_ID_PREFIX)?.strip_prefix('-')?;
        let (month, row) = rest.split_once('-')?;
        if month.len() != 6 || row.len() < ROW_WIDTH {
            return None;
        }
        if !month.bytes().all(|b| b.is_ascii_digit()) || !row.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i32 = month[..4].parse().ok()?;
        let month_num: u32 = month[4..].parse().ok()?;
        if !(1..=12).contains(&month_num) {
            return None;
        }
        let row_id: RowId = row.parse().ok()?;
        Some(IdParts {
            year,
            month: month_num,
            row_id,
        })
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ApplicationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decomposed display identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub year: i32,
    pub month: u32,
    pub row_id: RowId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn may_2025() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 5, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_assign_seventh_row_in_may() {
        let id = ApplicationId::assign(7, may_2025());
        assert_eq!(id.as_str(), "APP-202505-00007");
    }

    #[test]
    fn test_assign_pads_to_five_digits() {
        assert_eq!(ApplicationId::assign(1, may_2025()).as_str(), "APP-202505-00001");
        assert_eq!(ApplicationId::assign(12345, may_2025()).as_str(), "APP-202505-12345");
    }

    #[test]
    fn test_assign_widens_past_five_digits() {
        assert_eq!(ApplicationId::assign(100000, may_2025()).as_str(), "APP-202505-100000");
        assert_eq!(
            ApplicationId::assign(9_876_543, may_2025()).as_str(),
            "APP-202505-9876543"
        );
    }

    #[test]
    fn test_assign_uses_utc_month() {
        // 23:30 on Jan 31 in UTC is already February further east; UTC wins.
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        assert_eq!(ApplicationId::assign(3, at).as_str(), "APP-202401-00003");

        let at = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(ApplicationId::assign(3, at).as_str(), "APP-202412-00003");
    }

    #[test]
    fn test_parts() {
        let parts = ApplicationId::assign(42, may_2025()).parts();
        assert_eq!(
            parts,
            Some(IdParts {
                year: 2025,
                month: 5,
                row_id: 42
            })
        );

        assert_eq!(ApplicationId::from_stored("UNKNOWN-ID").parts(), None);
        assert_eq!(ApplicationId::from_stored("APP-202513-00001").parts(), None);
        assert_eq!(ApplicationId::from_stored("APP-2025-00001").parts(), None);
        assert_eq!(ApplicationId::from_stored("APP-202505-001").parts(), None);
    }

    #[test]
    fn test_serializes_as_plain_string() -> Result<(), serde_json::Error> {
        let id = ApplicationId::assign(7, may_2025());
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, "\"APP-202505-00007\"");
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_assign_matches_layout(
            row_id in 1i64..10_000_000,
            year in 2000i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
        ) {
            let at = Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap();
            let id = ApplicationId::assign(row_id, at);
            let expected = format!("APP-{:04}{:02}-{:05}", year, month, row_id);
            prop_assert_eq!(id.as_str(), expected.as_str());
            prop_assert_eq!(id.parts(), Some(IdParts { year, month, row_id }));
        }

        #[test]
        fn prop_distinct_rows_get_distinct_ids(a in 1i64..1_000_000, b in 1i64..1_000_000) {
            prop_assume!(a != b);
            let at = may_2025();
            prop_assert_ne!(ApplicationId::assign(a, at), ApplicationId::assign(b, at));
        }
    }
}
