//! Column encoding helpers shared by the SQLite repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use voltura_types::error::RepositoryError;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 (`2025-03-01T08:00:00.000000000Z`), so that text
/// comparison in SQL orders timestamps chronologically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_decimal(s: &str) -> Result<Decimal, RepositoryError> {
    s.parse::<Decimal>()
        .map_err(|e| RepositoryError::Query(format!("invalid decimal '{s}': {e}")))
}

pub(crate) fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, RepositoryError> {
    s.parse().map_err(RepositoryError::Query)
}

pub(crate) fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Map a UNIQUE violation to `Conflict`, anything else to `Query`.
pub(crate) fn conflict_or_query(e: sqlx::Error, conflict: impl FnOnce() -> String) -> RepositoryError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
            RepositoryError::Conflict(conflict())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_text_orders_chronologically() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let b = a + chrono::Duration::nanoseconds(1_500);
        let c = a + chrono::Duration::seconds(1);
        let (fa, fb, fc) = (format_datetime(&a), format_datetime(&b), format_datetime(&c));
        assert!(fa < fb && fb < fc);
        assert_eq!(fa.len(), fc.len());
        assert_eq!(parse_datetime(&fb).unwrap(), b);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("70.00").unwrap().to_string(), "70.00");
        assert!(parse_decimal("seventy").is_err());
    }
}
