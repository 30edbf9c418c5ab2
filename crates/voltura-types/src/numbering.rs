//! Human-facing document numbers ("QT-...", "INV-...", "POS-...", "JOB-...").

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Build a document number from a prefix and a millisecond timestamp.
///
/// A short random suffix keeps numbers minted in the same millisecond distinct.
pub fn document_number(prefix: &str, now: DateTime<Utc>) -> String {
    let entropy = Uuid::now_v7();
    let bytes = entropy.as_bytes();
    format!(
        "{prefix}-{}-{:02X}{:02X}",
        now.timestamp_millis(),
        bytes[14],
        bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_number_shape() {
        let now = Utc::now();
        let number = document_number("INV", now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 4);
    }
}
