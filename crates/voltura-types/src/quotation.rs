//! Quotation types and line-item arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::customer::CustomerRef;

/// A priced line on a quotation, invoice or sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Inventory item decremented by this line (sales only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            item_id: None,
        }
    }

    pub fn amount(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Sum of all line amounts, rounded to cents.
pub fn line_total(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::amount).sum::<Decimal>().round_dp(2)
}

/// Reject empty lists, blank descriptions, zero quantities and negative prices.
pub fn validate_line_items(items: &[LineItem]) -> Result<(), String> {
    if items.is_empty() {
        return Err("at least one line item is required".into());
    }
    for (i, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(format!("line {}: description is required", i + 1));
        }
        if item.quantity == 0 {
            return Err(format!("line {}: quantity must be positive", i + 1));
        }
        if item.unit_price.is_sign_negative() {
            return Err(format!("line {}: unit price must not be negative", i + 1));
        }
    }
    Ok(())
}

/// Quotation lifecycle: `Sent -> Accepted | Rejected`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotationStatus {
    Sent,
    Accepted,
    Rejected,
}

impl fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotationStatus::Sent => write!(f, "SENT"),
            QuotationStatus::Accepted => write!(f, "ACCEPTED"),
            QuotationStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for QuotationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SENT" => Ok(QuotationStatus::Sent),
            "ACCEPTED" => Ok(QuotationStatus::Accepted),
            "REJECTED" => Ok(QuotationStatus::Rejected),
            other => Err(format!("invalid quotation status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: Uuid,
    /// Human-facing number ("QT-...").
    pub number: String,
    pub customer_id: Uuid,
    pub job_id: Option<Uuid>,
    pub status: QuotationStatus,
    pub total: Decimal,
    pub line_items: Vec<LineItem>,
    pub notes: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    /// When the quotation was accepted or rejected.
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a quotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuotation {
    pub customer: CustomerRef,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Result of accepting a quotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedQuotation {
    pub quotation: Quotation,
    pub invoice: crate::invoice::Invoice,
    /// False when the quotation was already accepted and the invoice was refreshed in place.
    pub newly_accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_line_total() {
        let items = vec![
            LineItem::new("Screen replacement", 1, dec("250.00")),
            LineItem::new("Screen protector", 2, dec("15.50")),
        ];
        assert_eq!(line_total(&items), dec("281.00"));
    }

    #[test]
    fn test_validate_line_items() {
        assert!(validate_line_items(&[]).is_err());
        assert!(validate_line_items(&[LineItem::new("Battery", 0, dec("10"))]).is_err());
        assert!(validate_line_items(&[LineItem::new("  ", 1, dec("10"))]).is_err());
        assert!(validate_line_items(&[LineItem::new("Battery", 1, dec("-1"))]).is_err());
        assert!(validate_line_items(&[LineItem::new("Diagnosis", 1, Decimal::ZERO)]).is_ok());
    }

    #[test]
    fn test_line_item_deserializes_without_item_id() {
        let item: LineItem =
            serde_json::from_str(r#"{"description":"Battery","quantity":2,"unit_price":"89.90"}"#)
                .unwrap();
        assert_eq!(item.amount(), dec("179.80"));
        assert!(item.item_id.is_none());
    }

    #[test]
    fn test_quotation_status_parse() {
        assert_eq!("accepted".parse::<QuotationStatus>().unwrap(), QuotationStatus::Accepted);
        assert!("approved".parse::<QuotationStatus>().is_err());
    }
}
