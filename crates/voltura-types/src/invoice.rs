//! Invoices, the payment ledger, and point-of-sale requests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::customer::CustomerRef;
use crate::quotation::LineItem;

/// An invoice, materialized from an accepted quotation or created by a POS sale.
///
/// `balance` is always `total - sum(payments)`, recomputed from the full ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// Human-facing number ("INV-..." or "POS-...").
    pub number: String,
    pub customer_id: Uuid,
    pub job_id: Option<Uuid>,
    /// Source quotation; unique across invoices.
    pub quotation_id: Option<Uuid>,
    pub total: Decimal,
    pub balance: Decimal,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable payment ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// A payment to be appended to an invoice's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Decimal,
    pub method: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl NewPayment {
    pub fn validate(&self) -> Result<(), String> {
        if self.amount <= Decimal::ZERO {
            return Err("payment amount must be positive".into());
        }
        if self.method.trim().is_empty() {
            return Err("payment method is required".into());
        }
        Ok(())
    }

    pub fn into_payment(self, invoice_id: Uuid, now: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::now_v7(),
            invoice_id,
            amount: self.amount.round_dp(2),
            method: self.method,
            reference: self.reference,
            received_at: now,
        }
    }
}

/// Invoice balance given its total and every payment recorded against it.
pub fn balance_from_ledger(total: Decimal, payments: &[Payment]) -> Decimal {
    let paid: Decimal = payments.iter().map(|p| p.amount).sum();
    (total - paid).round_dp(2)
}

/// A point-of-sale request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub payments: Vec<NewPayment>,
}

/// Result of recording a sale or a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithPayments {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payment(amount: &str) -> Payment {
        NewPayment {
            amount: dec(amount),
            method: "cash".into(),
            reference: None,
        }
        .into_payment(Uuid::now_v7(), Utc::now())
    }

    #[test]
    fn test_balance_fully_paid() {
        let payments = vec![payment("60.00"), payment("40.00")];
        assert_eq!(balance_from_ledger(dec("100.00"), &payments), dec("0.00"));
    }

    #[test]
    fn test_balance_partially_paid() {
        let payments = vec![payment("30.00")];
        assert_eq!(balance_from_ledger(dec("100.00"), &payments), dec("70.00"));
    }

    #[test]
    fn test_balance_no_payments() {
        assert_eq!(balance_from_ledger(dec("100.00"), &[]), dec("100.00"));
    }

    #[test]
    fn test_new_payment_validation() {
        let zero = NewPayment {
            amount: Decimal::ZERO,
            method: "cash".into(),
            reference: None,
        };
        assert!(zero.validate().is_err());

        let no_method = NewPayment {
            amount: dec("10"),
            method: " ".into(),
            reference: None,
        };
        assert!(no_method.validate().is_err());
    }
}
