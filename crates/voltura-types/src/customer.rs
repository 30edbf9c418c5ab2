//! CRM customer types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::invoice::Invoice;
use crate::job::Job;
use crate::quotation::Quotation;

/// Minimum length of a phone key accepted from manual input.
pub const MIN_PHONE_LEN: usize = 6;

/// A customer, identified by phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    /// Normalized phone key (digits, optional leading `+`). Unique.
    pub phone: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// A customer first seen through the chat transport; display name defaults to the phone.
    pub fn from_phone(phone: impl Into<String>, now: DateTime<Utc>) -> Self {
        let phone = phone.into();
        Self {
            id: Uuid::now_v7(),
            name: phone.clone(),
            phone,
            email: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reference to a customer in a business request: an existing id, or name + phone
/// for a customer that may not exist yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRef {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CustomerRef {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_some() {
            return Ok(());
        }
        let name_ok = self.name.as_deref().is_some_and(|n| !n.trim().is_empty());
        let phone_ok = self.phone.as_deref().is_some_and(|p| p.trim().len() >= MIN_PHONE_LEN);
        if name_ok && phone_ok {
            Ok(())
        } else {
            Err("provide an existing customer id or the name and phone for a new customer".into())
        }
    }
}

/// Customer listing row with related record counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub jobs: i64,
    pub invoices: i64,
    pub created_at: DateTime<Utc>,
}

/// A customer with their jobs, quotations and invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub jobs: Vec<Job>,
    pub quotations: Vec<Quotation>,
    pub invoices: Vec<Invoice>,
}

/// Normalize a transport counterpart identifier into a phone key.
///
/// Strips the `@domain` suffix and any `:device` suffix, then keeps digits and a
/// leading `+`. Returns `None` when nothing phone-like remains.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let local = raw.split('@').next().unwrap_or_default();
    let local = local.split(':').next().unwrap_or_default().trim();

    let mut phone = String::with_capacity(local.len());
    for (i, ch) in local.chars().enumerate() {
        if ch.is_ascii_digit() {
            phone.push(ch);
        } else if ch == '+' && i == 0 {
            phone.push(ch);
        }
    }

    if phone.trim_start_matches('+').is_empty() {
        None
    } else {
        Some(phone)
    }
}
