//! Business services: jobs, quotations, sales and inventory, reminders and CRM reads.
//!
//! Services validate before touching storage, delegate atomic writes to the
//! repositories, then enqueue follow-up tasks and publish domain events.
//! A failed enqueue or publish never rolls back committed state.

pub mod crm;
pub mod job;
pub mod quotation;
pub mod reminder;
pub mod sales;

pub use crm::CrmService;
pub use job::JobService;
pub use quotation::QuotationService;
pub use reminder::ReminderService;
pub use sales::SalesService;

use chrono::{DateTime, Utc};
use voltura_types::customer::{Customer, CustomerRef, normalize_phone};
use voltura_types::error::ServiceError;

use crate::repository::crm::{CrmRepository, CustomerPatch};

/// Find the customer a request refers to: an existing id, or an upsert by
/// phone carrying the supplied name and email.
pub async fn resolve_customer<C: CrmRepository>(
    crm: &C,
    customer: &CustomerRef,
    now: DateTime<Utc>,
) -> Result<Customer, ServiceError> {
    if let Some(id) = customer.id {
        return crm
            .get_customer(&id)
            .await?
            .ok_or(ServiceError::NotFound("customer"));
    }

    customer.validate().map_err(ServiceError::Validation)?;
    let raw_phone = customer.phone.as_deref().unwrap_or_default();
    let phone = normalize_phone(raw_phone)
        .ok_or_else(|| ServiceError::Validation(format!("invalid phone '{raw_phone}'")))?;
    let patch = CustomerPatch {
        name: customer.name.as_deref().map(str::trim),
        email: customer.email.as_deref().map(str::trim).filter(|e| !e.is_empty()),
    };
    Ok(crm.upsert_customer(&phone, patch, now).await?)
}
