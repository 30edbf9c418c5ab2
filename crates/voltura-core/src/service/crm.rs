//! Read models for the back office: customers, jobs and the dashboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::customer::{CustomerDetail, CustomerSummary};
use voltura_types::dashboard::DashboardSummary;
use voltura_types::error::ServiceError;
use voltura_types::job::JobOverview;

use crate::repository::crm::CrmRepository;

pub struct CrmService<C: CrmRepository> {
    crm: Arc<C>,
}

impl<C: CrmRepository> CrmService<C> {
    pub fn new(crm: Arc<C>) -> Self {
        Self { crm }
    }

    pub async fn list_customers(&self) -> Result<Vec<CustomerSummary>, ServiceError> {
        Ok(self.crm.list_customers().await?)
    }

    pub async fn customer_detail(&self, id: &Uuid) -> Result<CustomerDetail, ServiceError> {
        self.crm
            .customer_detail(id)
            .await?
            .ok_or(ServiceError::NotFound("customer"))
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobOverview>, ServiceError> {
        Ok(self.crm.list_jobs().await?)
    }

    /// Figures for the UTC day containing `now`.
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<DashboardSummary, ServiceError> {
        Ok(self.crm.dashboard(start_of_day(now)).await?)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let start = start_of_day(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap());
    }
}
