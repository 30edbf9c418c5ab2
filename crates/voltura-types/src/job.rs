use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Issue summary for jobs opened by inbound chat messages.
pub const CONCIERGE_INTAKE_SUMMARY: &str = "WhatsApp concierge intake";

/// A repair job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Human-facing ticket number ("JOB-...").
    pub ticket_number: String,
    pub customer_id: Uuid,
    pub issue_summary: String,
    pub status: JobStatus,
    pub estimated_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn open(customer_id: Uuid, issue_summary: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            ticket_number: crate::numbering::document_number("JOB", now),
            customer_id,
            issue_summary: issue_summary.into(),
            status: JobStatus::Pending,
            estimated_cost: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Job lifecycle: `Pending -> InProgress -> Completed -> Delivered`.
///
/// Pending and InProgress jobs are "open"; a customer has at most one open job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Delivered,
}

impl JobStatus {
    pub fn is_open(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }

    /// The only status this one may advance to.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::InProgress),
            JobStatus::InProgress => Some(JobStatus::Completed),
            JobStatus::Completed => Some(JobStatus::Delivered),
            JobStatus::Delivered => None,
        }
    }

    pub fn can_advance_to(self, target: JobStatus) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Delivered => write!(f, "DELIVERED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "DELIVERED" => Ok(JobStatus::Delivered),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// Job listing row with the owning customer's display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOverview {
    #[serde(flatten)]
    pub job: Job,
    pub customer_name: String,
    pub customer_phone: String,
    pub quotation_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transitions_are_sequential() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_advance_to(JobStatus::Completed));
        assert!(JobStatus::Completed.can_advance_to(JobStatus::Delivered));

        assert!(!JobStatus::Pending.can_advance_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_advance_to(JobStatus::InProgress));
        assert!(!JobStatus::Delivered.can_advance_to(JobStatus::Pending));
        assert_eq!(JobStatus::Delivered.next(), None);
    }

    #[test]
    fn test_open_statuses() {
        assert!(JobStatus::Pending.is_open());
        assert!(JobStatus::InProgress.is_open());
        assert!(!JobStatus::Completed.is_open());
        assert!(!JobStatus::Delivered.is_open());
    }

    #[test]
    fn test_job_status_serde_is_screaming() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!("in_progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
    }

    #[test]
    fn test_open_job_has_ticket() {
        let job = Job::open(Uuid::now_v7(), CONCIERGE_INTAKE_SUMMARY, Utc::now());
        assert!(job.ticket_number.starts_with("JOB-"));
        assert_eq!(job.status, JobStatus::Pending);
    }
}
