//! CRM repository trait definition: customers and their jobs.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::customer::{Customer, CustomerDetail, CustomerSummary};
use voltura_types::dashboard::DashboardSummary;
use voltura_types::error::RepositoryError;
use voltura_types::job::{Job, JobOverview, JobStatus};

/// Customer details supplied on upsert. `None` fields leave stored values untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomerPatch<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
}

/// Repository trait for customers and jobs.
///
/// Implementations must guarantee at most one open (PENDING / IN_PROGRESS)
/// job per customer, even under concurrent `find_or_create_open_job` calls.
pub trait CrmRepository: Send + Sync + 'static {
    // -----------------------------------------------------------------------
    // Customers
    // -----------------------------------------------------------------------

    /// Create the customer for `phone` if absent (name defaults to the phone),
    /// otherwise touch `updated_at` and apply `patch`.
    fn upsert_customer(
        &self,
        phone: &str,
        patch: CustomerPatch<'_>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Customer, RepositoryError>> + Send;

    fn get_customer(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Customer>, RepositoryError>> + Send;

    /// Customers with job and invoice counts, newest first.
    fn list_customers(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<CustomerSummary>, RepositoryError>> + Send;

    fn customer_detail(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CustomerDetail>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Return the customer's open job, creating a PENDING one if none exists.
    /// The boolean is `true` when a job was created.
    fn find_or_create_open_job(
        &self,
        customer_id: &Uuid,
        issue_summary: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(Job, bool), RepositoryError>> + Send;

    fn find_open_job(
        &self,
        customer_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    fn get_job(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// Compare-and-set the job status. Returns `false` if the job was not in `from`.
    fn transition_job(
        &self,
        id: &Uuid,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All jobs, newest first, with customer display fields.
    fn list_jobs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<JobOverview>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------------

    /// Summary figures for everything at or after `since`.
    fn dashboard(
        &self,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<DashboardSummary, RepositoryError>> + Send;
}
