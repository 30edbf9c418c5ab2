//! SQLite CRM repository: customers, jobs and dashboard figures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;
use voltura_core::repository::crm::{CrmRepository, CustomerPatch};
use voltura_types::customer::{Customer, CustomerDetail, CustomerSummary};
use voltura_types::dashboard::{DashboardSummary, JobCounts, RecentMessage};
use voltura_types::error::RepositoryError;
use voltura_types::job::{Job, JobOverview, JobStatus};

use super::invoice::invoice_from_row;
use super::pool::DatabasePool;
use super::quotation::quotation_from_row;
use super::row::{
    conflict_or_query, format_datetime, parse_datetime, parse_decimal, parse_enum, parse_uuid,
    query_err,
};

const RECENT_MESSAGES: i64 = 10;

/// SQLite-backed implementation of `CrmRepository`.
///
/// The one-open-job-per-customer rule is enforced twice: the writer
/// transaction looks for an open job before inserting, and a partial unique
/// index rejects a second open job should anything slip past.
pub struct SqliteCrmRepository {
    pool: DatabasePool,
}

impl SqliteCrmRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn customer_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(Customer {
        id: parse_uuid(&id)?,
        phone: row.try_get("phone").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        email: row.try_get("email").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

pub(crate) fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Job, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let customer_id: String = row.try_get("customer_id").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let estimated_cost: Option<String> = row.try_get("estimated_cost").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(Job {
        id: parse_uuid(&id)?,
        ticket_number: row.try_get("ticket_number").map_err(query_err)?,
        customer_id: parse_uuid(&customer_id)?,
        issue_summary: row.try_get("issue_summary").map_err(query_err)?,
        status: parse_enum::<JobStatus>(&status)?,
        estimated_cost: estimated_cost.as_deref().map(parse_decimal).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

const OPEN_JOB_SQL: &str =
    "SELECT * FROM jobs WHERE customer_id = ? AND status IN ('PENDING', 'IN_PROGRESS') LIMIT 1";

impl CrmRepository for SqliteCrmRepository {
    // -----------------------------------------------------------------------
    // Customers
    // -----------------------------------------------------------------------

    async fn upsert_customer(
        &self,
        phone: &str,
        patch: CustomerPatch<'_>,
        now: DateTime<Utc>,
    ) -> Result<Customer, RepositoryError> {
        let fresh = Customer::from_phone(phone, now);
        let name = patch.name.filter(|n| !n.is_empty());

        let row = sqlx::query(
            "INSERT INTO customers (id, phone, name, email, created_at, updated_at)
             VALUES (?1, ?2, COALESCE(?3, ?2), ?4, ?5, ?5)
             ON CONFLICT(phone) DO UPDATE SET
                name = COALESCE(?3, customers.name),
                email = COALESCE(?4, customers.email),
                updated_at = ?5
             RETURNING *",
        )
        .bind(fresh.id.to_string())
        .bind(phone)
        .bind(name)
        .bind(patch.email)
        .bind(format_datetime(&now))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_err)?;

        customer_from_row(&row)
    }

    async fn get_customer(&self, id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn list_customers(&self) -> Result<Vec<CustomerSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT c.*,
                (SELECT COUNT(*) FROM jobs j WHERE j.customer_id = c.id) AS job_count,
                (SELECT COUNT(*) FROM invoices i WHERE i.customer_id = c.id) AS invoice_count
             FROM customers c
             ORDER BY c.created_at DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                let customer = customer_from_row(row)?;
                Ok(CustomerSummary {
                    id: customer.id,
                    name: customer.name,
                    phone: customer.phone,
                    email: customer.email,
                    jobs: row.try_get("job_count").map_err(query_err)?,
                    invoices: row.try_get("invoice_count").map_err(query_err)?,
                    created_at: customer.created_at,
                })
            })
            .collect()
    }

    async fn customer_detail(&self, id: &Uuid) -> Result<Option<CustomerDetail>, RepositoryError> {
        let Some(customer) = self.get_customer(id).await? else {
            return Ok(None);
        };
        let id = id.to_string();

        let jobs = sqlx::query("SELECT * FROM jobs WHERE customer_id = ? ORDER BY created_at DESC")
            .bind(&id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?
            .iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let quotations =
            sqlx::query("SELECT * FROM quotations WHERE customer_id = ? ORDER BY created_at DESC")
                .bind(&id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_err)?
                .iter()
                .map(quotation_from_row)
                .collect::<Result<Vec<_>, _>>()?;

        let invoices =
            sqlx::query("SELECT * FROM invoices WHERE customer_id = ? ORDER BY created_at DESC")
                .bind(&id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_err)?
                .iter()
                .map(invoice_from_row)
                .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CustomerDetail {
            customer,
            jobs,
            quotations,
            invoices,
        }))
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    async fn find_or_create_open_job(
        &self,
        customer_id: &Uuid,
        issue_summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(Job, bool), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let existing = sqlx::query(OPEN_JOB_SQL)
            .bind(customer_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;
        if let Some(row) = existing {
            let job = job_from_row(&row)?;
            tx.commit().await.map_err(query_err)?;
            return Ok((job, false));
        }

        let job = Job::open(*customer_id, issue_summary, now);
        sqlx::query(
            "INSERT INTO jobs (id, ticket_number, customer_id, issue_summary, status, estimated_cost, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.ticket_number)
        .bind(job.customer_id.to_string())
        .bind(&job.issue_summary)
        .bind(job.status.to_string())
        .bind(format_datetime(&job.created_at))
        .bind(format_datetime(&job.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_or_query(e, || format!("customer {customer_id} already has an open job"))
        })?;

        tx.commit().await.map_err(query_err)?;
        Ok((job, true))
    }

    async fn find_open_job(&self, customer_id: &Uuid) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(OPEN_JOB_SQL)
            .bind(customer_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_job(&self, id: &Uuid) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn transition_job(
        &self,
        id: &Uuid,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.to_string())
                .bind(format_datetime(&now))
                .bind(id.to_string())
                .bind(from.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(|e| conflict_or_query(e, || format!("customer of job {id} already has an open job")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_jobs(&self) -> Result<Vec<JobOverview>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT j.*,
                c.name AS customer_name,
                c.phone AS customer_phone,
                (SELECT q.id FROM quotations q WHERE q.job_id = j.id ORDER BY q.created_at DESC LIMIT 1) AS latest_quotation_id,
                (SELECT i.id FROM invoices i WHERE i.job_id = j.id ORDER BY i.created_at DESC LIMIT 1) AS latest_invoice_id
             FROM jobs j
             JOIN customers c ON c.id = j.customer_id
             ORDER BY j.created_at DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                let quotation_id: Option<String> =
                    row.try_get("latest_quotation_id").map_err(query_err)?;
                let invoice_id: Option<String> =
                    row.try_get("latest_invoice_id").map_err(query_err)?;
                Ok(JobOverview {
                    job: job_from_row(row)?,
                    customer_name: row.try_get("customer_name").map_err(query_err)?,
                    customer_phone: row.try_get("customer_phone").map_err(query_err)?,
                    quotation_id: quotation_id.as_deref().map(parse_uuid).transpose()?,
                    invoice_id: invoice_id.as_deref().map(parse_uuid).transpose()?,
                })
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------------

    async fn dashboard(&self, since: DateTime<Utc>) -> Result<DashboardSummary, RepositoryError> {
        let since = format_datetime(&since);

        // Decimal text can't be summed exactly in SQL
        let amounts: Vec<(String,)> =
            sqlx::query_as("SELECT amount FROM payments WHERE received_at >= ?")
                .bind(&since)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_err)?;
        let mut revenue = Decimal::ZERO;
        for (amount,) in &amounts {
            revenue += parse_decimal(amount)?;
        }

        let status_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_err)?;
        let mut jobs = JobCounts::default();
        for (status, count) in status_counts {
            match parse_enum::<JobStatus>(&status)? {
                JobStatus::Pending => jobs.pending = count,
                JobStatus::InProgress => jobs.in_progress = count,
                JobStatus::Completed => jobs.completed = count,
                JobStatus::Delivered => {}
            }
        }

        let (new_customers_today,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM customers WHERE created_at >= ?")
                .bind(&since)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_err)?;

        let rows = sqlx::query(
            "SELECT m.id, m.customer_id, m.direction, m.content, m.created_at,
                c.name AS customer_name, c.phone AS customer_phone
             FROM message_logs m
             JOIN customers c ON c.id = m.customer_id
             ORDER BY m.created_at DESC
             LIMIT ?",
        )
        .bind(RECENT_MESSAGES)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let recent_messages = rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(query_err)?;
                let customer_id: String = row.try_get("customer_id").map_err(query_err)?;
                let direction: String = row.try_get("direction").map_err(query_err)?;
                let created_at: String = row.try_get("created_at").map_err(query_err)?;
                Ok(RecentMessage {
                    id: parse_uuid(&id)?,
                    customer_id: parse_uuid(&customer_id)?,
                    customer_name: row.try_get("customer_name").map_err(query_err)?,
                    customer_phone: row.try_get("customer_phone").map_err(query_err)?,
                    direction: parse_enum(&direction)?,
                    content: row.try_get("content").map_err(query_err)?,
                    created_at: parse_datetime(&created_at)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(DashboardSummary {
            revenue: revenue.round_dp(2),
            jobs,
            new_customers_today,
            recent_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_customer_creates_then_touches() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let t0 = Utc::now();

        let created = repo
            .upsert_customer("60123456789", CustomerPatch::default(), t0)
            .await
            .unwrap();
        assert_eq!(created.name, "60123456789");

        let t1 = t0 + chrono::Duration::seconds(5);
        let touched = repo
            .upsert_customer("60123456789", CustomerPatch::default(), t1)
            .await
            .unwrap();
        assert_eq!(touched.id, created.id);
        assert_eq!(touched.name, "60123456789");
        assert_eq!(touched.created_at, created.created_at);
        assert_eq!(touched.updated_at, t1);
    }

    #[tokio::test]
    async fn test_upsert_customer_applies_patch() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let now = Utc::now();
        repo.upsert_customer("60123456789", CustomerPatch::default(), now)
            .await
            .unwrap();

        let patched = repo
            .upsert_customer(
                "60123456789",
                CustomerPatch {
                    name: Some("Aina"),
                    email: Some("aina@example.com"),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(patched.name, "Aina");
        assert_eq!(patched.email.as_deref(), Some("aina@example.com"));

        // A bare touch keeps the stored name
        let touched = repo
            .upsert_customer("60123456789", CustomerPatch::default(), now)
            .await
            .unwrap();
        assert_eq!(touched.name, "Aina");
    }

    #[tokio::test]
    async fn test_find_or_create_open_job_reuses_open_job() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let now = Utc::now();
        let customer = repo
            .upsert_customer("60111111111", CustomerPatch::default(), now)
            .await
            .unwrap();

        let (first, created) = repo
            .find_or_create_open_job(&customer.id, "intake", now)
            .await
            .unwrap();
        assert!(created);
        let (second, created) = repo
            .find_or_create_open_job(&customer.id, "intake", now)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.find_open_job(&customer.id).await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_yields_one_job() {
        let repo = Arc::new(SqliteCrmRepository::new(test_pool().await));
        let now = Utc::now();
        let customer = repo
            .upsert_customer("60222222222", CustomerPatch::default(), now)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let customer_id = customer.id;
            handles.push(tokio::spawn(async move {
                repo.find_or_create_open_job(&customer_id, "intake", Utc::now())
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().0.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(repo.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_job_allows_new_open_job() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let now = Utc::now();
        let customer = repo
            .upsert_customer("60333333333", CustomerPatch::default(), now)
            .await
            .unwrap();
        let (job, _) = repo
            .find_or_create_open_job(&customer.id, "intake", now)
            .await
            .unwrap();

        for (from, to) in [
            (JobStatus::Pending, JobStatus::InProgress),
            (JobStatus::InProgress, JobStatus::Completed),
        ] {
            assert!(repo.transition_job(&job.id, from, to, now).await.unwrap());
        }
        // Stale compare-and-set fails
        assert!(
            !repo
                .transition_job(&job.id, JobStatus::Pending, JobStatus::InProgress, now)
                .await
                .unwrap()
        );

        assert!(repo.find_open_job(&customer.id).await.unwrap().is_none());
        let (next, created) = repo
            .find_or_create_open_job(&customer.id, "second visit", now)
            .await
            .unwrap();
        assert!(created);
        assert_ne!(next.id, job.id);
    }

    #[tokio::test]
    async fn test_list_customers_counts_jobs() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let now = Utc::now();
        let a = repo
            .upsert_customer("60555555555", CustomerPatch::default(), now)
            .await
            .unwrap();
        repo.upsert_customer(
            "60666666666",
            CustomerPatch::default(),
            now + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();
        repo.find_or_create_open_job(&a.id, "intake", now).await.unwrap();

        let customers = repo.list_customers().await.unwrap();
        assert_eq!(customers.len(), 2);
        // Newest first
        assert_eq!(customers[0].phone, "60666666666");
        assert_eq!(customers[1].jobs, 1);
        assert_eq!(customers[1].invoices, 0);

        let detail = repo.customer_detail(&a.id).await.unwrap().unwrap();
        assert_eq!(detail.jobs.len(), 1);
        assert!(repo.customer_detail(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let repo = SqliteCrmRepository::new(test_pool().await);
        let now = Utc::now();
        let customer = repo
            .upsert_customer("60777777777", CustomerPatch::default(), now)
            .await
            .unwrap();
        repo.find_or_create_open_job(&customer.id, "intake", now)
            .await
            .unwrap();

        let summary = repo
            .dashboard(now - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.jobs.pending, 1);
        assert_eq!(summary.jobs.in_progress, 0);
        assert_eq!(summary.new_customers_today, 1);
        assert_eq!(summary.revenue, Decimal::ZERO);
        assert!(summary.recent_messages.is_empty());
    }
}
