//! Quotation repository trait definition.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::invoice::Invoice;
use voltura_types::quotation::{AcceptedQuotation, Quotation};
use voltura_types::task::TaskRecord;

pub trait QuotationRepository: Send + Sync + 'static {
    /// Insert a quotation, set its job's estimated cost to the quotation
    /// total, and insert the `followup` task, in one transaction.
    fn create(
        &self,
        quotation: &Quotation,
        followup: &TaskRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Quotation>, RepositoryError>> + Send;

    /// Accept a quotation in one transaction.
    ///
    /// - `SENT` becomes `ACCEPTED`; an already accepted quotation stays accepted.
    /// - A `REJECTED` quotation yields `Conflict` with nothing written.
    /// - The linked job moves `PENDING -> IN_PROGRESS` if still pending.
    /// - The invoice keyed by the quotation id is created from `draft` if absent,
    ///   otherwise updated in place (total, line items, ledger balance). Its id never changes.
    /// - `notification` is inserted only when this call moves the quotation to `ACCEPTED`.
    fn accept(
        &self,
        id: &Uuid,
        draft: &Invoice,
        notification: &TaskRecord,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<AcceptedQuotation, RepositoryError>> + Send;

    /// Reject a quotation. Rejecting twice is a no-op; rejecting an accepted
    /// quotation yields `Conflict`. The flag is true when this call moved the
    /// quotation to `REJECTED`; only then is `notification` inserted.
    fn reject(
        &self,
        id: &Uuid,
        notification: &TaskRecord,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(Quotation, bool), RepositoryError>> + Send;
}
