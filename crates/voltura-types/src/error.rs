use thiserror::Error;

/// Errors from repository operations (used by trait definitions in voltura-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by business services (jobs, quotations, invoices, inventory).
///
/// `Validation` is always returned before any state is mutated.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("queue error: {0}")]
    Queue(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound("entity"),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

/// Connection-level errors reported by a chat transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Outcome of a session registry operation.
///
/// `Clone` so that every waiter on a single-flight connection attempt
/// receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session '{session_id}' did not pair or open within {secs}s")]
    Timeout { session_id: String, secs: u64 },

    #[error("session '{session_id}' closed during connect: {reason}")]
    ClosedDuringConnect { session_id: String, reason: String },

    #[error("session '{0}' was terminated")]
    Terminated(String),

    #[error("credential store error: {0}")]
    Credentials(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from a credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential io error: {0}")]
    Io(String),

    #[error("credential format error: {0}")]
    Format(String),
}

/// Error returned by a workflow task handler.
///
/// `Transient` errors are retried under the queue's policy; `Permanent`
/// errors fail the task immediately.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl TaskError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, TaskError::Permanent(_))
    }
}

impl From<RepositoryError> for TaskError {
    fn from(err: RepositoryError) -> Self {
        TaskError::Transient(err.to_string())
    }
}

impl From<SessionError> for TaskError {
    fn from(err: SessionError) -> Self {
        TaskError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_service_error_from_repository() {
        let err: ServiceError = RepositoryError::NotFound.into();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err: ServiceError = RepositoryError::Conflict("sku 'A1' exists".into()).into();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m.contains("A1")));

        let err: ServiceError = RepositoryError::Connection.into();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::Timeout {
            session_id: "primary".to_string(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "session 'primary' did not pair or open within 30s");
    }

    #[test]
    fn test_task_error_classification() {
        assert!(TaskError::Permanent("unknown tag".into()).is_permanent());
        assert!(!TaskError::Transient("socket closed".into()).is_permanent());

        let from_repo: TaskError = RepositoryError::Connection.into();
        assert!(!from_repo.is_permanent());
    }
}
