//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both the CLI and
//! the REST API. Core services are generic over repository, queue and
//! transport traits; AppState pins them to the voltura-infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voltura_core::dispatch::{Dispatcher, TaskScheduler};
use voltura_core::event::EventBus;
use voltura_core::ingest::Ingestor;
use voltura_core::service::{CrmService, JobService, QuotationService, ReminderService, SalesService};
use voltura_core::session::SessionRegistry;
use voltura_core::workflow::{
    ConciergeHandler, NotificationHandler, Notifier, QuotationFollowupHandler,
};
use voltura_infra::bridge::BridgeTransport;
use voltura_infra::config::{credentials_dir, database_url};
use voltura_infra::filesystem::FileCredentialStore;
use voltura_infra::sqlite::crm::SqliteCrmRepository;
use voltura_infra::sqlite::invoice::SqliteInvoiceRepository;
use voltura_infra::sqlite::message::SqliteMessageLogRepository;
use voltura_infra::sqlite::pool::DatabasePool;
use voltura_infra::sqlite::quotation::SqliteQuotationRepository;
use voltura_infra::sqlite::reminder::SqliteReminderRepository;
use voltura_infra::sqlite::session::SqliteSessionRepository;
use voltura_infra::sqlite::task::SqliteTaskQueue;
use voltura_types::config::AppConfig;
use voltura_types::task::{CONCIERGE_QUEUE, NOTIFICATION_QUEUE, QUOTATION_QUEUE};

/// Capacity of the realtime event channel.
const EVENT_CAPACITY: usize = 1024;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteScheduler = TaskScheduler<SqliteTaskQueue>;

pub type ConcreteIngestor =
    Ingestor<SqliteCrmRepository, SqliteMessageLogRepository, SqliteTaskQueue>;

pub type ConcreteRegistry = SessionRegistry<
    BridgeTransport,
    SqliteSessionRepository,
    FileCredentialStore,
    ConcreteIngestor,
>;

pub type ConcreteNotifier = Notifier<ConcreteRegistry, SqliteMessageLogRepository>;

pub type ConcreteQuotationService =
    QuotationService<SqliteQuotationRepository, SqliteCrmRepository, SqliteTaskQueue>;

pub type ConcreteSalesService =
    SalesService<SqliteInvoiceRepository, SqliteCrmRepository, SqliteTaskQueue>;

pub type ConcreteReminderService =
    ReminderService<SqliteReminderRepository, SqliteCrmRepository, SqliteTaskQueue>;

/// Shared application state.
///
/// Cheap to clone: every member is a handle (`Arc`, pool, channel sender).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: DatabasePool,
    pub events: EventBus,
    pub scheduler: ConcreteScheduler,
    pub registry: ConcreteRegistry,
    pub ingestor: ConcreteIngestor,
    pub crm_service: Arc<CrmService<SqliteCrmRepository>>,
    pub job_service: Arc<JobService<SqliteCrmRepository>>,
    pub quotation_service: Arc<ConcreteQuotationService>,
    pub sales_service: Arc<ConcreteSalesService>,
    pub reminder_service: Arc<ConcreteReminderService>,
    repos: Repositories,
}

/// Repository handles the workflow handlers need directly.
#[derive(Clone)]
struct Repositories {
    crm: Arc<SqliteCrmRepository>,
    messages: Arc<SqliteMessageLogRepository>,
    quotations: Arc<SqliteQuotationRepository>,
    invoices: Arc<SqliteInvoiceRepository>,
    reminders: Arc<SqliteReminderRepository>,
}

impl AppState {
    /// Initialize the application state: connect to the database, wire services.
    pub async fn init(config: AppConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let url = database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&url).await?;
        info!(data_dir = %data_dir.display(), "database ready");

        let credentials = FileCredentialStore::new(credentials_dir(&config, &data_dir));
        let transport = BridgeTransport::new(&config.bridge)?;

        Ok(Self::build(config, db_pool, transport, credentials))
    }

    fn build(
        config: AppConfig,
        db_pool: DatabasePool,
        transport: BridgeTransport,
        credentials: FileCredentialStore,
    ) -> Self {
        let events = EventBus::new(EVENT_CAPACITY);
        let repos = Repositories {
            crm: Arc::new(SqliteCrmRepository::new(db_pool.clone())),
            messages: Arc::new(SqliteMessageLogRepository::new(db_pool.clone())),
            quotations: Arc::new(SqliteQuotationRepository::new(db_pool.clone())),
            invoices: Arc::new(SqliteInvoiceRepository::new(db_pool.clone())),
            reminders: Arc::new(SqliteReminderRepository::new(db_pool.clone())),
        };

        let scheduler = TaskScheduler::new(
            SqliteTaskQueue::new(db_pool.clone()),
            &config.dispatcher.queues,
        );
        let ingestor = Ingestor::new(
            repos.crm.clone(),
            repos.messages.clone(),
            scheduler.clone(),
            events.clone(),
        );
        let registry = SessionRegistry::new(
            transport,
            SqliteSessionRepository::new(db_pool.clone()),
            credentials,
            ingestor.clone(),
            events.clone(),
            config.session.connect_timeout(),
        );

        Self {
            crm_service: Arc::new(CrmService::new(repos.crm.clone())),
            job_service: Arc::new(JobService::new(repos.crm.clone(), events.clone())),
            quotation_service: Arc::new(QuotationService::new(
                repos.quotations.clone(),
                repos.crm.clone(),
                scheduler.clone(),
                events.clone(),
            )),
            sales_service: Arc::new(SalesService::new(
                repos.invoices.clone(),
                repos.crm.clone(),
                scheduler.clone(),
                events.clone(),
            )),
            reminder_service: Arc::new(ReminderService::new(
                repos.reminders.clone(),
                repos.crm.clone(),
                scheduler.clone(),
            )),
            config: Arc::new(config),
            db_pool,
            events,
            scheduler,
            registry,
            ingestor,
            repos,
        }
    }

    /// Start the workflow dispatcher with every queue's handler registered.
    ///
    /// Outbound messages go through this process's session registry.
    pub fn start_workers(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let notifier: ConcreteNotifier = Notifier::new(
            Arc::new(self.registry.clone()),
            self.repos.messages.clone(),
            self.config.default_session_id.clone(),
        );

        let mut dispatcher = Dispatcher::new(self.scheduler.clone(), &self.config.dispatcher)
            .with_events(self.events.clone());
        dispatcher.register(
            CONCIERGE_QUEUE,
            ConciergeHandler::new(self.repos.crm.clone(), notifier.clone()),
        );
        dispatcher.register(
            QUOTATION_QUEUE,
            QuotationFollowupHandler::new(
                self.repos.crm.clone(),
                self.repos.quotations.clone(),
                notifier.clone(),
            ),
        );
        dispatcher.register(
            NOTIFICATION_QUEUE,
            NotificationHandler::new(
                self.repos.crm.clone(),
                self.repos.quotations.clone(),
                self.repos.invoices.clone(),
                self.repos.reminders.clone(),
                notifier,
            ),
        );

        info!(queues = ?dispatcher.queues(), "starting workflow dispatcher");
        dispatcher.start(cancel)
    }

    /// Stop workers, close live sessions and the pool.
    pub async fn shutdown(&self, cancel: &CancellationToken, workers: Option<JoinHandle<()>>) {
        cancel.cancel();
        if let Some(workers) = workers {
            if let Err(e) = workers.await {
                warn!(error = %e, "dispatcher task ended abnormally");
            }
        }
        self.registry.shutdown().await;
        self.db_pool.close().await;
        info!("shutdown complete");
    }

    /// State over a throwaway database, for handler tests.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        std::mem::forget(dir);

        let config = AppConfig::default();
        let url = format!("sqlite://{}?mode=rwc", data_dir.join("test.db").display());
        let db_pool = DatabasePool::new(&url).await.unwrap();
        let credentials = FileCredentialStore::new(data_dir.join("sessions"));
        let transport = BridgeTransport::new(&config.bridge).unwrap();
        Self::build(config, db_pool, transport, credentials)
    }
}
