//! End-to-end tests for the business flows over SQLite.
//!
//! Each test builds an isolated harness: a temp database, every SQLite
//! repository, the durable task queue, a running dispatcher with the real
//! handlers, and a recording messenger in place of the session registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use voltura_core::dispatch::{Dispatcher, TaskScheduler};
use voltura_core::event::EventBus;
use voltura_core::ingest::Ingestor;
use voltura_core::repository::crm::CrmRepository;
use voltura_core::repository::invoice::InvoiceRepository;
use voltura_core::repository::message::MessageLogRepository;
use voltura_core::service::{QuotationService, ReminderService, SalesService};
use voltura_core::session::OutboundMessenger;
use voltura_core::workflow::{
    ConciergeHandler, NotificationHandler, Notifier, QuotationFollowupHandler,
};
use voltura_infra::sqlite::crm::SqliteCrmRepository;
use voltura_infra::sqlite::invoice::SqliteInvoiceRepository;
use voltura_infra::sqlite::message::SqliteMessageLogRepository;
use voltura_infra::sqlite::pool::DatabasePool;
use voltura_infra::sqlite::quotation::SqliteQuotationRepository;
use voltura_infra::sqlite::reminder::SqliteReminderRepository;
use voltura_infra::sqlite::task::SqliteTaskQueue;
use voltura_types::config::DispatcherConfig;
use voltura_types::customer::CustomerRef;
use voltura_types::error::{ServiceError, SessionError};
use voltura_types::inventory::NewInventoryItem;
use voltura_types::invoice::{NewPayment, NewSale};
use voltura_types::message::InboundMessage;
use voltura_types::quotation::{LineItem, NewQuotation};
use voltura_types::reminder::Cadence;
use voltura_types::task::{NOTIFICATION_QUEUE, NotificationTask, TaskFailure};

const PHONE: &str = "60123456789";

// ---- Harness ----

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMessenger {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl OutboundMessenger for RecordingMessenger {
    async fn send_text(&self, session_id: &str, phone: &str, text: &str) -> Result<(), SessionError> {
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), phone.to_string(), text.to_string()));
        Ok(())
    }
}

struct Harness {
    pool: DatabasePool,
    crm: Arc<SqliteCrmRepository>,
    messages: Arc<SqliteMessageLogRepository>,
    invoices: Arc<SqliteInvoiceRepository>,
    scheduler: TaskScheduler<SqliteTaskQueue>,
    ingestor: Ingestor<SqliteCrmRepository, SqliteMessageLogRepository, SqliteTaskQueue>,
    quotations: QuotationService<SqliteQuotationRepository, SqliteCrmRepository, SqliteTaskQueue>,
    sales: SalesService<SqliteInvoiceRepository, SqliteCrmRepository, SqliteTaskQueue>,
    reminders: ReminderService<SqliteReminderRepository, SqliteCrmRepository, SqliteTaskQueue>,
    messenger: Arc<RecordingMessenger>,
    failures: broadcast::Receiver<TaskFailure>,
    cancel: CancellationToken,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        std::mem::forget(dir);
        let pool = DatabasePool::new(&url).await.unwrap();

        let crm = Arc::new(SqliteCrmRepository::new(pool.clone()));
        let messages = Arc::new(SqliteMessageLogRepository::new(pool.clone()));
        let quotation_repo = Arc::new(SqliteQuotationRepository::new(pool.clone()));
        let invoices = Arc::new(SqliteInvoiceRepository::new(pool.clone()));
        let reminder_repo = Arc::new(SqliteReminderRepository::new(pool.clone()));
        let events = EventBus::new(64);

        let config = DispatcherConfig {
            poll_interval_ms: 20,
            lease_secs: 30,
            ..DispatcherConfig::default()
        };
        let scheduler = TaskScheduler::new(SqliteTaskQueue::new(pool.clone()), &config.queues);

        let messenger = Arc::new(RecordingMessenger::default());
        let notifier = Notifier::new(messenger.clone(), messages.clone(), "primary");

        let mut dispatcher = Dispatcher::new(scheduler.clone(), &config).with_events(events.clone());
        dispatcher.register(
            voltura_types::task::CONCIERGE_QUEUE,
            ConciergeHandler::new(crm.clone(), notifier.clone()),
        );
        dispatcher.register(
            voltura_types::task::QUOTATION_QUEUE,
            QuotationFollowupHandler::new(crm.clone(), quotation_repo.clone(), notifier.clone()),
        );
        dispatcher.register(
            NOTIFICATION_QUEUE,
            NotificationHandler::new(
                crm.clone(),
                quotation_repo.clone(),
                invoices.clone(),
                reminder_repo.clone(),
                notifier,
            ),
        );
        let failures = dispatcher.failures();
        let cancel = CancellationToken::new();
        dispatcher.start(cancel.clone());

        Self {
            ingestor: Ingestor::new(crm.clone(), messages.clone(), scheduler.clone(), events.clone()),
            quotations: QuotationService::new(
                quotation_repo,
                crm.clone(),
                scheduler.clone(),
                events.clone(),
            ),
            sales: SalesService::new(invoices.clone(), crm.clone(), scheduler.clone(), events),
            reminders: ReminderService::new(reminder_repo, crm.clone(), scheduler.clone()),
            pool,
            crm,
            messages,
            invoices,
            scheduler,
            messenger,
            failures,
            cancel,
        }
    }

    /// Wait until the messenger has recorded at least `n` sends.
    async fn wait_for_sends(&self, n: usize) -> Vec<(String, String, String)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = self.messenger.sent();
                if sent.len() >= n {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} sends, got {:?}", self.messenger.sent()))
    }

    /// Let the dispatcher drain anything still pending.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    async fn count(&self, sql: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool.reader).await.unwrap();
        count
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        remote_jid: format!("{PHONE}@s.whatsapp.net"),
        from_me: false,
        text: Some(text.to_string()),
        media_url: None,
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn new_customer() -> CustomerRef {
    CustomerRef {
        name: Some("Aina".into()),
        phone: Some(PHONE.into()),
        ..Default::default()
    }
}

// ---- Intake ----

#[tokio::test]
async fn test_two_inbound_messages_share_customer_and_job() {
    let h = Harness::new().await;

    let first = h.ingestor.ingest("primary", &inbound("Screen cracked")).await.unwrap();
    let second = h.ingestor.ingest("primary", &inbound("Any update?")).await.unwrap();

    assert_eq!(first.customer_id, second.customer_id);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(h.count("SELECT COUNT(*) FROM customers").await, 1);
    assert_eq!(h.count("SELECT COUNT(*) FROM jobs").await, 1);

    // Each inbound message is acknowledged once, through the session it arrived on
    let sent = h.wait_for_sends(2).await;
    assert!(sent.iter().all(|(session, phone, _)| session == "primary" && phone == PHONE));
    h.settle().await;
    assert_eq!(h.messenger.sent().len(), 2);

    for id in [first.message_id, second.message_id] {
        let log = h.messages.get(&id).await.unwrap().unwrap();
        assert!(log.processed);
    }
}

#[tokio::test]
async fn test_outbound_echo_does_not_open_job() {
    let h = Harness::new().await;

    let mut echo = inbound("On my way");
    echo.from_me = true;
    let outcome = h.ingestor.ingest("primary", &echo).await.unwrap();

    assert!(outcome.job_id.is_none());
    assert_eq!(h.count("SELECT COUNT(*) FROM jobs").await, 0);
    h.settle().await;
    assert!(h.messenger.sent().is_empty());
}

// ---- Quotations ----

#[tokio::test]
async fn test_accepting_twice_yields_one_invoice_and_one_notice() {
    let h = Harness::new().await;

    let quotation = h
        .quotations
        .create(
            NewQuotation {
                customer: new_customer(),
                job_id: None,
                line_items: vec![LineItem::new("Screen replacement", 1, dec("250.00"))],
                notes: Some("Cracked screen".into()),
                valid_until: None,
            },
            None,
        )
        .await
        .unwrap();

    let first = h.quotations.accept(&quotation.id, None).await.unwrap();
    let second = h.quotations.accept(&quotation.id, None).await.unwrap();
    assert!(first.newly_accepted);
    assert!(!second.newly_accepted);
    assert_eq!(first.invoice.id, second.invoice.id);
    assert_eq!(h.count("SELECT COUNT(*) FROM invoices").await, 1);

    // Summary plus a single acceptance notice
    h.wait_for_sends(2).await;
    h.settle().await;
    let sent = h.messenger.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, _, text)| text.contains(&quotation.number)));

    let job = h.crm.get_job(&quotation.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.estimated_cost, Some(dec("250.00")));
}

#[tokio::test]
async fn test_rejected_quotation_cannot_be_accepted() {
    let h = Harness::new().await;

    let quotation = h
        .quotations
        .create(
            NewQuotation {
                customer: new_customer(),
                job_id: None,
                line_items: vec![LineItem::new("Battery", 1, dec("89.90"))],
                notes: None,
                valid_until: None,
            },
            None,
        )
        .await
        .unwrap();

    h.quotations.reject(&quotation.id, None).await.unwrap();
    let err = h.quotations.accept(&quotation.id, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(h.count("SELECT COUNT(*) FROM invoices").await, 0);
}

#[tokio::test]
async fn test_quotation_writes_estimate_and_followup_together() {
    let h = Harness::new().await;

    let quotation = h
        .quotations
        .create(
            NewQuotation {
                customer: new_customer(),
                job_id: None,
                line_items: vec![LineItem::new("Charging port", 1, dec("120.00"))],
                notes: None,
                valid_until: None,
            },
            None,
        )
        .await
        .unwrap();

    let job = h.crm.get_job(&quotation.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.estimated_cost, Some(dec("120.00")));
    assert_eq!(
        h.count("SELECT COUNT(*) FROM tasks WHERE payload LIKE '%quotation-sent%'").await,
        1
    );

    h.quotations.reject(&quotation.id, None).await.unwrap();
    h.quotations.reject(&quotation.id, None).await.unwrap();
    assert_eq!(
        h.count("SELECT COUNT(*) FROM tasks WHERE payload LIKE '%quotation-rejected%'").await,
        1
    );
}

// ---- Ledger ----

#[tokio::test]
async fn test_payments_settle_invoice_balance() {
    let h = Harness::new().await;

    let quotation = h
        .quotations
        .create(
            NewQuotation {
                customer: new_customer(),
                job_id: None,
                line_items: vec![LineItem::new("Repair", 1, dec("100.00"))],
                notes: None,
                valid_until: None,
            },
            None,
        )
        .await
        .unwrap();
    let invoice = h.quotations.accept(&quotation.id, None).await.unwrap().invoice;

    let after = h
        .sales
        .record_payment(
            &invoice.id,
            NewPayment {
                amount: dec("30.00"),
                method: "cash".into(),
                reference: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(after.invoice.balance, dec("70.00"));

    let after = h
        .sales
        .record_payment(
            &invoice.id,
            NewPayment {
                amount: dec("70.00"),
                method: "duitnow".into(),
                reference: Some("DN-1".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(after.invoice.balance, Decimal::ZERO);
    assert_eq!(after.payments.len(), 2);

    // Re-accepting keeps the ledger
    let refreshed = h.quotations.accept(&quotation.id, None).await.unwrap().invoice;
    assert_eq!(refreshed.balance, Decimal::ZERO);
    assert_eq!(h.invoices.payments(&invoice.id).await.unwrap().len(), 2);
}

// ---- Point of sale ----

#[tokio::test]
async fn test_sale_over_stock_is_rejected_without_side_effects() {
    let h = Harness::new().await;

    let item = h
        .sales
        .create_item(NewInventoryItem {
            sku: "GLS-IP12".into(),
            name: "Tempered glass".into(),
            description: None,
            quantity: 1,
            reorder_level: 0,
            cost_price: None,
            sell_price: Some(dec("20.00")),
        })
        .await
        .unwrap();

    let mut line = LineItem::new("Tempered glass", 2, dec("20.00"));
    line.item_id = Some(item.id);
    let err = h
        .sales
        .record_sale(
            NewSale {
                customer_id: None,
                customer: Some(new_customer()),
                job_id: None,
                items: vec![line.clone()],
                payments: vec![],
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("GLS-IP12")));
    assert_eq!(h.count("SELECT COUNT(*) FROM invoices").await, 0);
    assert_eq!(h.invoices.get_item(&item.id).await.unwrap().unwrap().quantity, 1);

    // Within stock: decremented, paid, receipt sent
    line.quantity = 1;
    let sale = h
        .sales
        .record_sale(
            NewSale {
                customer_id: None,
                customer: Some(new_customer()),
                job_id: None,
                items: vec![line],
                payments: vec![NewPayment {
                    amount: dec("20.00"),
                    method: "cash".into(),
                    reference: None,
                }],
            },
            None,
        )
        .await
        .unwrap();
    assert!(sale.invoice.number.starts_with("POS-"));
    assert_eq!(sale.invoice.balance, Decimal::ZERO);
    assert_eq!(h.invoices.get_item(&item.id).await.unwrap().unwrap().quantity, 0);

    let sent = h.wait_for_sends(1).await;
    assert!(sent[0].2.contains(&sale.invoice.number));
}

// ---- Reminders ----

#[tokio::test]
async fn test_redelivered_reminder_is_sent_once() {
    let h = Harness::new().await;

    let customer = h
        .crm
        .upsert_customer(PHONE, Default::default(), Utc::now())
        .await
        .unwrap();
    let (job, _) = h
        .crm
        .find_or_create_open_job(&customer.id, "Battery swap", Utc::now())
        .await
        .unwrap();

    // Scheduled a day ago, so it is due now
    let scheduled_at = Utc::now() - chrono::Duration::days(1) - chrono::Duration::seconds(1);
    let reminder = h
        .reminders
        .schedule_at(&job.id, Cadence::Day1, None, scheduled_at)
        .await
        .unwrap();

    let sent = h.wait_for_sends(1).await;
    assert!(sent[0].2.contains(&job.ticket_number));

    // The same task delivered again
    h.scheduler
        .enqueue(
            &NotificationTask::Reminder {
                reminder_id: reminder.id,
                job_id: job.id,
                session_id: None,
            },
            None,
        )
        .await
        .unwrap();
    h.settle().await;
    assert_eq!(h.messenger.sent().len(), 1);

    let listed = h.reminders.list_for_job(&job.id).await.unwrap();
    assert!(listed[0].sent_at.is_some());
}

#[tokio::test]
async fn test_future_reminder_waits() {
    let h = Harness::new().await;

    let customer = h
        .crm
        .upsert_customer(PHONE, Default::default(), Utc::now())
        .await
        .unwrap();
    let (job, _) = h
        .crm
        .find_or_create_open_job(&customer.id, "Battery swap", Utc::now())
        .await
        .unwrap();

    h.reminders.schedule(&job.id, Cadence::Day20, None).await.unwrap();
    h.settle().await;
    assert!(h.messenger.sent().is_empty());
    assert_eq!(
        h.count("SELECT COUNT(*) FROM tasks WHERE status = 'pending'").await,
        1
    );
}

// ---- Failure stream ----

#[tokio::test]
async fn test_unknown_payload_fails_permanently() {
    let mut h = Harness::new().await;

    let task_id = h
        .scheduler
        .enqueue_raw(NOTIFICATION_QUEUE, json!({ "type": "birthday-greeting" }), Utc::now())
        .await
        .unwrap();

    let failure = tokio::time::timeout(Duration::from_secs(5), h.failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.task_id, task_id);
    assert!(failure.permanent);
    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.queue, NOTIFICATION_QUEUE);

    let (status,): (String,) = sqlx::query_as("SELECT status FROM tasks WHERE id = ?")
        .bind(task_id.to_string())
        .fetch_one(&h.pool.reader)
        .await
        .unwrap();
    assert_eq!(status, "failed");
}
