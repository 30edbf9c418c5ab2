//! Point-of-sale, payments and inventory.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;
use voltura_types::error::{RepositoryError, ServiceError};
use voltura_types::event::DomainEvent;
use voltura_types::inventory::{InventoryItem, NewInventoryItem, StockAdjustment};
use voltura_types::invoice::{Invoice, InvoiceWithPayments, NewPayment, NewSale, Payment};
use voltura_types::numbering::document_number;
use voltura_types::quotation::{line_total, validate_line_items};
use voltura_types::task::NotificationTask;

use super::resolve_customer;
use crate::dispatch::TaskScheduler;
use crate::event::EventBus;
use crate::repository::crm::CrmRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::task::TaskQueue;

pub struct SalesService<I: InvoiceRepository, C: CrmRepository, Q: TaskQueue> {
    invoices: Arc<I>,
    crm: Arc<C>,
    scheduler: TaskScheduler<Q>,
    events: EventBus,
}

impl<I: InvoiceRepository, C: CrmRepository, Q: TaskQueue> SalesService<I, C, Q> {
    pub fn new(invoices: Arc<I>, crm: Arc<C>, scheduler: TaskScheduler<Q>, events: EventBus) -> Self {
        Self {
            invoices,
            crm,
            scheduler,
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Sales & payments
    // -----------------------------------------------------------------------

    /// Record a point-of-sale transaction.
    ///
    /// Stock for every inventory-backed line is checked before anything is
    /// written; the repository re-checks inside its transaction.
    pub async fn record_sale(
        &self,
        sale: NewSale,
        session_id: Option<String>,
    ) -> Result<InvoiceWithPayments, ServiceError> {
        validate_line_items(&sale.items).map_err(ServiceError::Validation)?;
        for payment in &sale.payments {
            payment.validate().map_err(ServiceError::Validation)?;
        }

        let now = Utc::now();
        let customer = match (&sale.customer_id, &sale.customer) {
            (Some(id), _) => self
                .crm
                .get_customer(id)
                .await?
                .ok_or(ServiceError::NotFound("customer"))?,
            (None, Some(customer)) => resolve_customer(self.crm.as_ref(), customer, now).await?,
            (None, None) => {
                return Err(ServiceError::Validation("a customer is required for a sale".into()));
            }
        };
        if let Some(job_id) = &sale.job_id {
            self.crm
                .get_job(job_id)
                .await?
                .ok_or(ServiceError::NotFound("job"))?;
        }

        let demand = stock_demand(&sale);
        for (item_id, wanted) in &demand {
            let item = self
                .invoices
                .get_item(item_id)
                .await?
                .ok_or(ServiceError::NotFound("inventory item"))?;
            if item.quantity < *wanted {
                return Err(ServiceError::Validation(format!(
                    "insufficient stock for {}: {} requested, {} available",
                    item.sku, wanted, item.quantity
                )));
            }
        }

        let total = line_total(&sale.items);
        let invoice = Invoice {
            id: Uuid::now_v7(),
            number: document_number("POS", now),
            customer_id: customer.id,
            job_id: sale.job_id,
            quotation_id: None,
            total,
            balance: total,
            line_items: sale.items,
            created_at: now,
            updated_at: now,
        };
        let payments: Vec<Payment> = sale
            .payments
            .into_iter()
            .map(|p| p.into_payment(invoice.id, now))
            .collect();

        let receipt = self.scheduler.prepare(
            &NotificationTask::PosSale {
                invoice_id: invoice.id,
                customer_id: customer.id,
                session_id,
            },
            now,
        )?;
        let invoice = self
            .invoices
            .record_sale(&invoice, &payments, &receipt, now)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(msg) => ServiceError::Validation(msg),
                other => other.into(),
            })?;
        info!(invoice_id = %invoice.id, number = %invoice.number, %total, "POS sale recorded");
        self.scheduler.announce(&receipt);

        let paid: Decimal = payments.iter().map(|p| p.amount).sum();
        self.events.publish(DomainEvent::InvoiceUpdated {
            invoice: invoice.clone(),
            paid,
        });
        for item_id in demand.keys() {
            match self.invoices.get_item(item_id).await {
                Ok(Some(item)) => self.events.publish(DomainEvent::InventoryUpdated {
                    item_id: item.id,
                    quantity: item.quantity,
                }),
                Ok(None) => {}
                Err(e) => warn!(%item_id, error = %e, "failed to reload item after sale"),
            }
        }

        Ok(InvoiceWithPayments { invoice, payments })
    }

    /// Append a payment to an invoice's ledger.
    pub async fn record_payment(
        &self,
        invoice_id: &Uuid,
        payment: NewPayment,
    ) -> Result<InvoiceWithPayments, ServiceError> {
        payment.validate().map_err(ServiceError::Validation)?;
        self.invoices
            .get(invoice_id)
            .await?
            .ok_or(ServiceError::NotFound("invoice"))?;

        let now = Utc::now();
        let payment = payment.into_payment(*invoice_id, now);
        let invoice = self.invoices.record_payment(&payment, now).await?;
        info!(%invoice_id, amount = %payment.amount, balance = %invoice.balance, "payment recorded");

        self.events.publish(DomainEvent::InvoiceUpdated {
            invoice: invoice.clone(),
            paid: payment.amount,
        });
        let payments = self.invoices.payments(invoice_id).await?;
        Ok(InvoiceWithPayments { invoice, payments })
    }

    pub async fn get_invoice(&self, invoice_id: &Uuid) -> Result<InvoiceWithPayments, ServiceError> {
        let invoice = self
            .invoices
            .get(invoice_id)
            .await?
            .ok_or(ServiceError::NotFound("invoice"))?;
        let payments = self.invoices.payments(invoice_id).await?;
        Ok(InvoiceWithPayments { invoice, payments })
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    pub async fn create_item(&self, request: NewInventoryItem) -> Result<InventoryItem, ServiceError> {
        request.validate().map_err(ServiceError::Validation)?;
        let item = request.into_item(Utc::now());
        self.invoices.create_item(&item).await?;
        info!(item_id = %item.id, sku = %item.sku, "inventory item created");
        self.events.publish(DomainEvent::InventoryUpdated {
            item_id: item.id,
            quantity: item.quantity,
        });
        Ok(item)
    }

    /// Apply a signed stock adjustment. The result may never go negative.
    pub async fn adjust_stock(
        &self,
        item_id: &Uuid,
        adjustment: StockAdjustment,
    ) -> Result<InventoryItem, ServiceError> {
        if adjustment.quantity == 0 {
            return Err(ServiceError::Validation("adjustment quantity must not be zero".into()));
        }
        let item = self
            .invoices
            .adjust_stock(item_id, adjustment.quantity, Utc::now())
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ServiceError::NotFound("inventory item"),
                RepositoryError::Conflict(msg) => ServiceError::Validation(msg),
                other => other.into(),
            })?;
        info!(
            %item_id,
            delta = adjustment.quantity,
            quantity = item.quantity,
            reason = adjustment.reason.as_deref().unwrap_or(""),
            "stock adjusted"
        );
        if item.needs_reorder() {
            warn!(%item_id, sku = %item.sku, quantity = item.quantity, "item at or below reorder level");
        }
        self.events.publish(DomainEvent::InventoryUpdated {
            item_id: item.id,
            quantity: item.quantity,
        });
        Ok(item)
    }

    pub async fn list_items(&self) -> Result<Vec<InventoryItem>, ServiceError> {
        Ok(self.invoices.list_items().await?)
    }
}

/// Units requested per inventory item across all lines of a sale.
fn stock_demand(sale: &NewSale) -> HashMap<Uuid, i64> {
    let mut demand = HashMap::new();
    for line in &sale.items {
        if let Some(item_id) = line.item_id {
            *demand.entry(item_id).or_insert(0) += i64::from(line.quantity);
        }
    }
    demand
}
