use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked part or product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    /// Stock keeping unit. Unique.
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// Units on hand; never negative.
    pub quantity: i64,
    pub reorder_level: i64,
    pub cost_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

/// Request to create an inventory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    pub sell_price: Option<Decimal>,
}

impl NewInventoryItem {
    pub fn validate(&self) -> Result<(), String> {
        if self.sku.trim().is_empty() {
            return Err("sku is required".into());
        }
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.quantity < 0 || self.reorder_level < 0 {
            return Err("quantity and reorder level must not be negative".into());
        }
        let negative_price = [self.cost_price, self.sell_price]
            .iter()
            .flatten()
            .any(|p| p.is_sign_negative());
        if negative_price {
            return Err("prices must not be negative".into());
        }
        Ok(())
    }

    pub fn into_item(self, now: DateTime<Utc>) -> InventoryItem {
        InventoryItem {
            id: Uuid::now_v7(),
            sku: self.sku.trim().to_string(),
            name: self.name,
            description: self.description,
            quantity: self.quantity,
            reorder_level: self.reorder_level,
            cost_price: self.cost_price.map(|p| p.round_dp(2)),
            sell_price: self.sell_price.map(|p| p.round_dp(2)),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Signed stock adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Units to add (positive) or remove (negative).
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}
