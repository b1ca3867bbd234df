use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub cost: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-product stock position. `available` is maintained equal to
/// `on_hand - reserved` on every write; the row is only mutated inside a
/// transaction holding its exclusive lock.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct StockLedger {
    pub id: Uuid,
    pub product_id: Uuid,
    pub on_hand: i32,
    pub reserved: i32,
    pub available: i32,
    pub updated_at: DateTime<Utc>,
}
