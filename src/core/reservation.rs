use chrono::{DateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{payment_grace_period, ORDER_NUMBER_ATTEMPTS, ORDER_NUMBER_PREFIX, QUANTITY_PER_ORDER};
use crate::core::error::violates_unique;
use crate::core::{verify_event_counters, verify_ledger, CoreError, EventCounters, LedgerSnapshot};
use crate::database::Database;
use crate::models::{FlashSaleEvent, OrderStatus, PaymentMethod, Product, SalesOrderItem, StockLedger};

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub user_email: String,
    pub event_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct OrderReceipt {
    pub order_number: String,
    pub payment_deadline: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
}

/// Admits one buyer against the remaining stock of a flash-sale event.
///
/// Runs the whole admission as a single transaction: lock the event row,
/// validate window/stock/duplicates, lock the ledger row, reserve one unit
/// and create the pending order. Any rejection rolls the reservation back
/// whole; a colliding order number is retried with a fresh one.
pub async fn place_order(
    db: &Database,
    req: &PlaceOrderRequest,
) -> Result<OrderReceipt, CoreError> {
    if req.user_email.trim().is_empty() {
        return Err(CoreError::InvalidRequest("user_email must not be empty".into()));
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_place_order(db, req).await {
            Err(CoreError::Database(e))
                if violates_unique(&e, "sales_orders_order_number_key")
                    && attempt < ORDER_NUMBER_ATTEMPTS =>
            {
                warn!("order number collision, retrying (attempt {attempt})");
            }
            // The partial unique index closes the race window two requests
            // from the same user would otherwise have between the existence
            // check and commit.
            Err(CoreError::Database(e))
                if violates_unique(&e, "idx_orders_one_active_per_user_event") =>
            {
                return Err(CoreError::DuplicateOrder);
            }
            other => return other,
        }
    }
}

async fn try_place_order(
    db: &Database,
    req: &PlaceOrderRequest,
) -> Result<OrderReceipt, CoreError> {
    let mut tx = db.begin().await?;

    // Lock the event row first; every mutating path takes the event/order
    // lock before the ledger lock.
    let event = sqlx::query_as::<_, FlashSaleEvent>(
        "SELECT * FROM flash_sale_events WHERE id = $1 FOR UPDATE",
    )
    .bind(req.event_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CoreError::NotFound("flash sale event"))?;

    let now = Utc::now();
    if !event.is_active(now) {
        return Err(CoreError::SaleNotOpen);
    }
    if !event.has_stock() {
        return Err(CoreError::SoldOut);
    }

    let active_statuses: Vec<&str> = OrderStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
    let has_active_order: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM sales_orders
            WHERE user_email = $1 AND event_id = $2 AND status = ANY($3)
        )",
    )
    .bind(&req.user_email)
    .bind(event.id)
    .bind(&active_statuses)
    .fetch_one(&mut *tx)
    .await?;
    if has_active_order {
        return Err(CoreError::DuplicateOrder);
    }

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(event.product_id)
        .fetch_one(&mut *tx)
        .await?;

    // The ledger is authoritative for admission: re-check under its own
    // lock even though the event counters said there was stock.
    let ledger = sqlx::query_as::<_, StockLedger>(
        "SELECT * FROM stock_ledgers WHERE product_id = $1 FOR UPDATE",
    )
    .bind(event.product_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CoreError::NotFound("stock ledger"))?;
    if ledger.available < QUANTITY_PER_ORDER {
        return Err(CoreError::InsufficientStock);
    }

    let ledger_after = sqlx::query_as::<_, LedgerSnapshot>(
        "UPDATE stock_ledgers
         SET reserved = reserved + 1,
             available = on_hand - (reserved + 1),
             updated_at = now()
         WHERE id = $1
         RETURNING on_hand, reserved, available",
    )
    .bind(ledger.id)
    .fetch_one(&mut *tx)
    .await?;
    verify_ledger(&ledger_after)?;

    // Relative update, not a write-back of the struct read above: two
    // concurrent reservations compose instead of losing one.
    let counters = sqlx::query_as::<_, EventCounters>(
        "UPDATE flash_sale_events
         SET reserved_quantity = reserved_quantity + 1
         WHERE id = $1
         RETURNING total_quantity, reserved_quantity, sold_quantity, product_id",
    )
    .bind(event.id)
    .fetch_one(&mut *tx)
    .await?;
    verify_event_counters(&counters)?;

    let order_number = generate_order_number(now);
    let payment_deadline = now + payment_grace_period();
    let total_amount = product.price * Decimal::from(QUANTITY_PER_ORDER);

    let order_id: Uuid = sqlx::query_scalar(
        "INSERT INTO sales_orders
            (order_number, user_email, event_id, payment_method,
             payment_deadline, status, total_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(&order_number)
    .bind(&req.user_email)
    .bind(event.id)
    .bind(req.payment_method.as_str())
    .bind(payment_deadline)
    .bind(OrderStatus::Pending.as_str())
    .bind(total_amount)
    .fetch_one(&mut *tx)
    .await?;

    let item = SalesOrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: product.id,
        quantity: QUANTITY_PER_ORDER,
        unit_price: product.price,
        subtotal: total_amount,
    };
    sqlx::query(
        "INSERT INTO sales_order_items (id, order_id, product_id, quantity, unit_price, subtotal)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.subtotal)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(OrderReceipt {
        order_number,
        payment_deadline,
        payment_method: req.payment_method,
        total_amount,
    })
}

/// Human-traceable order number: prefix, date, eight random hex chars.
fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}",
        ORDER_NUMBER_PREFIX,
        now.format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_has_prefix_date_and_suffix() {
        let now = Utc::now();
        let number = generate_order_number(now);
        let date = now.format("%Y%m%d").to_string();

        assert!(number.starts_with(ORDER_NUMBER_PREFIX));
        assert!(number[ORDER_NUMBER_PREFIX.len()..].starts_with(&date));
        let suffix = &number[ORDER_NUMBER_PREFIX.len() + date.len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn order_numbers_do_not_trivially_collide() {
        let now = Utc::now();
        let a = generate_order_number(now);
        let b = generate_order_number(now);
        assert_ne!(a, b);
    }
}
