use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use crate::core::{
    release_reservation, verify_event_counters, verify_ledger, CoreError, EventCounters,
    LedgerSnapshot,
};
use crate::database::Database;
use crate::models::{OrderStatus, SalesOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failure,
}

impl FromStr for PaymentOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(PaymentOutcome::Success),
            "failure" | "failed" => Ok(PaymentOutcome::Failure),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SettlementResult {
    /// The reservation was converted: paid orders carry their shipping
    /// priority, cancelled ones released their unit back to stock.
    Settled {
        order_number: String,
        status: OrderStatus,
        shipping_priority: Option<i32>,
        paid_at: Option<DateTime<Utc>>,
    },
    /// The order had already left `pending`. Payment callbacks are
    /// delivered at least once, so this is informational, not an error.
    AlreadyProcessed {
        order_number: String,
        status: String,
    },
}

/// Applies a payment gateway outcome to a pending order.
///
/// Success converts the reservation into a sale and assigns the next
/// shipping priority for the event; failure cancels the order and releases
/// its unit. Either way the order row is locked first, so a concurrent
/// sweep or duplicate callback observes a non-pending status and no-ops.
pub async fn report_payment(
    db: &Database,
    order_number: &str,
    outcome: PaymentOutcome,
) -> Result<SettlementResult, CoreError> {
    let mut tx = db.begin().await?;

    let order = sqlx::query_as::<_, SalesOrder>(
        "SELECT * FROM sales_orders WHERE order_number = $1 FOR UPDATE",
    )
    .bind(order_number)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CoreError::NotFound("order"))?;

    if !order.is_pending() {
        return Ok(SettlementResult::AlreadyProcessed {
            order_number: order.order_number,
            status: order.status,
        });
    }

    let event_id = order
        .event_id
        .ok_or_else(|| CoreError::Consistency(format!("order {order_number} has no event")))?;

    let result = match outcome {
        PaymentOutcome::Success => {
            // Serialize priority assignment per event: every successful
            // settlement locks the event row before counting, so priorities
            // come out gapless and strictly increasing even when two
            // callbacks land in the same instant.
            sqlx::query("SELECT id FROM flash_sale_events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .execute(&mut *tx)
                .await?;

            // Every earlier settlement for this event committed before our
            // event lock was granted, so the count of paid orders is exactly
            // the number of buyers who settled first. Counting by
            // paid_at < now would break down on timestamp ties.
            let paid_at = Utc::now();
            let earlier_paid: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sales_orders
                 WHERE event_id = $1 AND status = 'paid'",
            )
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
            let shipping_priority = i32::try_from(earlier_paid + 1)
                .map_err(|_| CoreError::Consistency("shipping priority overflow".into()))?;

            sqlx::query(
                "UPDATE sales_orders
                 SET status = $2, paid_at = $3, shipping_priority = $4, updated_at = now()
                 WHERE id = $1",
            )
            .bind(order.id)
            .bind(OrderStatus::Paid.as_str())
            .bind(paid_at)
            .bind(shipping_priority)
            .execute(&mut *tx)
            .await?;

            // The unit leaves physical stock: reserved and on_hand both drop.
            let ledger = sqlx::query_as::<_, LedgerSnapshot>(
                "UPDATE stock_ledgers
                 SET reserved = reserved - 1,
                     on_hand = on_hand - 1,
                     available = (on_hand - 1) - (reserved - 1),
                     updated_at = now()
                 WHERE product_id = (SELECT product_id FROM flash_sale_events WHERE id = $1)
                 RETURNING on_hand, reserved, available",
            )
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CoreError::NotFound("stock ledger"))?;
            verify_ledger(&ledger)?;

            let counters = sqlx::query_as::<_, EventCounters>(
                "UPDATE flash_sale_events
                 SET reserved_quantity = reserved_quantity - 1,
                     sold_quantity = sold_quantity + 1
                 WHERE id = $1
                 RETURNING total_quantity, reserved_quantity, sold_quantity, product_id",
            )
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
            verify_event_counters(&counters)?;

            SettlementResult::Settled {
                order_number: order.order_number,
                status: OrderStatus::Paid,
                shipping_priority: Some(shipping_priority),
                paid_at: Some(paid_at),
            }
        }
        PaymentOutcome::Failure => {
            sqlx::query(
                "UPDATE sales_orders SET status = $2, updated_at = now() WHERE id = $1",
            )
            .bind(order.id)
            .bind(OrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

            release_reservation(&mut tx, event_id).await?;

            SettlementResult::Settled {
                order_number: order.order_number,
                status: OrderStatus::Cancelled,
                shipping_priority: None,
                paid_at: None,
            }
        }
    };

    tx.commit().await?;
    Ok(result)
}
