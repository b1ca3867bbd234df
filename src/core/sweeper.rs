use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::core::{release_reservation, CoreError};
use crate::database::Database;
use crate::models::{OrderStatus, SalesOrder};

#[derive(Debug, Serialize)]
pub struct SweepOutcome {
    pub examined: usize,
    pub released: usize,
}

/// Releases every pending order whose payment deadline has passed.
///
/// Each order is handled in its own transaction so one failure cannot block
/// the rest of the sweep, and the pending re-check under the row lock makes
/// the sweep idempotent and safe to race against settlement: whoever locks
/// the row first wins, the other sees a non-pending status and moves on.
pub async fn sweep_expired(db: &Database, now: DateTime<Utc>) -> Result<SweepOutcome, CoreError> {
    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT order_number FROM sales_orders
         WHERE status = 'pending' AND payment_deadline < $1
         ORDER BY payment_deadline",
    )
    .bind(now)
    .fetch_all(db)
    .await?;

    let mut released = 0;
    for order_number in &candidates {
        match release_expired_order(db, order_number, now).await {
            Ok(true) => {
                released += 1;
                info!("released expired order {order_number}");
            }
            Ok(false) => {} // settled or swept concurrently, nothing to do
            Err(e) => warn!("failed to release order {order_number}: {e}"),
        }
    }

    Ok(SweepOutcome { examined: candidates.len(), released })
}

/// Returns true if this call expired the order and released its unit.
async fn release_expired_order(
    db: &Database,
    order_number: &str,
    now: DateTime<Utc>,
) -> Result<bool, CoreError> {
    let mut tx = db.begin().await?;

    let order = sqlx::query_as::<_, SalesOrder>(
        "SELECT * FROM sales_orders WHERE order_number = $1 FOR UPDATE",
    )
    .bind(order_number)
    .fetch_optional(&mut *tx)
    .await?;

    let order = match order {
        Some(o) if o.is_expired(now) => o,
        _ => return Ok(false),
    };

    sqlx::query("UPDATE sales_orders SET status = $2, updated_at = now() WHERE id = $1")
        .bind(order.id)
        .bind(OrderStatus::Expired.as_str())
        .execute(&mut *tx)
        .await?;

    if let Some(event_id) = order.event_id {
        release_reservation(&mut tx, event_id).await?;
    }

    tx.commit().await?;
    Ok(true)
}
