pub mod error;
pub mod query;
pub mod reservation;
pub mod settlement;
pub mod sweeper;

pub use error::CoreError;

use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

/// Ledger row as returned by an UPDATE ... RETURNING, used for invariant
/// verification before commit.
#[derive(Debug, FromRow)]
pub(crate) struct LedgerSnapshot {
    pub on_hand: i32,
    pub reserved: i32,
    pub available: i32,
}

#[derive(Debug, FromRow)]
pub(crate) struct EventCounters {
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub product_id: Uuid,
}

pub(crate) fn verify_ledger(s: &LedgerSnapshot) -> Result<(), CoreError> {
    if s.reserved < 0 || s.reserved > s.on_hand || s.available != s.on_hand - s.reserved {
        return Err(CoreError::Consistency(format!(
            "stock ledger out of bounds: on_hand={} reserved={} available={}",
            s.on_hand, s.reserved, s.available
        )));
    }
    Ok(())
}

pub(crate) fn verify_event_counters(c: &EventCounters) -> Result<(), CoreError> {
    if c.reserved_quantity < 0
        || c.sold_quantity < 0
        || c.reserved_quantity + c.sold_quantity > c.total_quantity
    {
        return Err(CoreError::Consistency(format!(
            "event counters out of bounds: total={} reserved={} sold={}",
            c.total_quantity, c.reserved_quantity, c.sold_quantity
        )));
    }
    Ok(())
}

/// Puts one reserved unit back on sale: event counter first, then the
/// ledger row, matching the event-before-ledger lock order used everywhere.
/// Shared by the settlement failure branch and the expiry sweeper.
pub(crate) async fn release_reservation(
    conn: &mut PgConnection,
    event_id: Uuid,
) -> Result<(), CoreError> {
    let counters = sqlx::query_as::<_, EventCounters>(
        "UPDATE flash_sale_events
         SET reserved_quantity = reserved_quantity - 1
         WHERE id = $1
         RETURNING total_quantity, reserved_quantity, sold_quantity, product_id",
    )
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(CoreError::NotFound("flash sale event"))?;
    verify_event_counters(&counters)?;

    let ledger = sqlx::query_as::<_, LedgerSnapshot>(
        "UPDATE stock_ledgers
         SET reserved = reserved - 1,
             available = on_hand - (reserved - 1),
             updated_at = now()
         WHERE product_id = $1
         RETURNING on_hand, reserved, available",
    )
    .bind(counters.product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(CoreError::NotFound("stock ledger"))?;
    verify_ledger(&ledger)?;

    Ok(())
}
