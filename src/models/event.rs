use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const EVENT_STATUS_PENDING: &str = "pending";
pub const EVENT_STATUS_ACTIVE: &str = "active";
pub const EVENT_STATUS_ENDED: &str = "ended";

/// A flash-sale drop: a product sold in a fixed quantity within a time
/// window. The counters are mutated only by the reservation/settlement
/// engine; status and window are operator-driven.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct FlashSaleEvent {
    pub id: Uuid,
    pub product_id: Uuid,
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl FlashSaleEvent {
    /// Open for orders: operator marked it active and `now` falls within
    /// the half-open window `[start_time, end_time)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == EVENT_STATUS_ACTIVE && self.start_time <= now && now < self.end_time
    }

    pub fn has_stock(&self) -> bool {
        self.reserved_quantity + self.sold_quantity < self.total_quantity
    }

    pub fn remaining(&self) -> i32 {
        self.total_quantity - self.reserved_quantity - self.sold_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(status: &str, start_offset: i64, end_offset: i64) -> FlashSaleEvent {
        let now = Utc::now();
        FlashSaleEvent {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            total_quantity: 10,
            reserved_quantity: 0,
            sold_quantity: 0,
            start_time: now + Duration::seconds(start_offset),
            end_time: now + Duration::seconds(end_offset),
            status: status.to_string(),
            created_at: now,
        }
    }

    #[test]
    fn active_within_window() {
        let e = event(EVENT_STATUS_ACTIVE, -60, 60);
        assert!(e.is_active(Utc::now()));
    }

    #[test]
    fn inactive_before_start_or_after_end() {
        let now = Utc::now();
        assert!(!event(EVENT_STATUS_ACTIVE, 10, 60).is_active(now));
        assert!(!event(EVENT_STATUS_ACTIVE, -60, -10).is_active(now));
    }

    #[test]
    fn end_time_is_exclusive() {
        let e = event(EVENT_STATUS_ACTIVE, -60, 60);
        assert!(!e.is_active(e.end_time));
        assert!(e.is_active(e.start_time));
    }

    #[test]
    fn only_active_status_opens_the_sale_within_window() {
        let now = Utc::now();
        assert!(!event(EVENT_STATUS_PENDING, -60, 60).is_active(now));
        assert!(!event(EVENT_STATUS_ENDED, -60, 60).is_active(now));
    }

    #[test]
    fn stock_accounts_for_reservations_and_sales() {
        let mut e = event(EVENT_STATUS_ACTIVE, -60, 60);
        e.reserved_quantity = 6;
        e.sold_quantity = 3;
        assert!(e.has_stock());
        assert_eq!(e.remaining(), 1);

        e.sold_quantity = 4;
        assert!(!e.has_stock());
        assert_eq!(e.remaining(), 0);
    }
}
