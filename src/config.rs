use chrono::Duration;

/// Units reserved by a single order. Fixed at one per buyer to keep scalpers
/// from draining a drop in a single request.
pub const QUANTITY_PER_ORDER: i32 = 1;

/// Prefix for the human-traceable order number (FS + date + random suffix).
pub const ORDER_NUMBER_PREFIX: &str = "FS";

/// How many fresh order numbers we try before giving up on a collision.
pub const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// How many times a handler re-runs a core operation after a transient
/// database failure (deadlock, lock timeout) before reporting it.
pub const TRANSIENT_RETRY_ATTEMPTS: u32 = 3;

/// Time a buyer has to complete payment before the reservation is released.
pub fn payment_grace_period() -> Duration {
    Duration::hours(1)
}
