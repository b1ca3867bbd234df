use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::CoreError;
use crate::database::Database;
use crate::models::{FlashSaleEvent, OrderStatus, PaymentMethod, SalesOrder};

#[derive(Debug, Serialize)]
pub struct OrderProjection {
    pub order_number: String,
    pub user_email: String,
    pub status: String,
    pub status_label: String,
    pub created_at: DateTime<Utc>,
    pub payment_deadline: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_priority: Option<i32>,
    pub total_amount: Decimal,
    pub payment_method: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub order_number: String,
    pub status: String,
    pub status_label: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_priority: Option<i32>,
    pub total_amount: Decimal,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventProjection {
    pub event_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub remaining: i32,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
    pub has_stock: bool,
}

/// What a buyer needs to hand the (simulated) gateway for a pending order.
#[derive(Debug, Serialize)]
pub struct PaymentInstructions {
    pub order_number: String,
    pub payment_method: Option<String>,
    pub total_amount: Decimal,
}

pub async fn order_status(
    db: &Database,
    order_number: &str,
) -> Result<OrderProjection, CoreError> {
    let order = fetch_order(db, order_number).await?;
    let now = Utc::now();

    Ok(OrderProjection {
        message: order_message(&order, now),
        status_label: status_label(&order.status),
        payment_method: payment_method_label(order.payment_method.as_deref()),
        order_number: order.order_number,
        user_email: order.user_email,
        status: order.status,
        created_at: order.created_at,
        payment_deadline: order.payment_deadline,
        paid_at: order.paid_at,
        shipping_priority: order.shipping_priority,
        total_amount: order.total_amount,
    })
}

pub async fn event_status(db: &Database, event_id: Uuid) -> Result<EventProjection, CoreError> {
    #[derive(FromRow)]
    struct Row {
        #[sqlx(flatten)]
        event: FlashSaleEvent,
        product_name: String,
        product_sku: String,
    }

    let row = sqlx::query_as::<_, Row>(
        "SELECT e.*, p.name AS product_name, p.sku AS product_sku
         FROM flash_sale_events e
         JOIN products p ON p.id = e.product_id
         WHERE e.id = $1",
    )
    .bind(event_id)
    .fetch_optional(db)
    .await?
    .ok_or(CoreError::NotFound("flash sale event"))?;

    let now = Utc::now();
    Ok(EventProjection {
        event_id: row.event.id,
        product_name: row.product_name,
        product_sku: row.product_sku,
        total_quantity: row.event.total_quantity,
        reserved_quantity: row.event.reserved_quantity,
        sold_quantity: row.event.sold_quantity,
        remaining: row.event.remaining(),
        is_active: row.event.is_active(now),
        has_stock: row.event.has_stock(),
        status: row.event.status,
        start_time: row.event.start_time,
        end_time: row.event.end_time,
    })
}

pub async fn user_orders(db: &Database, user_email: &str) -> Result<Vec<OrderSummary>, CoreError> {
    let orders = sqlx::query_as::<_, SalesOrder>(
        "SELECT * FROM sales_orders WHERE user_email = $1 ORDER BY created_at DESC",
    )
    .bind(user_email)
    .fetch_all(db)
    .await?;

    Ok(orders
        .into_iter()
        .map(|o| OrderSummary {
            status_label: status_label(&o.status),
            payment_method: payment_method_label(o.payment_method.as_deref()),
            order_number: o.order_number,
            status: o.status,
            created_at: o.created_at,
            paid_at: o.paid_at,
            shipping_priority: o.shipping_priority,
            total_amount: o.total_amount,
        })
        .collect())
}

/// Validates that an order can still be paid and returns what the buyer
/// would hand the gateway. The gateway itself is external; this only backs
/// the simulation endpoint.
pub async fn payment_instructions(
    db: &Database,
    order_number: &str,
) -> Result<PaymentInstructions, CoreError> {
    let order = fetch_order(db, order_number).await?;
    let now = Utc::now();

    if order.is_expired(now) {
        return Err(CoreError::InvalidRequest("order has expired".into()));
    }
    if !order.is_pending() {
        return Err(CoreError::InvalidRequest(format!(
            "order is not awaiting payment (status: {})",
            status_label(&order.status)
        )));
    }

    Ok(PaymentInstructions {
        payment_method: payment_method_label(order.payment_method.as_deref()),
        order_number: order.order_number,
        total_amount: order.total_amount,
    })
}

async fn fetch_order(db: &Database, order_number: &str) -> Result<SalesOrder, CoreError> {
    sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(db)
        .await?
        .ok_or(CoreError::NotFound("order"))
}

fn status_label(status: &str) -> String {
    status
        .parse::<OrderStatus>()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|_| status.to_string())
}

fn payment_method_label(method: Option<&str>) -> Option<String> {
    method.map(|m| {
        m.parse::<PaymentMethod>()
            .map(|p| p.label().to_string())
            .unwrap_or_else(|_| m.to_string())
    })
}

fn order_message(order: &SalesOrder, now: DateTime<Utc>) -> String {
    match order.status.parse::<OrderStatus>() {
        Ok(OrderStatus::Paid) => match order.shipping_priority {
            Some(priority) => {
                format!("Order secured! Your shipping priority is #{priority}")
            }
            None => "Payment received".to_string(),
        },
        Ok(OrderStatus::Pending) => {
            if order.is_expired(now) {
                "Order has expired".to_string()
            } else {
                let deadline = order.payment_deadline.unwrap_or(now);
                let minutes_left = (deadline - now).num_minutes();
                format!("Complete payment within {minutes_left} minutes")
            }
        }
        Ok(OrderStatus::Expired) => "Order has expired".to_string(),
        Ok(OrderStatus::Cancelled) => "Order was cancelled".to_string(),
        Ok(OrderStatus::Shipped) => "Order is on its way".to_string(),
        Ok(OrderStatus::Completed) => "Order completed".to_string(),
        Err(()) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(status: OrderStatus) -> SalesOrder {
        let now = Utc::now();
        SalesOrder {
            id: Uuid::new_v4(),
            order_number: "FS20241121DEADBEEF".to_string(),
            user_email: "buyer@example.com".to_string(),
            event_id: Some(Uuid::new_v4()),
            payment_method: Some("line_pay".to_string()),
            payment_deadline: Some(now + Duration::minutes(45)),
            paid_at: None,
            shipping_priority: None,
            status: status.as_str().to_string(),
            total_amount: Decimal::new(99900, 2),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn paid_message_names_the_priority() {
        let mut o = order(OrderStatus::Paid);
        o.shipping_priority = Some(3);
        assert_eq!(order_message(&o, Utc::now()), "Order secured! Your shipping priority is #3");
    }

    #[test]
    fn pending_message_counts_down_minutes() {
        let o = order(OrderStatus::Pending);
        let msg = order_message(&o, Utc::now());
        assert!(msg.starts_with("Complete payment within"), "got: {msg}");
    }

    #[test]
    fn overdue_pending_reads_as_expired() {
        let mut o = order(OrderStatus::Pending);
        o.payment_deadline = Some(Utc::now() - Duration::minutes(1));
        assert_eq!(order_message(&o, Utc::now()), "Order has expired");
    }

    #[test]
    fn terminal_statuses_have_terminal_messages() {
        assert_eq!(order_message(&order(OrderStatus::Expired), Utc::now()), "Order has expired");
        assert_eq!(order_message(&order(OrderStatus::Cancelled), Utc::now()), "Order was cancelled");
    }

    #[test]
    fn labels_fall_back_to_raw_values() {
        assert_eq!(status_label("paid"), "Paid");
        assert_eq!(status_label("weird"), "weird");
        assert_eq!(payment_method_label(Some("line_pay")), Some("LINE Pay".to_string()));
        assert_eq!(payment_method_label(None), None);
    }
}
