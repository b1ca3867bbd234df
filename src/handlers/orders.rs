use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::reservation::{self, PlaceOrderRequest};
use crate::core::settlement::{self, PaymentOutcome, SettlementResult};
use crate::core::sweeper::{self, SweepOutcome};
use crate::core::{query, CoreError};
use crate::database::Database;
use crate::handlers::{with_retry, ApiError};
use crate::models::PaymentMethod;

#[derive(Deserialize)]
pub struct CreateOrderForm {
    pub user_email: String,
    pub flash_sale_event_id: Uuid,
    pub payment_method: String,
}

pub async fn create_order(
    State(db): State<Database>,
    Json(form): Json<CreateOrderForm>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payment_method: PaymentMethod = form
        .payment_method
        .parse()
        .map_err(|_| CoreError::InvalidRequest("unknown payment method".into()))?;

    let request = PlaceOrderRequest {
        user_email: form.user_email,
        event_id: form.flash_sale_event_id,
        payment_method,
    };

    let receipt = with_retry(|| reservation::place_order(&db, &request)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "order_number": receipt.order_number,
            "payment_deadline": receipt.payment_deadline,
            "payment_method": receipt.payment_method,
            "total_amount": receipt.total_amount,
            "message": "Order created, please complete payment within 1 hour",
        })),
    ))
}

#[derive(Deserialize)]
pub struct SimulatePaymentForm {
    pub order_number: String,
}

/// Stand-in for the hand-off to a real gateway: validates the order can
/// still be paid and returns the callback URL a buyer would be sent to.
pub async fn simulate_payment(
    State(db): State<Database>,
    Json(form): Json<SimulatePaymentForm>,
) -> Result<Json<Value>, ApiError> {
    let instructions = query::payment_instructions(&db, &form.order_number).await?;

    let base_url = std::env::var("PUBLIC_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let payment_url = format!(
        "{}/api/payment/callback?order={}&status=success",
        base_url, instructions.order_number
    );

    Ok(Json(json!({
        "success": true,
        "message": "Proceed to the payment page to complete payment",
        "payment_url": payment_url,
        "order_number": instructions.order_number,
        "payment_method": instructions.payment_method,
        "total_amount": instructions.total_amount,
    })))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(alias = "order_number")]
    pub order: String,
    pub status: String,
}

// Gateways notify via GET redirect or POST webhook; both land here.
pub async fn payment_callback_get(
    State(db): State<Database>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    payment_callback(db, params).await
}

pub async fn payment_callback_post(
    State(db): State<Database>,
    Json(params): Json<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    payment_callback(db, params).await
}

async fn payment_callback(db: Database, params: CallbackParams) -> Result<Json<Value>, ApiError> {
    let outcome: PaymentOutcome = params
        .status
        .parse()
        .map_err(|_| CoreError::InvalidRequest("status must be success or failure".into()))?;

    let result = with_retry(|| settlement::report_payment(&db, &params.order, outcome)).await?;

    let body = match result {
        SettlementResult::Settled {
            order_number,
            status,
            shipping_priority: Some(priority),
            paid_at,
        } => json!({
            "success": true,
            "message": "Payment received!",
            "order_number": order_number,
            "status": status,
            "shipping_priority": priority,
            "paid_at": paid_at,
        }),
        SettlementResult::Settled { order_number, status, .. } => json!({
            "success": false,
            "message": "Payment failed, the order was cancelled",
            "order_number": order_number,
            "status": status,
        }),
        SettlementResult::AlreadyProcessed { order_number, status } => json!({
            "success": false,
            "message": format!("Order already processed, current status: {status}"),
            "order_number": order_number,
            "status": status,
        }),
    };

    Ok(Json(body))
}

pub async fn order_status(
    State(db): State<Database>,
    Path(order_number): Path<String>,
) -> Result<Json<query::OrderProjection>, ApiError> {
    Ok(Json(query::order_status(&db, &order_number).await?))
}

#[derive(Deserialize)]
pub struct UserOrdersParams {
    pub email: String,
}

#[derive(Serialize)]
pub struct UserOrdersResponse {
    pub user_email: String,
    pub total_orders: usize,
    pub orders: Vec<query::OrderSummary>,
}

pub async fn user_orders(
    State(db): State<Database>,
    Query(params): Query<UserOrdersParams>,
) -> Result<Json<UserOrdersResponse>, ApiError> {
    if params.email.trim().is_empty() {
        return Err(CoreError::InvalidRequest("email must not be empty".into()).into());
    }

    let orders = query::user_orders(&db, &params.email).await?;
    Ok(Json(UserOrdersResponse {
        user_email: params.email,
        total_orders: orders.len(),
        orders,
    }))
}

/// Operator endpoint for the expiry sweep; meant to be hit by an external
/// scheduler (cron or similar).
pub async fn release_expired(
    State(db): State<Database>,
) -> Result<Json<SweepOutcome>, ApiError> {
    Ok(Json(sweeper::sweep_expired(&db, Utc::now()).await?))
}
