use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::core::query;
use crate::database::Database;
use crate::handlers::ApiError;

pub async fn event_status(
    State(db): State<Database>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<query::EventProjection>, ApiError> {
    Ok(Json(query::event_status(&db, event_id).await?))
}
