use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use std::env;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use flashcart::database::{create_database_pool, Database};
use flashcart::handlers;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    // Initialize database
    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url).await
        .expect("Failed to connect to database");

    sqlx::migrate!()
        .run(&db)
        .await
        .expect("Failed to run migrations");

    log::info!("Database connection successful");

    // Build the application router
    let app = create_router(db);

    // Get port from environment or use default
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    log::info!("flashcart server starting on http://{}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn create_router(db: Database) -> Router {
    Router::new()
        // Flash-sale ordering
        .route("/api/flash-sale/order", post(handlers::orders::create_order))
        .route("/api/flash-sale/:event_id/status", get(handlers::events::event_status))

        // Payment (simulated gateway hand-off + callback)
        .route("/api/payment/simulate", post(handlers::orders::simulate_payment))
        .route(
            "/api/payment/callback",
            get(handlers::orders::payment_callback_get)
                .post(handlers::orders::payment_callback_post),
        )

        // Order queries
        .route("/api/order/:order_number/status", get(handlers::orders::order_status))
        .route("/api/user/orders", get(handlers::orders::user_orders))

        // Operator endpoint, triggered by an external scheduler
        .route("/api/admin/release-expired", post(handlers::orders::release_expired))

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(db)
}
