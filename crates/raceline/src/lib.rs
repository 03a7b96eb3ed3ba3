pub mod errors;
pub mod geodesy;
pub mod handlers;
pub mod models;
pub mod nmea;
pub mod session;
pub mod simulator;
pub mod tracker;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
};

use crate::{
    handlers::{health_check, ingest_gps, nmea_ws, race_ws},
    session::SessionManager,
};

pub fn create_router(sessions: Arc<SessionManager>, static_dir: String) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(race_ws))
        .route("/nmea", get(nmea_ws))
        .route("/api/gps", post(ingest_gps))
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(sessions))
        .layer(cors)
        .layer(CompressionLayer::new())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
}

pub async fn run_server(static_dir: String, port: u16) -> anyhow::Result<()> {
    let sessions = SessionManager::new();
    let app = create_router(sessions, static_dir);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!("Server running on http://0.0.0.0:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
