use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware,
};
use std::path::PathBuf;
use time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::handlers::{
    app::{health_check, index},
    auth::{sign_in_handler, sign_out_handler, sign_up_handler},
    dashboard::{confirm_delete_page, dashboard_page, delete_newsletter},
    editor::{
        create_newsletter, edit_newsletter_page, new_newsletter_page, send_sample,
        update_newsletter,
    },
    metrics::metrics,
};
use crate::config::crate_directory;
use crate::AppState;

pub fn build_router(state: AppState, session_inactivity_hours: i64) -> Router {
    // Session setup
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // Set to true in production with HTTPS
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            session_inactivity_hours,
        )));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/auth/sign-in", post(sign_in_handler))
        .route("/auth/sign-up", post(sign_up_handler))
        .route("/auth/sign-out", post(sign_out_handler))
        .route("/dashboard", get(dashboard_page))
        .route("/newsletters", post(create_newsletter))
        .route("/newsletters/new", get(new_newsletter_page))
        .route("/newsletters/:id", post(update_newsletter))
        .route("/newsletters/:id/edit", get(edit_newsletter_page))
        .route(
            "/newsletters/:id/delete",
            get(confirm_delete_page).post(delete_newsletter),
        )
        .route("/newsletters/:id/send-sample", post(send_sample))
        .nest_service("/static", ServeDir::new(static_directory()))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

fn static_directory() -> PathBuf {
    crate_directory()
        .unwrap_or_else(|_| PathBuf::from("newsletter-frontend"))
        .join("static")
}
