//! HTTP request handlers

pub mod budget;
pub mod calls;
pub mod contacts;
pub mod webhooks;

use actix_web::{web, HttpResponse};

pub use budget::configure as configure_budget;
pub use calls::configure as configure_calls;
pub use contacts::configure as configure_contacts;
pub use webhooks::configure as configure_webhooks;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "campaign-dialer",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Mount every API route under `/api/v1`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_calls)
            .configure(configure_webhooks)
            .configure(configure_budget)
            .configure(configure_contacts),
    );
}
