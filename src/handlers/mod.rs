// HTTP request handlers for the notification receiver
pub mod notifications;

use actix_web::{web, HttpResponse, Result};
use serde::Serialize;

pub use notifications::{apple_notification, method_not_allowed, NotificationRequest};

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    message: String,
}

/// Health check endpoint
///
/// # Errors
///
/// This function currently never returns an error
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "revokrs is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Register the notification route and the health check
pub fn configure_routes(cfg: &mut web::ServiceConfig, notification_path: &str) {
    cfg.service(
        web::resource(notification_path)
            .route(web::post().to(apple_notification))
            .default_service(web::route().to(method_not_allowed)),
    )
    .route("/ping", web::get().to(health));
}
