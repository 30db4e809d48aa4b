#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use revokrs::{
    configure_routes, utils::logging::LoggingHelper, NotificationService, RevokrsSettings,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = RevokrsSettings::load().context("Failed to load settings")?;
    settings.validate().context("Invalid settings")?;

    let http = settings
        .http_client()
        .context("Failed to build HTTP client")?;
    let service = NotificationService::from_settings(&settings, http)
        .context("Failed to initialize notification service")?;

    service.key_provider().prefetch().await;

    start_server(service, settings).await
}

/// Start the notification receiver
///
/// # Errors
///
/// Returns an error if the server cannot bind or fails while running
async fn start_server(service: NotificationService, settings: RevokrsSettings) -> anyhow::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);
    LoggingHelper::log_startup_configuration(&settings);

    let notification_path = settings.application.notification_path.clone();
    let service = web::Data::new(service);

    HttpServer::new(move || {
        let notification_path = notification_path.clone();
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(|cfg| configure_routes(cfg, &notification_path))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("Server error")
}

fn print_startup_info(bind_address: &str, settings: &RevokrsSettings) {
    println!(
        "Starting revokrs {} on http://{bind_address}",
        revokrs::VERSION
    );
    println!();
    println!("Endpoints:");
    println!(
        "  POST {} - Sign in with Apple server-to-server notifications",
        settings.application.notification_path
    );
    println!("  GET  /ping - Health check");
}
