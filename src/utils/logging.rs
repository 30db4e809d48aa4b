// Centralized logging for notification requests
use log::{error, info, warn};

use crate::dispatch::DispatchResult;
use crate::service::NotificationError;
use crate::settings::RevokrsSettings;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the start of a notification request
    pub fn log_notification_received(request_id: &str, token_len: usize) {
        info!("📥 [{request_id}] Apple notification received ({token_len} byte token)");
    }

    /// Log a rejected request body
    pub fn log_bad_request(request_id: &str, reason: &str) {
        warn!("⚠️ [{request_id}] Rejected notification request: {reason}");
    }

    /// Log a processed notification
    pub fn log_notification_processed(request_id: &str, result: &DispatchResult) {
        info!(
            "✅ [{request_id}] Notification processed (type={})",
            result.event_type.as_deref().unwrap_or("<none>")
        );
    }

    /// Log a notification that could not be processed, with its cause
    pub fn log_notification_failed(request_id: &str, connection: &str, err: &NotificationError) {
        match err {
            NotificationError::Unauthorized(_) => {
                warn!("🚫 [{request_id}] Notification rejected: {err}");
            }
            NotificationError::MissingEvents | NotificationError::MalformedEvent(_) => {
                warn!("⚠️ [{request_id}] Unusable notification for connection '{connection}': {err}");
            }
            NotificationError::MutatorFailure(_) => {
                error!("❌ [{request_id}] Directory update failed for connection '{connection}': {err}");
            }
        }
    }

    /// Log the effective configuration at startup
    pub fn log_startup_configuration(settings: &RevokrsSettings) {
        info!("🍎 Bundle ID: {}", settings.apple.bundle_id);
        info!("🔑 Apple JWKS: {}", settings.apple.jwks_uri);
        info!("🔗 Connection: {}", settings.directory.connection_name);
        if settings.directory.is_configured() {
            info!("📇 Directory: {}", settings.directory.domain);
        } else {
            info!("📇 Directory: dry run (no DIRECTORY_DOMAIN configured)");
        }
    }
}
