use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::service::{NotificationError, NotificationService};
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;

/// Body Apple posts to the notification endpoint
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub payload: Option<String>,
}

/// Receive one Apple server-to-server notification
///
/// The body is parsed by hand so that malformed JSON maps to the same 400
/// response as a missing payload.
pub async fn apple_notification(
    body: web::Bytes,
    service: web::Data<NotificationService>,
) -> HttpResponse {
    let request_id = Uuid::new_v4().to_string();

    let request: NotificationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            LoggingHelper::log_bad_request(&request_id, &format!("invalid JSON body: {e}"));
            return ResponseBuilder::invalid_request();
        }
    };

    let Some(token) = request.payload.filter(|payload| !payload.is_empty()) else {
        LoggingHelper::log_bad_request(&request_id, "missing payload");
        return ResponseBuilder::missing_payload();
    };

    LoggingHelper::log_notification_received(&request_id, token.len());

    match service.handle(&token).await {
        Ok(result) => {
            LoggingHelper::log_notification_processed(&request_id, &result);
            ResponseBuilder::ok(&result)
        }
        Err(err) => {
            LoggingHelper::log_notification_failed(&request_id, service.connection(), &err);
            match err {
                NotificationError::MissingEvents => ResponseBuilder::missing_events(),
                NotificationError::Unauthorized(_)
                | NotificationError::MalformedEvent(_)
                | NotificationError::MutatorFailure(_) => ResponseBuilder::server_error(),
            }
        }
    }
}

/// Any method other than POST on the notification route
pub async fn method_not_allowed() -> HttpResponse {
    ResponseBuilder::method_not_allowed("POST")
}
