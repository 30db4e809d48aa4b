//! Turns a verified Apple event into a directory mutation

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::apple::{AppleEvent, AppleEventKind};
use crate::directory::{AccountMutator, DirectoryError};

pub use crate::directory::UserIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
}

/// Outcome of a handled event, serialized as the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    /// The event `type` exactly as received
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

impl DispatchResult {
    fn success(event_type: Option<String>) -> Self {
        Self {
            status: DispatchStatus::Success,
            event_type,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Directory mutation failed: {0}")]
    MutatorFailure(#[from] DirectoryError),
}

#[derive(Clone)]
pub struct EventDispatcher {
    directory: Arc<dyn AccountMutator>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(directory: Arc<dyn AccountMutator>) -> Self {
        Self { directory }
    }

    /// Parse the nested event and apply the matching mutation
    ///
    /// # Errors
    ///
    /// Returns `MalformedEvent` if the payload cannot be parsed or an
    /// `email-enabled` event has no email, and `MutatorFailure` if the
    /// directory call fails.
    pub async fn dispatch(
        &self,
        events_payload: &str,
        connection: &str,
    ) -> Result<DispatchResult, DispatchError> {
        let event = AppleEvent::parse(events_payload)
            .map_err(|e| DispatchError::MalformedEvent(e.to_string()))?;
        let user_id = UserIdentifier::new(connection, &event.sub);

        let occurred_at = event
            .occurred_at()
            .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
        info!(
            "📨 Apple event '{}' for user {user_id} (occurred {occurred_at})",
            event.kind
        );

        let outcome = match &event.kind {
            AppleEventKind::AccountDelete => self.directory.delete_user(&user_id).await,
            AppleEventKind::ConsentRevoked => self.directory.block_user(&user_id).await,
            AppleEventKind::EmailDisabled => {
                debug!("Email relay disabled for {user_id}, nothing to update");
                Ok(())
            }
            AppleEventKind::EmailEnabled => {
                let Some(email) = event.email.as_deref() else {
                    warn!("⚠️ email-enabled event for {user_id} carries no email");
                    return Err(DispatchError::MalformedEvent(
                        "email-enabled event without email".to_string(),
                    ));
                };
                debug!(
                    "Email relay enabled for {user_id} (private relay: {:?})",
                    event.is_private_email
                );
                self.directory.patch_user(&user_id, email).await
            }
            AppleEventKind::Unknown(raw) => {
                warn!("⚠️ Unsupported Apple event type '{raw}' for {user_id}, ignoring");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            error!("❌ Failed to apply '{}' for {user_id}: {e}", event.kind);
            return Err(e.into());
        }

        Ok(DispatchResult::success(event.raw_type))
    }
}
