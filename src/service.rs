//! Request-level orchestration: verify the token, then dispatch its event

use std::sync::Arc;

use log::{info, warn};

use crate::apple::{KeyProvider, TokenVerifier, Unauthorized};
use crate::directory::{AccountMutator, DirectoryError, DryRunMutator, ManagementApiClient};
use crate::dispatch::{DispatchError, DispatchResult, EventDispatcher};
use crate::settings::RevokrsSettings;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
    #[error("Verified token carries no events claim")]
    MissingEvents,
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Directory mutation failed: {0}")]
    MutatorFailure(DirectoryError),
}

impl From<DispatchError> for NotificationError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::MalformedEvent(reason) => Self::MalformedEvent(reason),
            DispatchError::MutatorFailure(cause) => Self::MutatorFailure(cause),
        }
    }
}

/// Handles one signed notification end to end
#[derive(Clone)]
pub struct NotificationService {
    verifier: TokenVerifier,
    dispatcher: EventDispatcher,
    bundle_id: String,
    connection: String,
}

impl NotificationService {
    #[must_use]
    pub fn new(
        verifier: TokenVerifier,
        dispatcher: EventDispatcher,
        bundle_id: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            dispatcher,
            bundle_id: bundle_id.into(),
            connection: connection.into(),
        }
    }

    /// Wire the service from settings
    ///
    /// Uses the Management API when a directory domain is configured and the
    /// dry-run mutator otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory settings do not form a valid client
    pub fn from_settings(
        settings: &RevokrsSettings,
        http: reqwest::Client,
    ) -> Result<Self, DirectoryError> {
        let keys = KeyProvider::from_uri(http.clone(), &settings.apple.jwks_uri);

        let directory: Arc<dyn AccountMutator> = if settings.directory.is_configured() {
            info!(
                "🔗 Directory mutations go to the Management API at {}",
                settings.directory.domain
            );
            Arc::new(ManagementApiClient::from_settings(
                http,
                &settings.directory,
            )?)
        } else {
            warn!("🧪 No directory domain configured, mutations will only be logged");
            Arc::new(DryRunMutator)
        };

        Ok(Self::new(
            TokenVerifier::new(keys),
            EventDispatcher::new(directory),
            settings.apple.bundle_id.clone(),
            settings.directory.connection_name.clone(),
        ))
    }

    #[must_use]
    pub fn key_provider(&self) -> &KeyProvider {
        self.verifier.key_provider()
    }

    #[must_use]
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Verify a signed notification and apply its event
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token fails verification, `MissingEvents`
    /// if it carries no event, and the dispatcher's failure otherwise
    pub async fn handle(&self, token: &str) -> Result<DispatchResult, NotificationError> {
        let claims = self.verifier.verify(token, &self.bundle_id).await?;
        let events = claims.events.ok_or(NotificationError::MissingEvents)?;
        Ok(self.dispatcher.dispatch(&events, &self.connection).await?)
    }
}
