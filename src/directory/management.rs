// Management API client for the downstream user directory
// Uses a client-credentials access token, cached until shortly before it expires

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use url::Url;

use super::{AccountMutator, DirectoryError, UserIdentifier};
use crate::settings::DirectorySettings;

/// Tokens are refreshed this many seconds before they expire
const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECONDS) < self.expires_at
    }
}

#[derive(Clone)]
pub struct ManagementApiClient {
    http: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    audience: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl ManagementApiClient {
    /// Build a client from directory settings
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Configuration` if the domain does not form a valid URL
    pub fn from_settings(
        http: reqwest::Client,
        settings: &DirectorySettings,
    ) -> Result<Self, DirectoryError> {
        let base_url = settings
            .base_url()
            .map_err(|e| DirectoryError::Configuration(format!("Invalid directory domain: {e}")))?;
        let audience = settings.audience.clone().unwrap_or_else(|| {
            base_url
                .join("api/v2/")
                .map_or_else(|_| base_url.to_string(), |url| url.to_string())
        });

        Ok(Self {
            http,
            base_url,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            audience,
            token: Arc::new(RwLock::new(None)),
        })
    }

    async fn access_token(&self) -> Result<String, DirectoryError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *self.token.write().await = Some(fresh);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<CachedToken, DirectoryError> {
        let token_url = self
            .base_url
            .join("oauth/token")
            .map_err(|e| DirectoryError::Configuration(e.to_string()))?;
        debug!("🔄 Requesting directory access token from {token_url}");

        let response = self
            .http
            .post(token_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "audience": self.audience,
            }))
            .send()
            .await
            .map_err(|e| DirectoryError::Token(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Token(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Token(format!("Invalid token response: {e}")))?;

        let expires_at = Duration::try_seconds(token.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                DirectoryError::Token(format!("Invalid expires_in: {}", token.expires_in))
            })?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    fn user_url(&self, user_id: &UserIdentifier) -> Result<Url, DirectoryError> {
        let path = format!("api/v2/users/{}", urlencoding::encode(user_id.as_str()));
        self.base_url
            .join(&path)
            .map_err(|e| DirectoryError::Configuration(e.to_string()))
    }

    async fn patch(
        &self,
        operation: &'static str,
        user_id: &UserIdentifier,
        body: serde_json::Value,
    ) -> Result<(), DirectoryError> {
        let url = self.user_url(user_id)?;
        let token = self.access_token().await?;

        let response = self
            .http
            .patch(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(status_error(operation, response).await)
    }
}

async fn status_error(operation: &'static str, response: reqwest::Response) -> DirectoryError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    DirectoryError::Status {
        operation,
        status,
        body,
    }
}

#[async_trait]
impl AccountMutator for ManagementApiClient {
    async fn delete_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        let url = self.user_url(user_id)?;
        let token = self.access_token().await?;

        let response = self
            .http
            .delete(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!("🗑️ Deleted directory user {user_id}");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                info!("Directory user {user_id} already absent, nothing to delete");
                Ok(())
            }
            _ => Err(status_error("delete", response).await),
        }
    }

    async fn block_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        self.patch("block", user_id, json!({ "blocked": true }))
            .await?;
        info!("⛔ Blocked directory user {user_id}");
        Ok(())
    }

    async fn patch_user(&self, user_id: &UserIdentifier, email: &str) -> Result<(), DirectoryError> {
        self.patch("patch", user_id, json!({ "email": email }))
            .await?;
        info!("✉️ Updated email of directory user {user_id}");
        Ok(())
    }
}
