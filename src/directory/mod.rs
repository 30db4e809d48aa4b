//! Downstream user directory
//!
//! The [`AccountMutator`] trait is the boundary to the identity store that owns
//! user accounts. Implementations are expected to be idempotent.

pub mod dry_run;
pub mod management;

use std::fmt;

use async_trait::async_trait;

pub use dry_run::DryRunMutator;
pub use management::ManagementApiClient;

/// Directory user ID of the form `{connection}|{sub}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentifier(String);

impl UserIdentifier {
    /// Join a connection label and a provider subject; no validation is applied
    #[must_use]
    pub fn new(connection: &str, sub: &str) -> Self {
        Self(format!("{connection}|{sub}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(String),
    #[error("Directory {operation} returned status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("Failed to obtain directory access token: {0}")]
    Token(String),
    #[error("Invalid directory configuration: {0}")]
    Configuration(String),
}

/// Account lifecycle operations on the directory
#[async_trait]
pub trait AccountMutator: Send + Sync {
    /// Remove the user
    ///
    /// # Errors
    ///
    /// Returns an error if the directory rejects or cannot process the request
    async fn delete_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError>;

    /// Prevent the user from signing in
    ///
    /// # Errors
    ///
    /// Returns an error if the directory rejects or cannot process the request
    async fn block_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError>;

    /// Update the user's email address
    ///
    /// # Errors
    ///
    /// Returns an error if the directory rejects or cannot process the request
    async fn patch_user(&self, user_id: &UserIdentifier, email: &str)
        -> Result<(), DirectoryError>;
}
