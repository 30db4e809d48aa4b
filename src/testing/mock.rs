//! Mock implementations of the key source and the directory
//!
//! These record every interaction so tests can assert on exact call counts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::apple::jwks::{JsonWebKeySet, JwksSource, KeyProviderError};
use crate::directory::{AccountMutator, DirectoryError, UserIdentifier};

/// Serves a fixed key set and counts fetches
pub struct CountingJwksSource {
    keys: Mutex<Option<JsonWebKeySet>>,
    fetches: AtomicUsize,
}

impl CountingJwksSource {
    #[must_use]
    pub fn new(keys: JsonWebKeySet) -> Self {
        Self {
            keys: Mutex::new(Some(keys)),
            fetches: AtomicUsize::new(0),
        }
    }

    /// A source whose every fetch fails as if the network were down
    #[must_use]
    pub fn failing() -> Self {
        Self {
            keys: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Replace the served key set, simulating a key rotation
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn set_keys(&self, keys: JsonWebKeySet) {
        *self.keys.lock().unwrap() = Some(keys);
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JwksSource for CountingJwksSource {
    async fn fetch(&self) -> Result<JsonWebKeySet, KeyProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .map_err(|_| KeyProviderError::Unavailable("poisoned".to_string()))?
            .clone()
            .ok_or_else(|| KeyProviderError::Unavailable("connection refused".to_string()))
    }
}

/// One recorded directory mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutatorCall {
    Delete(String),
    Block(String),
    Patch { user_id: String, email: String },
}

/// Records mutations instead of performing them
#[derive(Default)]
pub struct RecordingMutator {
    calls: Mutex<Vec<MutatorCall>>,
    fail_with_status: Option<u16>,
}

impl RecordingMutator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mutator that records the call and then fails with the given status
    #[must_use]
    pub fn failing(status: u16) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with_status: Some(status),
        }
    }

    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    #[must_use]
    pub fn calls(&self) -> Vec<MutatorCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MutatorCall, operation: &'static str) -> Result<(), DirectoryError> {
        self.calls
            .lock()
            .map_err(|_| DirectoryError::Request("poisoned".to_string()))?
            .push(call);

        match self.fail_with_status {
            Some(status) => Err(DirectoryError::Status {
                operation,
                status,
                body: "stubbed failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AccountMutator for RecordingMutator {
    async fn delete_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        self.record(MutatorCall::Delete(user_id.to_string()), "delete")
    }

    async fn block_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        self.record(MutatorCall::Block(user_id.to_string()), "block")
    }

    async fn patch_user(&self, user_id: &UserIdentifier, email: &str) -> Result<(), DirectoryError> {
        self.record(
            MutatorCall::Patch {
                user_id: user_id.to_string(),
                email: email.to_string(),
            },
            "patch",
        )
    }
}
