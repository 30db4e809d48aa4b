//! Testing utilities for revokrs
//!
//! - [`fixtures`] - Test signing keys, key sets and a notification token builder
//! - [`mock`] - Counting key source and recording directory mutator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use revokrs::testing::{fixtures::NotificationTokenBuilder, test_service};
//!
//! let (service, jwks, directory) = test_service();
//! let token = NotificationTokenBuilder::new()
//!     .event("consent-revoked", "000123.abc", None)
//!     .build();
//! ```

pub mod fixtures;
pub mod mock;

use std::sync::Arc;

use crate::apple::{JwksSource, KeyProvider, TokenVerifier};
use crate::directory::AccountMutator;
use crate::dispatch::EventDispatcher;
use crate::service::NotificationService;

pub use fixtures::NotificationTokenBuilder;
pub use mock::{CountingJwksSource, MutatorCall, RecordingMutator};

/// Connection label used by [`test_service`]
pub const TEST_CONNECTION: &str = "apple";

/// Notification service wired to the test key set and a recording directory
#[must_use]
pub fn test_service() -> (
    NotificationService,
    Arc<CountingJwksSource>,
    Arc<RecordingMutator>,
) {
    let directory = Arc::new(RecordingMutator::new());
    let (service, jwks) = test_service_with(Arc::clone(&directory) as Arc<dyn AccountMutator>);
    (service, jwks, directory)
}

/// Notification service wired to the test key set and the given directory
#[must_use]
pub fn test_service_with(
    directory: Arc<dyn AccountMutator>,
) -> (NotificationService, Arc<CountingJwksSource>) {
    let jwks = Arc::new(CountingJwksSource::new(fixtures::test_jwks()));
    let keys = KeyProvider::new(Arc::clone(&jwks) as Arc<dyn JwksSource>);
    let service = NotificationService::new(
        TokenVerifier::new(keys),
        EventDispatcher::new(directory),
        fixtures::TEST_BUNDLE_ID,
        TEST_CONNECTION,
    );
    (service, jwks)
}
