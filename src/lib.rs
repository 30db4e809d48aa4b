#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the revokrs application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod apple;
pub mod directory;
pub mod dispatch;
pub mod handlers;
pub mod service;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use apple::{KeyProvider, TokenVerifier, VerifiedClaims};
pub use directory::{AccountMutator, UserIdentifier};
pub use dispatch::{DispatchResult, EventDispatcher};
pub use handlers::configure_routes;
pub use service::{NotificationError, NotificationService};
pub use settings::RevokrsSettings;
