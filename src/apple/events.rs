//! Apple server-to-server event payloads
//!
//! The `events` claim of a verified notification carries one JSON-encoded event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Kind of account event Apple reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppleEventKind {
    /// The user deleted their Apple account
    AccountDelete,
    /// The user stopped using Sign in with Apple for this app
    ConsentRevoked,
    /// The user stopped receiving mail through the private relay
    EmailDisabled,
    /// The user resumed receiving mail through the private relay
    EmailEnabled,
    Unknown(String),
}

impl AppleEventKind {
    /// Exact, case-sensitive match against Apple's type strings
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "account-delete" => Self::AccountDelete,
            "consent-revoked" => Self::ConsentRevoked,
            "email-disabled" => Self::EmailDisabled,
            "email-enabled" => Self::EmailEnabled,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AccountDelete => "account-delete",
            Self::ConsentRevoked => "consent-revoked",
            Self::EmailDisabled => "email-disabled",
            Self::EmailEnabled => "email-enabled",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for AppleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apple sends `is_private_email` as either a boolean or a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Str(String),
}

#[derive(Debug, Deserialize)]
struct RawAppleEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    sub: String,
    email: Option<String>,
    is_private_email: Option<BoolOrString>,
    event_time: Option<i64>,
}

/// A parsed account event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleEvent {
    pub kind: AppleEventKind,
    /// The `type` string exactly as received; `None` when absent
    pub raw_type: Option<String>,
    /// Apple's stable user identifier for this team
    pub sub: String,
    pub email: Option<String>,
    pub is_private_email: Option<bool>,
    /// Milliseconds since the epoch
    pub event_time: Option<i64>,
}

impl AppleEvent {
    /// Parse the nested event JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object with a string `sub`
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        let raw: RawAppleEvent = serde_json::from_str(payload)?;

        let is_private_email = match raw.is_private_email {
            Some(BoolOrString::Bool(value)) => Some(value),
            Some(BoolOrString::Str(value)) => value.parse().ok(),
            None => None,
        };

        Ok(Self {
            kind: AppleEventKind::parse(raw.event_type.as_deref().unwrap_or_default()),
            raw_type: raw.event_type,
            sub: raw.sub,
            email: raw.email,
            is_private_email,
            event_time: raw.event_time,
        })
    }

    /// When Apple says the event happened; `None` if absent or out of range
    #[must_use]
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.event_time.and_then(DateTime::from_timestamp_millis)
    }
}
