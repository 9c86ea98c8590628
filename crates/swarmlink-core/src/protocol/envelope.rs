//! Transport wire envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JSON envelope carried over the transport connection.
///
/// The first outbound envelope after every (re)connect is always an `auth`
/// envelope; servers may drop anything received before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope ID
    pub id: String,
    /// Envelope kind (`auth`, `message`, `event`, ...)
    pub kind: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Create an envelope with a fresh id and timestamp.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The authentication envelope sent first on every connect.
    #[must_use]
    pub fn auth(token: impl Into<String>) -> Self {
        Self::new("auth", serde_json::json!({ "token": token.into() }))
    }

    /// Whether this is an auth envelope.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == "auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_envelope() {
        let env = Envelope::auth("secret");
        assert!(env.is_auth());
        assert_eq!(env.payload["token"], "secret");
    }

    #[test]
    fn test_round_trips_as_json() {
        let env = Envelope::new("message", serde_json::json!({"body": 1}));
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, env.id);
        assert_eq!(back.kind, "message");
    }
}
