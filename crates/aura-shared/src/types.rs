use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

// Peer identity = opaque string chosen at registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log output.
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }

    /// Whether this is the built-in assistant contact.
    pub fn is_assistant(&self) -> bool {
        self.0 == crate::constants::ASSISTANT_USER_ID
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message identifier in the `PKT-XXXXXXXXX` scheme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();
        Self(format!("PKT-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Offline,
}

/// A known peer identity. Created on registration, updated on presence
/// change, never deleted (soft-offline only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: UserId,
    pub username: String,
    /// Avatar reference (URL or content hash), opaque to the core.
    pub avatar: String,
    pub status: PeerStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Peer {
    pub fn new(id: UserId, username: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: avatar.into(),
            status: PeerStatus::Offline,
            last_seen: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == PeerStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_scheme() {
        let id = MessageId::generate();
        assert!(id.0.starts_with("PKT-"));
        assert_eq!(id.0.len(), 13);
        assert!(id.0[4..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_user_id_short() {
        let id = UserId::new("a-very-long-identifier");
        assert_eq!(id.short(), "a-very-l");

        let tiny = UserId::new("u1");
        assert_eq!(tiny.short(), "u1");
    }
}
