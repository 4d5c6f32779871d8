//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aura_shared::types::{MessageId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "image" => MessageKind::Image,
            _ => MessageKind::Text,
        }
    }
}

/// Delivery progression: single grey tick once the relay stored the
/// message, double tick once it reached the recipient, read once the
/// recipient opened the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "delivered" => DeliveryStatus::Delivered,
            "read" => DeliveryStatus::Read,
            _ => DeliveryStatus::Sent,
        }
    }
}

/// A single chat message between two peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// Data URL carried by image messages.
    pub media_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    pub fn text(sender: UserId, receiver: UserId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            sender,
            receiver,
            content: content.into(),
            kind: MessageKind::Text,
            media_url: None,
            sent_at: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    pub fn image(
        sender: UserId,
        receiver: UserId,
        content: impl Into<String>,
        media_url: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Image,
            media_url: Some(media_url.into()),
            ..Self::text(sender, receiver, content)
        }
    }
}
