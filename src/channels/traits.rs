use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::SessionEvent;

/// Destination that posts to the account's status feed rather than a chat.
pub const BROADCAST_TARGET: &str = "status@broadcast";

/// Media ready for delivery: base64 body plus the metadata the client needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    pub data: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Media {
        media: MediaPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Text {
        body: String,
    },
}

/// The messaging client the gateway drives. It owns the wire protocol and
/// device pairing; the gateway only sees lifecycle events and send results.
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Human-readable client name
    fn name(&self) -> &str;

    /// Push lifecycle events into `tx` until the client stops.
    async fn listen(&self, tx: mpsc::Sender<SessionEvent>) -> anyhow::Result<()>;

    /// Deliver one message to `target`. Resolves once the client confirms it.
    async fn send_message(&self, target: &str, message: OutgoingMessage) -> anyhow::Result<()>;
}
