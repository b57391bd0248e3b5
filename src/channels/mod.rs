pub mod bridge;
pub mod traits;

pub use bridge::BridgeClient;
pub use traits::{MediaPayload, OutgoingMessage, StatusClient, BROADCAST_TARGET};
