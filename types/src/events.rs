pub mod client;
pub mod server;

pub use client::*;
pub use server::*;

use crate::session::Setup;

/// Messages sent from the client to the endpoint.
///
/// Each message is a single-key object, e.g. `{"setup": {...}}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    Setup(Setup),
    RealtimeInput(RealtimeInputEvent),
    ClientContent(ClientContentEvent),
}

/// Messages sent from the endpoint to the client.
///
/// Unlike client messages, one server message may carry several fields at
/// once (e.g. `serverContent` alongside `usageMetadata`).
pub type ServerEvent = ServerMessage;
