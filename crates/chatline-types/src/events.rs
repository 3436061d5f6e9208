use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the handshake token was accepted
    Ready {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },

    /// Full set of currently online user ids
    OnlineUsersChanged(Vec<Uuid>),

    /// A message addressed to this connection's user was stored
    NewMessage(Message),
}
