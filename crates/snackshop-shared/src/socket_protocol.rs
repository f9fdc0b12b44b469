//! WebSocket message protocol for the storefront realtime channel.
//!
//! Request (with ack):  `{"id": "uuid", "event": "join-user-room", "data": {...}}`
//! Response (ack):      `{"id": "uuid", "event": "join-user-room:ack", "data": {...}}`
//! One-way event:       `{"event": "new-notification", "data": {...}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name the server uses to push notifications.
pub const EVENT_NEW_NOTIFICATION: &str = "new-notification";
/// Legacy event name some server revisions still emit for the same payload.
pub const EVENT_NOTIFICATION: &str = "notification";
/// Outbound event carrying a user id to enter that user's broadcast room.
pub const EVENT_JOIN_USER_ROOM: &str = "join-user-room";
/// Outbound event carrying a user id to leave that user's broadcast room.
pub const EVENT_LEAVE_USER_ROOM: &str = "leave-user-room";
/// Order status change events for open order views.
pub const EVENT_ORDER_UPDATE: &str = "order-update";

/// A socket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocketMessage {
    /// Present for request/response pairs (ack pattern).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event name. Ack responses use `"{event}:ack"`.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl SocketMessage {
    /// Create a one-way event (no ack expected).
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            event: event.into(),
            data,
        }
    }

    /// Create a request that expects an ack response.
    pub fn request(id: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            id: Some(id.into()),
            event: event.into(),
            data,
        }
    }

    /// Create an ack response for a given request.
    pub fn ack(id: impl Into<String>, event: &str, data: Value) -> Self {
        Self {
            id: Some(id.into()),
            event: format!("{event}:ack"),
            data,
        }
    }

    /// Check if this message is an ack response.
    pub fn is_ack(&self) -> bool {
        self.event.ends_with(":ack")
    }

    /// Decode one wire frame; `None` for anything that is not a valid
    /// envelope (such frames are ignored by the channel).
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn socket_message_event_roundtrip() {
        let msg = SocketMessage::event(EVENT_NEW_NOTIFICATION, json!({"id": "n1"}));
        let json_str = serde_json::to_string(&msg).unwrap();
        let back: SocketMessage = serde_json::from_str(&json_str).unwrap();
        assert_eq!(msg, back);
        assert!(msg.id.is_none());
    }

    #[test]
    fn parse_rejects_non_envelopes() {
        assert!(SocketMessage::parse("{\"event\": \"x\", \"data\": null}").is_some());
        assert!(SocketMessage::parse("{\"data\": 1}").is_none());
        assert!(SocketMessage::parse("not json").is_none());
    }

    #[test]
    fn socket_message_request_ack_roundtrip() {
        let req = SocketMessage::request("req-1", EVENT_JOIN_USER_ROOM, json!({"userId": "u1"}));
        assert!(!req.is_ack());

        let ack = SocketMessage::ack("req-1", EVENT_JOIN_USER_ROOM, json!({"ok": true}));
        assert!(ack.is_ack());
        assert_eq!(ack.event, "join-user-room:ack");

        let json_str = serde_json::to_string(&ack).unwrap();
        let back: SocketMessage = serde_json::from_str(&json_str).unwrap();
        assert_eq!(ack, back);
    }
}
