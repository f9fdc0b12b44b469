//! Notification schema and inbound payload normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a notification is about. Unknown kinds decode as `Generic` so a
/// server-side addition never drops events on older clients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderConfirmed,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    ProductAdded,
    StockLow,
    #[serde(other)]
    #[default]
    Generic,
}

/// A single event of interest to the signed-in user.
///
/// The server assigns ids; some API revisions serialize the id as `_id`,
/// so both spellings are accepted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "isRead")]
    pub read: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
    /// Deep-link target opened when the notification is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Structured payload (order id, product id, ...), passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A realtime payload normalized at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundNotification {
    pub notification: Notification,
    /// Server-side unread total, when the event carries one. Advisory only.
    pub unread_hint: Option<u64>,
}

/// Normalize a realtime event payload into a [`Notification`].
///
/// Handles two formats:
/// - Bare: the payload itself is the notification object
/// - Wrapped: `{notification: {...}, unreadCount: 3}`
///
/// Returns `None` when no identifiable notification is present (no object,
/// or no string id under `id`/`_id`).
pub fn extract_notification(payload: &Value) -> Option<InboundNotification> {
    let obj = payload.as_object()?;

    let (candidate, unread_hint) = match obj.get("notification") {
        Some(inner) if inner.is_object() => (inner, read_unread_hint(payload)),
        _ => (payload, None),
    };

    if !has_string_id(candidate) {
        return None;
    }

    let notification: Notification = serde_json::from_value(candidate.clone()).ok()?;
    Some(InboundNotification {
        notification,
        unread_hint,
    })
}

fn has_string_id(value: &Value) -> bool {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return false,
    };
    obj.get("id")
        .or_else(|| obj.get("_id"))
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty())
}

fn read_unread_hint(payload: &Value) -> Option<u64> {
    payload.get("unreadCount").and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_notification_payload() {
        let payload = json!({
            "id": "n1",
            "kind": "order-shipped",
            "title": "Order shipped",
            "message": "Your order #42 is on its way",
            "isRead": false,
            "createdAt": 1700000000000i64
        });
        let inbound = extract_notification(&payload).unwrap();
        assert_eq!(inbound.notification.id, "n1");
        assert_eq!(inbound.notification.kind, NotificationKind::OrderShipped);
        assert!(!inbound.notification.read);
        assert_eq!(inbound.unread_hint, None);
    }

    #[test]
    fn wrapped_notification_payload() {
        let payload = json!({
            "notification": {
                "_id": "n2",
                "kind": "product-added",
                "title": "New snack in stock"
            },
            "unreadCount": 7
        });
        let inbound = extract_notification(&payload).unwrap();
        assert_eq!(inbound.notification.id, "n2");
        assert_eq!(inbound.notification.kind, NotificationKind::ProductAdded);
        assert_eq!(inbound.unread_hint, Some(7));
    }

    #[test]
    fn mongo_style_id_alias() {
        let payload = json!({"_id": "n3", "title": "t"});
        let inbound = extract_notification(&payload).unwrap();
        assert_eq!(inbound.notification.id, "n3");
    }

    #[test]
    fn unknown_kind_decodes_as_generic() {
        let payload = json!({"id": "n4", "kind": "flash-sale", "title": "t"});
        let inbound = extract_notification(&payload).unwrap();
        assert_eq!(inbound.notification.kind, NotificationKind::Generic);
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(extract_notification(&json!({"title": "no id"})).is_none());
        assert!(extract_notification(&json!({"id": 42, "title": "numeric id"})).is_none());
        assert!(extract_notification(&json!({"id": "", "title": "empty id"})).is_none());
    }

    #[test]
    fn wrapped_without_id_is_rejected() {
        let payload = json!({"notification": {"title": "no id"}, "unreadCount": 1});
        assert!(extract_notification(&payload).is_none());
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert!(extract_notification(&json!("just a string")).is_none());
        assert!(extract_notification(&Value::Null).is_none());
        assert!(extract_notification(&json!([1, 2])).is_none());
    }

    #[test]
    fn notification_serde_roundtrip() {
        let n = Notification {
            id: "n5".into(),
            kind: NotificationKind::StockLow,
            title: "Running low".into(),
            message: "Only 2 left".into(),
            read: true,
            created_at: 1_700_000_000_000,
            read_at: Some(1_700_000_100_000),
            link: Some("/catalog/snake-treats".into()),
            data: Some(json!({"productId": "p9"})),
        };
        let s = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&s).unwrap();
        assert_eq!(n, back);
    }
}
