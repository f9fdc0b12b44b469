//! Push messages delivered while the app is not in the foreground.
//!
//! A push payload is ideally the same shape as a realtime event, but the
//! push path tolerates looser input: a bare string becomes a generic
//! notification, an object without an id gets a synthesized one. Everything
//! funnels into the dispatcher pipeline.

use serde_json::Value;
use tracing::debug;

use snackshop_shared::schemas::{Notification, NotificationKind, extract_notification};
use snackshop_shared::utils::epoch_ms;

use crate::dispatcher::NotificationDispatcher;

const DEFAULT_TITLE: &str = "SnackShop";

/// Feed one received push message through the notification pipeline.
pub async fn handle_push_message(dispatcher: &NotificationDispatcher, payload: &Value) {
    if extract_notification(payload).is_some() {
        dispatcher.handle_inbound(payload).await;
        return;
    }

    let Some(notification) = synthesize(payload) else {
        debug!("push payload not usable, dropping");
        return;
    };
    dispatcher.apply(notification).await;
}

/// Build a generic notification from a loose push payload.
fn synthesize(payload: &Value) -> Option<Notification> {
    let (title, message) = match payload {
        Value::String(text) if !text.is_empty() => (DEFAULT_TITLE.to_string(), text.clone()),
        Value::Object(obj) => {
            let title = obj
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_TITLE)
                .to_string();
            let message = obj
                .get("body")
                .or_else(|| obj.get("message"))
                .and_then(|v| v.as_str())?
                .to_string();
            (title, message)
        }
        _ => return None,
    };

    Some(Notification {
        id: uuid::Uuid::new_v4().to_string(),
        kind: NotificationKind::Generic,
        title,
        message,
        read: false,
        created_at: epoch_ms(),
        read_at: None,
        link: payload
            .get("url")
            .and_then(|v| v.as_str())
            .map(String::from),
        data: None,
    })
}
