//! Converts inbound realtime events into store mutations exactly once.
//!
//! Realtime transports redeliver: reconnect replay, duplicate listener
//! registrations, multiple event names carrying the same payload. Two guards
//! keep that from reaching the user twice: an id-based dedup map with a
//! short expiry window, and a cooldown on the audible/visible alerts so a
//! burst never stacks sounds. Neither is a durable idempotency guarantee.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use snackshop_shared::schemas::{Notification, extract_notification};

use crate::sink::AlertSink;
use crate::store::NotificationStore;

const DEDUP_WINDOW: Duration = Duration::from_secs(5);
const ALERT_COOLDOWN: Duration = Duration::from_secs(3);
const DEDUP_CAPACITY: usize = 256;

struct DispatchState {
    /// Recently processed ids and when they were recorded.
    recently_seen: HashMap<String, Instant>,
    last_alert: Option<Instant>,
}

/// One dispatcher instance exists per runtime session; its dedup state is
/// private and single-owner.
pub struct NotificationDispatcher {
    store: Arc<NotificationStore>,
    sink: Arc<dyn AlertSink>,
    state: StdMutex<DispatchState>,
    dedup_window: Duration,
    alert_cooldown: Duration,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<NotificationStore>, sink: Arc<dyn AlertSink>) -> Self {
        Self::with_windows(store, sink, DEDUP_WINDOW, ALERT_COOLDOWN)
    }

    pub fn with_windows(
        store: Arc<NotificationStore>,
        sink: Arc<dyn AlertSink>,
        dedup_window: Duration,
        alert_cooldown: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            state: StdMutex::new(DispatchState {
                recently_seen: HashMap::new(),
                last_alert: None,
            }),
            dedup_window,
            alert_cooldown,
        }
    }

    /// Process one inbound event payload.
    ///
    /// Payloads with no identifiable notification are dropped silently. The
    /// notification id is recorded before any asynchronous side effect, so a
    /// redelivery arriving during an await gap cannot double-process.
    pub async fn handle_inbound(&self, payload: &Value) {
        let Some(inbound) = extract_notification(payload) else {
            debug!("inbound payload carries no notification, dropping");
            return;
        };

        if self.already_processed(&inbound.notification.id) {
            debug!(id = %inbound.notification.id, "duplicate delivery, dropping");
            return;
        }

        if let Some(hint) = inbound.unread_hint {
            debug!(hint, "inbound event carried an unread hint");
        }

        self.apply(inbound.notification).await;
    }

    /// Append to the store and fire the gated side effects.
    pub async fn apply(&self, notification: Notification) {
        let Some(unread) = self.store.apply_incoming(notification.clone()) else {
            return;
        };

        // In-app announcement and badge are not cooldown-gated; the badge
        // always tracks the unread total.
        if let Err(e) = self.sink.announce(&notification).await {
            debug!(error = %e, "announce failed");
        }
        if let Err(e) = self.sink.set_badge(unread).await {
            debug!(error = %e, "badge update failed");
        }

        if !self.take_alert_slot() {
            return;
        }
        // Audio or display failures degrade silently; the store mutation
        // above already stands.
        if let Err(e) = self.sink.play_chime().await {
            debug!(error = %e, "chime unavailable");
        }
        if let Err(e) = self.sink.show_notification(&notification).await {
            debug!(error = %e, "system notification unavailable");
        }
    }

    /// Record the id, evicting expired entries and the oldest beyond the
    /// size cap. Returns true when the id was already present.
    fn already_processed(&self, id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let window = self.dedup_window;
        state
            .recently_seen
            .retain(|_, seen_at| now.duration_since(*seen_at) < window);

        if state.recently_seen.contains_key(id) {
            return true;
        }

        if state.recently_seen.len() >= DEDUP_CAPACITY {
            let oldest = state
                .recently_seen
                .iter()
                .min_by_key(|(_, seen_at)| **seen_at)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                state.recently_seen.remove(&oldest);
            }
        }
        state.recently_seen.insert(id.to_string(), now);
        false
    }

    /// One alert per cooldown window across all notifications.
    fn take_alert_slot(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        match state.last_alert {
            Some(last) if now.duration_since(last) < self.alert_cooldown => false,
            _ => {
                state.last_alert = Some(now);
                true
            }
        }
    }

    /// Spawn the event pump: handlers push raw payloads into the returned
    /// sender and the dispatcher processes them one at a time, in arrival
    /// order.
    pub fn spawn_pump(self: &Arc<Self>) -> mpsc::UnboundedSender<Value> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let dispatcher = self.clone();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                dispatcher.handle_inbound(&payload).await;
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RetryPolicy;
    use crate::test_support::{RecordingSink, ScriptedBackend};
    use serde_json::json;

    fn dispatcher(
        dedup_window: Duration,
        cooldown: Duration,
    ) -> (Arc<NotificationDispatcher>, Arc<NotificationStore>, Arc<RecordingSink>) {
        let backend = Arc::new(ScriptedBackend::default());
        let store = Arc::new(NotificationStore::new(backend, RetryPolicy::default()));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(NotificationDispatcher::with_windows(
            store.clone(),
            sink.clone(),
            dedup_window,
            cooldown,
        ));
        (dispatcher, store, sink)
    }

    #[tokio::test]
    async fn duplicate_ids_within_window_append_once() {
        let (dispatcher, store, sink) =
            dispatcher(Duration::from_secs(5), Duration::from_secs(3));

        let payload = json!({"id": "n1", "title": "Order shipped"});
        dispatcher.handle_inbound(&payload).await;
        dispatcher.handle_inbound(&payload).await;

        assert_eq!(store.notifications().len(), 1);
        assert_eq!(store.unread_count(), 1);
        assert_eq!(sink.count_of("chime"), 1);
        assert_eq!(sink.count_of("show:"), 1);
        assert_eq!(sink.count_of("announce:"), 1);
    }

    #[tokio::test]
    async fn wrapped_and_bare_shapes_hit_the_same_dedup() {
        let (dispatcher, store, _sink) =
            dispatcher(Duration::from_secs(5), Duration::from_secs(3));

        dispatcher
            .handle_inbound(&json!({"notification": {"id": "n1", "title": "t"}, "unreadCount": 1}))
            .await;
        dispatcher.handle_inbound(&json!({"id": "n1", "title": "t"})).await;

        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn burst_of_distinct_ids_alerts_once_but_stores_all() {
        let (dispatcher, store, sink) =
            dispatcher(Duration::from_secs(5), Duration::from_secs(3));

        for i in 0..4 {
            dispatcher
                .handle_inbound(&json!({"id": format!("n{i}"), "title": "t"}))
                .await;
        }

        assert_eq!(store.notifications().len(), 4);
        assert_eq!(store.unread_count(), 4);
        // One chime for the burst; the badge still tracked every append.
        assert_eq!(sink.count_of("chime"), 1);
        assert_eq!(sink.count_of("show:"), 1);
        assert_eq!(sink.count_of("badge:"), 4);
        assert!(sink.effects().contains(&"badge:4".to_string()));
    }

    #[tokio::test]
    async fn alerts_resume_after_the_cooldown() {
        let (dispatcher, _store, sink) =
            dispatcher(Duration::from_millis(1), Duration::from_millis(5));

        dispatcher.handle_inbound(&json!({"id": "n1", "title": "t"})).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.handle_inbound(&json!({"id": "n2", "title": "t"})).await;

        assert_eq!(sink.count_of("chime"), 2);
    }

    #[tokio::test]
    async fn redelivery_after_window_expiry_still_appends_once() {
        let (dispatcher, store, sink) =
            dispatcher(Duration::from_millis(1), Duration::from_millis(1));

        let payload = json!({"id": "n1", "title": "t"});
        dispatcher.handle_inbound(&payload).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Dedup entry expired, but the store still holds the id: no second
        // append, no second alert.
        dispatcher.handle_inbound(&payload).await;

        assert_eq!(store.notifications().len(), 1);
        assert_eq!(sink.count_of("chime"), 1);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_without_effects() {
        let (dispatcher, store, sink) =
            dispatcher(Duration::from_secs(5), Duration::from_secs(3));

        dispatcher.handle_inbound(&json!({"title": "no id"})).await;
        dispatcher.handle_inbound(&json!("not an object")).await;
        dispatcher.handle_inbound(&Value::Null).await;

        assert!(store.notifications().is_empty());
        assert!(sink.effects().is_empty());
    }

    #[tokio::test]
    async fn pump_processes_payloads_in_arrival_order() {
        let (dispatcher, store, _sink) =
            dispatcher(Duration::from_secs(5), Duration::from_secs(3));

        let tx = dispatcher.spawn_pump();
        tx.send(json!({"id": "n1", "title": "t"})).unwrap();
        tx.send(json!({"id": "n1", "title": "t"})).unwrap();
        tx.send(json!({"id": "n2", "title": "t"})).unwrap();

        // Let the pump drain.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let held = store.notifications();
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].id, "n2");
    }
}
