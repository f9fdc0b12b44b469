//! The single source of truth for the notification list and unread count.
//!
//! Owned by the dispatcher/app layer on the main task; internal locking
//! keeps the API `&self`. The unread count is always recomputable as the
//! number of unread entries, and is reconciled against the list after every
//! bulk load.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use snackshop_shared::api::NotificationFilter;
use snackshop_shared::schemas::Notification;
use snackshop_shared::utils::epoch_ms;

use crate::api::NotificationBackend;
use crate::sink::AlertSink;

/// Bounded exponential backoff for bulk loads. Connectivity hiccups retry a
/// few times and then give up silently; they never block the rest of the UI.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): 2s, 4s, 8s with the default
    /// base.
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

struct StoreState {
    notifications: Vec<Notification>,
    unread_count: u64,
    loading: bool,
}

pub struct NotificationStore {
    backend: Arc<dyn NotificationBackend>,
    retry: RetryPolicy,
    inner: RwLock<StoreState>,
}

impl NotificationStore {
    pub fn new(backend: Arc<dyn NotificationBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            inner: RwLock::new(StoreState {
                notifications: Vec::new(),
                unread_count: 0,
                loading: false,
            }),
        }
    }

    /// Snapshot of the list, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.read().unwrap().notifications.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.inner.read().unwrap().unread_count
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().unwrap().loading
    }

    /// Prepend a realtime notification and bump the unread count.
    ///
    /// Identifiers are unique within the held set: a known id is ignored
    /// (this backstops the dispatcher's time-windowed dedup) and `None` is
    /// returned so the caller skips side effects. On append, returns the new
    /// unread count.
    pub fn apply_incoming(&self, notification: Notification) -> Option<u64> {
        let mut state = self.inner.write().unwrap();
        if state
            .notifications
            .iter()
            .any(|n| n.id == notification.id)
        {
            debug!(id = %notification.id, "notification already held, ignoring");
            return None;
        }
        if !notification.read {
            state.unread_count += 1;
        }
        state.notifications.insert(0, notification);
        Some(state.unread_count)
    }

    /// Replace the list from the server, retrying with bounded exponential
    /// backoff. Gives up silently: previous state stays intact and `false`
    /// is returned.
    pub async fn load_all(&self, filter: &NotificationFilter) -> bool {
        self.inner.write().unwrap().loading = true;

        let mut attempt: u32 = 0;
        let loaded = loop {
            match self.backend.fetch_notifications(filter).await {
                Ok(page) => {
                    let recount = page
                        .notifications
                        .iter()
                        .filter(|n| !n.read)
                        .count() as u64;
                    if recount != page.unread_count {
                        debug!(
                            listed = recount,
                            hinted = page.unread_count,
                            "unread hint disagrees with list, using recount"
                        );
                    }
                    let mut state = self.inner.write().unwrap();
                    state.notifications = page.notifications;
                    state.unread_count = recount;
                    break true;
                }
                Err(e) => {
                    if attempt >= self.retry.max_retries {
                        warn!(error = %e, attempts = attempt + 1, "giving up on notification load");
                        break false;
                    }
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "notification load failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        self.inner.write().unwrap().loading = false;
        loaded
    }

    /// Optimistically mark one notification read.
    ///
    /// The local flip and unread decrement happen immediately; the server
    /// confirmation runs after, and a failure is logged without reverting
    /// (local consistency over strict server agreement). Returns `false`
    /// when the id is unknown or already read.
    pub async fn mark_read(&self, id: &str, sink: &dyn AlertSink) -> bool {
        let new_count = {
            let mut state = self.inner.write().unwrap();
            let Some(entry) = state.notifications.iter_mut().find(|n| n.id == id) else {
                return false;
            };
            if entry.read {
                return false;
            }
            entry.read = true;
            entry.read_at = Some(epoch_ms());
            state.unread_count = state.unread_count.saturating_sub(1);
            state.unread_count
        };

        if let Err(e) = sink.set_badge(new_count).await {
            debug!(error = %e, "badge update failed");
        }

        if let Err(e) = self.backend.mark_read(id).await {
            warn!(id, error = %e, "server mark-read failed, keeping local state");
        }
        true
    }

    /// Mark every notification read, only after the server confirms.
    ///
    /// Unlike single-item marking this is not optimistic: the badge must not
    /// be cleared before the server has recorded the bulk read. On failure
    /// local state is unchanged and `false` is returned.
    pub async fn mark_all_read(&self, sink: &dyn AlertSink) -> bool {
        if let Err(e) = self.backend.mark_all_read().await {
            warn!(error = %e, "server mark-all-read failed, local state unchanged");
            return false;
        }

        {
            let mut state = self.inner.write().unwrap();
            let now = epoch_ms();
            for entry in &mut state.notifications {
                if !entry.read {
                    entry.read = true;
                    entry.read_at = Some(now);
                }
            }
            state.unread_count = 0;
        }

        if let Err(e) = sink.clear_badge().await {
            debug!(error = %e, "badge clear failed");
        }
        true
    }
}
