//! The bridge between the runtime and the platform shell.
//!
//! The shell (the embedding page/window layer) subscribes to [`ShellEvent`]s
//! and forwards [`PlatformSignal`]s inward. Connectivity transitions are
//! de-bounced here so the offline banner only flips on real changes.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

use snackshop_shared::schemas::ShellEvent;

const SHELL_EVENT_CAPACITY: usize = 64;

/// Shared handle for emitting shell events.
#[derive(Clone)]
pub struct ShellPublisher {
    tx: broadcast::Sender<ShellEvent>,
}

impl ShellPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SHELL_EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<ShellEvent> {
        self.tx.clone()
    }

    /// Best-effort emit; a missing listener is not an error.
    pub fn emit(&self, event: ShellEvent) {
        if self.tx.send(event).is_err() {
            debug!("no shell listener for event");
        }
    }
}

impl Default for ShellPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks online/offline and emits one event per transition.
pub struct ConnectivityTracker {
    online: AtomicBool,
    publisher: ShellPublisher,
}

impl ConnectivityTracker {
    pub fn new(publisher: ShellPublisher) -> Self {
        Self {
            online: AtomicBool::new(true),
            publisher,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Record a connectivity observation; emits only when the flag flips.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::Relaxed);
        if previous != online {
            info!(online, "connectivity changed");
            self.publisher.emit(ShellEvent::ConnectivityChanged { online });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connectivity_emits_only_on_transitions() {
        let publisher = ShellPublisher::new();
        let mut rx = publisher.subscribe();
        let tracker = ConnectivityTracker::new(publisher);

        assert!(tracker.is_online());
        tracker.set_online(true); // no transition
        tracker.set_online(false);
        tracker.set_online(false); // no transition
        tracker.set_online(true);

        assert_eq!(
            rx.try_recv().unwrap(),
            ShellEvent::ConnectivityChanged { online: false }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ShellEvent::ConnectivityChanged { online: true }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_without_listener_is_fine() {
        let publisher = ShellPublisher::new();
        publisher.emit(ShellEvent::ReloadRequested);
    }
}
