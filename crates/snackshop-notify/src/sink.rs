//! Side-effect seam for notification delivery.
//!
//! The dispatcher never touches platform surfaces directly; it calls an
//! [`AlertSink`]. The shell implementation forwards to the shell event
//! channel, gated on notification permission and badge availability. A
//! denied permission or missing surface skips the effect silently while
//! the store mutation stands.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use snackshop_shared::schemas::{Notification, PermissionState, ShellEvent};

/// Trait for notification side-effect surfaces.
///
/// Uses `Pin<Box<dyn Future>>` return types for object safety, enabling
/// `dyn AlertSink` behind the dispatcher.
pub trait AlertSink: Send + Sync {
    /// In-app announcement (list/toast), always delivered.
    fn announce<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Short audio cue.
    fn play_chime<'a>(&'a self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// System-level notification display.
    fn show_notification<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Set the app-icon badge to the unread total.
    fn set_badge<'a>(
        &'a self,
        count: u64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    fn clear_badge<'a>(&'a self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Sink that forwards alerts to the platform shell over the shell event
/// channel.
pub struct ShellAlertSink {
    events: broadcast::Sender<ShellEvent>,
    permission: RwLock<PermissionState>,
    badge_available: bool,
}

impl ShellAlertSink {
    pub fn new(events: broadcast::Sender<ShellEvent>, badge_available: bool) -> Self {
        Self {
            events,
            permission: RwLock::new(PermissionState::Prompt),
            badge_available,
        }
    }

    /// Record the permission the shell reported.
    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.write().unwrap() = state;
    }

    pub fn permission(&self) -> PermissionState {
        *self.permission.read().unwrap()
    }

    fn send(&self, event: ShellEvent) -> anyhow::Result<()> {
        // A send error only means nobody is listening; alerts are
        // best-effort.
        if self.events.send(event).is_err() {
            debug!("no shell listener for alert event");
        }
        Ok(())
    }
}

impl AlertSink for ShellAlertSink {
    fn announce<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.send(ShellEvent::NotificationReceived {
                notification: notification.clone(),
            })
        })
    }

    fn play_chime<'a>(&'a self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move { self.send(ShellEvent::PlayChime) })
    }

    fn show_notification<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.permission().can_show() {
                debug!("notification permission not granted, skipping display");
                return Ok(());
            }
            self.send(ShellEvent::ShowSystemNotification {
                title: notification.title.clone(),
                body: notification.message.clone(),
                tag: format!("notification-{}", notification.id),
                link: notification.link.clone(),
            })
        })
    }

    fn set_badge<'a>(
        &'a self,
        count: u64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.badge_available {
                return Ok(());
            }
            self.send(ShellEvent::SetBadge { count })
        })
    }

    fn clear_badge<'a>(&'a self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.badge_available {
                return Ok(());
            }
            self.send(ShellEvent::ClearBadge)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snackshop_shared::schemas::NotificationKind;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.into(),
            kind: NotificationKind::Generic,
            title: "t".into(),
            message: "m".into(),
            read: false,
            created_at: 0,
            read_at: None,
            link: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn display_is_gated_on_permission() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = ShellAlertSink::new(tx, true);

        // Default permission is Prompt: nothing is shown, no error.
        sink.show_notification(&notification("n1")).await.unwrap();
        assert!(rx.try_recv().is_err());

        sink.set_permission(PermissionState::Granted);
        sink.show_notification(&notification("n1")).await.unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            ShellEvent::ShowSystemNotification { .. }
        ));

        sink.set_permission(PermissionState::Denied);
        sink.show_notification(&notification("n1")).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn badge_is_skipped_when_unavailable() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = ShellAlertSink::new(tx, false);
        sink.set_badge(3).await.unwrap();
        sink.clear_badge().await.unwrap();
        assert!(rx.try_recv().is_err());

        let (tx, mut rx) = broadcast::channel(8);
        let sink = ShellAlertSink::new(tx, true);
        sink.set_badge(3).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ShellEvent::SetBadge { count: 3 });
    }

    #[tokio::test]
    async fn send_without_listener_degrades_silently() {
        let (tx, _) = broadcast::channel(8);
        let sink = ShellAlertSink::new(tx, true);
        // No receiver subscribed; still Ok.
        sink.play_chime().await.unwrap();
        sink.announce(&notification("n1")).await.unwrap();
    }
}
