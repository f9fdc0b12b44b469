//! Events exchanged with the platform shell hosting the runtime.
//!
//! The runtime never touches platform surfaces (system notification tray,
//! audio output, badge, window lifecycle) directly. It emits [`ShellEvent`]s
//! for the shell to render and consumes [`PlatformSignal`]s the shell
//! forwards from the platform.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::notification::Notification;

/// Outbound: what the runtime asks the shell to show or do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ShellEvent {
    /// A new notification landed in the store (for in-app lists/toasts).
    #[serde(rename = "notification-received")]
    NotificationReceived { notification: Notification },
    /// Play the short notification chime.
    #[serde(rename = "play-chime")]
    PlayChime,
    /// Show a system-level notification.
    #[serde(rename = "show-system-notification")]
    ShowSystemNotification {
        title: String,
        body: String,
        /// Coalescing tag, `notification-{id}`.
        tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    /// Set the app-icon badge to the current unread total.
    #[serde(rename = "set-badge")]
    SetBadge { count: u64 },
    #[serde(rename = "clear-badge")]
    ClearBadge,
    /// Connectivity flipped; drives the offline banner.
    #[serde(rename = "connectivity-changed")]
    ConnectivityChanged { online: bool },
    /// A new resource generation finished installing behind the active one.
    #[serde(rename = "update-available")]
    UpdateAvailable { version: String },
    /// The install prompt became available or was consumed.
    #[serde(rename = "installable-changed")]
    InstallableChanged { installable: bool },
    /// The waiting generation took over; the shell should reload the page.
    #[serde(rename = "reload-requested")]
    ReloadRequested,
    /// Navigate to a deep link (notification click-through).
    #[serde(rename = "navigate")]
    Navigate { url: String },
    /// Replay a captured install invitation to the user.
    #[serde(rename = "present-install-prompt")]
    PresentInstallPrompt { prompt: PromptHandle },
}

/// Inbound: platform events the shell forwards to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlatformSignal {
    /// The platform offered an install invitation; the handle is single-use.
    #[serde(rename = "install-prompt-available")]
    InstallPromptAvailable { prompt: PromptHandle },
    #[serde(rename = "app-installed")]
    AppInstalled,
    /// Result of a standalone display-mode query at startup.
    #[serde(rename = "display-mode")]
    DisplayMode { standalone: bool },
    /// A new generation took control of the page.
    #[serde(rename = "controller-changed")]
    ControllerChanged,
    /// Raw push message delivered while the app was not focused.
    #[serde(rename = "push-message")]
    PushMessage { payload: Value },
    /// The user clicked a shown system notification.
    #[serde(rename = "notification-clicked")]
    NotificationClicked {
        tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    #[serde(rename = "connectivity-changed")]
    ConnectivityChanged { online: bool },
    /// The user answered (or the platform changed) the notification
    /// permission.
    #[serde(rename = "permission-changed")]
    PermissionChanged { state: PermissionState },
}

/// Captured install invitation. Opaque to the runtime; the shell resolves it
/// back to the real platform handle when presenting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptHandle {
    pub id: String,
}

/// Outcome of presenting an install prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// System notification permission as reported by the shell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not yet asked.
    Prompt,
}

impl PermissionState {
    pub fn can_show(self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shell_event_tagged_roundtrip() {
        let event = ShellEvent::SetBadge { count: 4 };
        let s = serde_json::to_string(&event).unwrap();
        assert!(s.contains("set-badge"));
        let back: ShellEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn platform_signal_roundtrip() {
        let signal = PlatformSignal::InstallPromptAvailable {
            prompt: PromptHandle { id: "p1".into() },
        };
        let s = serde_json::to_string(&signal).unwrap();
        let back: PlatformSignal = serde_json::from_str(&s).unwrap();
        assert_eq!(signal, back);

        let push = PlatformSignal::PushMessage {
            payload: json!({"id": "n1", "title": "t"}),
        };
        let s = serde_json::to_string(&push).unwrap();
        let back: PlatformSignal = serde_json::from_str(&s).unwrap();
        assert_eq!(push, back);
    }

    #[test]
    fn permission_gating() {
        assert!(PermissionState::Granted.can_show());
        assert!(!PermissionState::Denied.can_show());
        assert!(!PermissionState::Prompt.can_show());
    }
}
