//! REST API envelope and notification endpoint types.

use serde::{Deserialize, Serialize};

use crate::schemas::Notification;

/// Standard storefront API envelope: `{success, message?, data?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload of a successful envelope.
    pub fn into_data(self) -> Result<T, String> {
        if !self.success {
            return Err(self
                .message
                .unwrap_or_else(|| "request was not successful".into()));
        }
        self.data.ok_or_else(|| "missing data in response".into())
    }
}

/// Payload of `GET /notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Server-side unread total. Advisory; the store recounts from the list.
    #[serde(default)]
    pub unread_count: u64,
}

/// Query filter for `GET /notifications`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl NotificationFilter {
    /// Render as a query string, empty when no fields are set.
    pub fn to_query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(unread_only) = self.unread_only {
            parts.push(format!("unreadOnly={unread_only}"));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={limit}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_success_unwraps_data() {
        let env: ApiEnvelope<NotificationPage> = serde_json::from_value(json!({
            "success": true,
            "data": {
                "notifications": [{"id": "n1", "title": "t"}],
                "unreadCount": 1
            }
        }))
        .unwrap();
        let page = env.into_data().unwrap();
        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.unread_count, 1);
    }

    #[test]
    fn envelope_failure_carries_message() {
        let env: ApiEnvelope<NotificationPage> = serde_json::from_value(json!({
            "success": false,
            "message": "You are offline. Please check your internet connection.",
            "offline": true
        }))
        .unwrap();
        let err = env.into_data().unwrap_err();
        assert!(err.contains("offline"));
    }

    #[test]
    fn filter_query_rendering() {
        assert_eq!(NotificationFilter::default().to_query(), "");
        let filter = NotificationFilter {
            unread_only: Some(true),
            limit: Some(20),
        };
        assert_eq!(filter.to_query(), "?unreadOnly=true&limit=20");
    }
}
