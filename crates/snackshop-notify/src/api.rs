//! HTTP client for the storefront notification endpoints.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Result, bail};

use snackshop_shared::api::{ApiEnvelope, NotificationFilter, NotificationPage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object-safe seam over the notification REST endpoints. The runtime uses
/// [`HttpNotificationApi`]; tests inject a scripted backend.
pub trait NotificationBackend: Send + Sync {
    fn fetch_notifications<'a>(
        &'a self,
        filter: &'a NotificationFilter,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationPage>> + Send + 'a>>;

    fn mark_read<'a>(&'a self, id: &'a str)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn mark_all_read<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// REST client for the storefront notification API.
pub struct HttpNotificationApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    async fn post_ack(&self, path: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST {path} failed ({status}): {text}");
        }

        let envelope: ApiEnvelope<serde_json::Value> = resp.json().await?;
        if !envelope.success {
            bail!(
                "POST {path} was not successful: {}",
                envelope.message.unwrap_or_default()
            );
        }
        Ok(())
    }
}

impl NotificationBackend for HttpNotificationApi {
    fn fetch_notifications<'a>(
        &'a self,
        filter: &'a NotificationFilter,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationPage>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/notifications{}", self.base_url, filter.to_query());
            let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("GET /notifications failed ({status}): {text}");
            }

            let envelope: ApiEnvelope<NotificationPage> = resp.json().await?;
            envelope
                .into_data()
                .map_err(|message| anyhow::anyhow!("GET /notifications: {message}"))
        })
    }

    fn mark_read<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.post_ack(&format!("/notifications/{id}/read")).await })
    }

    fn mark_all_read<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.post_ack("/notifications/read-all").await })
    }
}
