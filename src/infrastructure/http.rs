use crate::domain::ports::WebhookTransport;
use crate::domain::webhook::DeliveryOutcome;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// POSTs webhook bodies with `reqwest`. Every request is bounded by the
/// client timeout; a timeout is reported like any other transport error.
#[derive(Debug, Clone)]
pub struct HttpWebhookTransport {
    client: Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, url: &str, body: &str) -> DeliveryOutcome {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                debug!(url, status = status.as_u16(), "webhook response");
                if status.is_success() {
                    DeliveryOutcome::Delivered {
                        status_code: status.as_u16(),
                        body: text,
                    }
                } else {
                    DeliveryOutcome::Rejected {
                        status_code: status.as_u16(),
                        body: text,
                    }
                }
            }
            Err(e) if e.is_timeout() => {
                DeliveryOutcome::Transport(format!("request timed out: {e}"))
            }
            Err(e) => DeliveryOutcome::Transport(e.to_string()),
        }
    }
}
