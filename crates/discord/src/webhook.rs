//! Discord webhook execution (`POST /webhooks/{id}/{token}`).

use std::time::Duration;

use {reqwest::Client, serde::Serialize, tracing::debug};

use echo_channels::{Error, RelayMessage, Result, WebhookTarget};

/// JSON body of an execute-webhook request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub content: String,
}

impl WebhookPayload {
    /// Payload for an already bounded message.
    pub fn from_message(msg: &RelayMessage, target: &WebhookTarget) -> Self {
        Self {
            username: msg.author_display_name.clone(),
            avatar_url: target.avatar_url().map(str::to_string),
            content: msg.body.clone(),
        }
    }
}

/// Shared HTTP client for webhook calls. The timeout covers the whole
/// request, from DNS to the last byte of the response.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("discord-echo/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::external("build webhook http client", e))
}

/// Execute the webhook once. Non-2xx responses are errors carrying the
/// status and response body. Transport errors never include the URL, which
/// embeds the webhook token.
pub async fn execute(client: &Client, target: &WebhookTarget, payload: &WebhookPayload) -> Result<()> {
    let resp = client
        .post(target.url())
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            let e = e.without_url();
            Error::network(e.status().map(|s| s.as_u16()), e)
        })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::network(
            Some(status.as_u16()),
            format!("webhook returned {status}: {body}"),
        ));
    }
    debug!(status = status.as_u16(), "webhook delivered");
    Ok(())
}
