//! HTTP webhook backend.
//!
//! POSTs a JSON document to the configured URL. When a secret is set the
//! body is signed with HMAC-SHA256 and the hex digest is sent in
//! `X-Hub-Signature-256` as `sha256=<hex>`.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::AlertBackend;
use crate::config::WebhookConfig;
use crate::models::{Alert, Severity};
use crate::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON body sent to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    /// Alert title.
    pub title: &'a str,
    /// Alert message.
    pub message: &'a str,
    /// Alert urgency.
    pub urgency: Severity,
    /// Fixed producer tag.
    pub source: &'static str,
}

impl<'a> WebhookPayload<'a> {
    /// Body for `alert`.
    #[must_use]
    pub fn from_alert(alert: &'a Alert) -> Self {
        Self {
            title: &alert.title,
            message: &alert.message,
            urgency: alert.urgency,
            source: "attention_alert",
        }
    }
}

/// `sha256=<hex>` signature of `body` under `secret`.
///
/// # Errors
///
/// Returns `AppError::Backend` if the key is rejected.
pub fn sign(body: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AppError::Backend(format!("invalid webhook secret: {err}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Sends alerts to an HTTP endpoint.
pub struct WebhookBackend {
    enabled: bool,
    url: String,
    secret: String,
    client: reqwest::Client,
    runtime: Handle,
}

impl WebhookBackend {
    /// Create the backend; it is inert unless enabled with a non-empty URL.
    #[must_use]
    pub fn new(config: &WebhookConfig, runtime: Handle) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(%err, "failed to build webhook client, using defaults");
                reqwest::Client::new()
            });
        Self {
            enabled: config.enabled,
            url: config.url.trim().to_owned(),
            secret: config.secret.clone(),
            client,
            runtime,
        }
    }

    /// Whether dispatch will actually send.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.is_empty()
    }
}

impl AlertBackend for WebhookBackend {
    fn name(&self) -> &str {
        "webhook"
    }

    fn dispatch(&self, alert: &Alert) -> Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }

        let body = serde_json::to_vec(&WebhookPayload::from_alert(alert))
            .map_err(|err| AppError::Backend(format!("failed to encode webhook body: {err}")))?;
        let signature = if self.secret.is_empty() {
            None
        } else {
            Some(sign(&body, &self.secret)?)
        };

        let mut request = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let url = self.url.clone();
        self.runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%url, status = %response.status(), "webhook delivered");
                }
                Ok(response) => warn!(%url, status = %response.status(), "webhook rejected"),
                Err(err) => warn!(%url, %err, "webhook request failed"),
            }
        });
        Ok(true)
    }
}
