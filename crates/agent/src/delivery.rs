use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, warn};

use promissory_core::config::DeliveryConfig;
use promissory_core::domain::fulfillment::{DeliveryReceipt, OutboundMessage};
use promissory_core::errors::DeliveryError;
use promissory_core::ports::MessageSender;

const BODY_EXCERPT_CHARS: usize = 200;

/// Posts outbound messages as JSON to an SMS gateway with bearer auth.
pub struct HttpMessageSender {
    client: Client,
    endpoint: String,
    api_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default, alias = "sid", alias = "id")]
    message_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl HttpMessageSender {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into(), api_token })
    }

    /// `Ok(None)` when no gateway is configured.
    pub fn from_config(delivery: &DeliveryConfig) -> Result<Option<Self>, reqwest::Error> {
        let (Some(endpoint), Some(api_token)) = (&delivery.gateway_url, &delivery.api_token) else {
            return Ok(None);
        };
        Self::new(endpoint.clone(), api_token.clone(), Duration::from_secs(delivery.timeout_secs))
            .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|transport_error| {
                error!(
                    event_name = "delivery.gateway.transport_failed",
                    timeout = transport_error.is_timeout(),
                    error = %transport_error,
                    "sms gateway request failed"
                );
                DeliveryError::Transient(format!("gateway request failed: {transport_error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status, &body));
        }

        let receipt = match response.json::<GatewayResponse>().await {
            Ok(parsed) => DeliveryReceipt {
                message_id: parsed.message_id.filter(|id| !id.trim().is_empty()),
                status: parsed.status.unwrap_or_else(|| status.as_str().to_string()),
            },
            Err(decode_error) => {
                warn!(
                    event_name = "delivery.gateway.receipt_undecodable",
                    error = %decode_error,
                    "gateway accepted the message but the receipt could not be decoded"
                );
                undecodable_receipt(status)
            }
        };
        Ok(receipt)
    }
}

fn undecodable_receipt(status: StatusCode) -> DeliveryReceipt {
    DeliveryReceipt { message_id: None, status: format!("{status}; receipt undecodable") }
}

/// 408 and 429 are worth retrying; every other 4xx means the message or
/// destination is bad. 5xx is always transient.
fn classify_rejection(status: StatusCode, body: &str) -> DeliveryError {
    let excerpt = body.chars().take(BODY_EXCERPT_CHARS).collect::<String>();
    let detail = format!("gateway returned {status}: {excerpt}");
    let retryable = status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS);
    if retryable {
        DeliveryError::Transient(detail)
    } else {
        DeliveryError::Permanent(detail)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use secrecy::SecretString;

    use promissory_core::config::AppConfig;

    use super::{classify_rejection, undecodable_receipt, HttpMessageSender};

    #[test]
    fn client_errors_are_permanent() {
        let error = classify_rejection(StatusCode::BAD_REQUEST, "{\"error\":\"invalid number\"}");

        assert!(!error.is_retryable());
        assert!(error.to_string().contains("invalid number"));
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(classify_rejection(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(classify_rejection(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_rejection(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
    }

    #[test]
    fn undecodable_receipt_carries_no_message_id() {
        let receipt = undecodable_receipt(StatusCode::ACCEPTED);

        assert_eq!(receipt.message_id, None);
        assert!(receipt.status.contains("receipt undecodable"));
    }

    #[test]
    fn long_bodies_are_cut_in_error_detail() {
        let body = "x".repeat(5_000);
        let error = classify_rejection(StatusCode::UNPROCESSABLE_ENTITY, &body);

        assert!(error.to_string().len() < 400);
    }

    #[test]
    fn sender_is_only_built_when_a_gateway_is_configured() {
        let mut config = AppConfig::default();
        assert!(HttpMessageSender::from_config(&config.delivery).expect("build").is_none());

        config.delivery.gateway_url = Some("https://sms-gateway.example/v1/messages".to_string());
        config.delivery.api_token = Some(SecretString::from("tok".to_string()));
        let sender = HttpMessageSender::from_config(&config.delivery).expect("build");

        assert_eq!(
            sender.as_ref().map(HttpMessageSender::endpoint),
            Some("https://sms-gateway.example/v1/messages")
        );
    }
}
