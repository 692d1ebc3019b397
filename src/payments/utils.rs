use crate::payments::error::{GatewayError, GatewayResult};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Base delay of the exponential backoff between attempts.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Delay before retry number `attempt` (1-based): 250ms, 500ms, 1s, ...
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    RETRY_BASE_DELAY.saturating_mul(factor)
}

/// JSON-over-HTTPS client shared by the gateway adapters.
///
/// Retries network failures, 429 and 5xx with exponential backoff; any other
/// non-2xx answer is returned at once with its body preserved.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    gateway: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(gateway: &'static str, timeout: Duration, max_retries: u32) -> GatewayResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| GatewayError::Network {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            gateway,
            timeout,
            max_retries,
        })
    }

    pub async fn request_json(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> GatewayResult<JsonValue> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        gateway = self.gateway,
                        attempt = attempt + 1,
                        timeout = e.is_timeout(),
                        error = %e,
                        "gateway request failed"
                    );
                    last_error = Some(GatewayError::Network {
                        message: format!("{} request failed: {}", self.gateway, e),
                    });
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return serde_json::from_str::<JsonValue>(&text).map_err(|e| {
                    GatewayError::InvalidResponse {
                        gateway: self.gateway.to_string(),
                        message: format!("invalid JSON response: {}", e),
                    }
                });
            }

            if status.as_u16() == 429 {
                warn!(gateway = self.gateway, attempt = attempt + 1, "gateway rate limited");
                last_error = Some(GatewayError::RateLimited {
                    message: format!("{} rate limit exceeded", self.gateway),
                });
                continue;
            }

            let payload = serde_json::from_str::<JsonValue>(&text).ok();
            let error = GatewayError::Provider {
                gateway: self.gateway.to_string(),
                message: describe_error_body(status.as_u16(), payload.as_ref(), &text),
                status: Some(status.as_u16()),
                payload,
                retryable: status.is_server_error(),
            };

            if status.is_server_error() {
                warn!(
                    gateway = self.gateway,
                    status = %status,
                    attempt = attempt + 1,
                    "gateway server error, retrying"
                );
                last_error = Some(error);
                continue;
            }

            return Err(error);
        }

        Err(last_error.unwrap_or(GatewayError::Network {
            message: format!("{} request failed", self.gateway),
        }))
    }
}

/// One-line summary of a gateway error body for logs.
fn describe_error_body(status: u16, payload: Option<&JsonValue>, text: &str) -> String {
    let Some(payload) = payload else {
        return format!("HTTP {}: {}", status, text);
    };

    // PagBank: {"error_messages": [{"code", "description", "parameter_name"}]}
    if let Some(messages) = payload.get("error_messages").and_then(|v| v.as_array()) {
        let joined = messages
            .iter()
            .map(|m| {
                format!(
                    "{}: {} ({})",
                    m.get("code").and_then(|v| v.as_str()).unwrap_or("?"),
                    m.get("description")
                        .or_else(|| m.get("message"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                    m.get("parameter_name").and_then(|v| v.as_str()).unwrap_or("-"),
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        return format!("HTTP {}: {}", status, joined);
    }

    // Mercado Pago: {"message": "...", "cause": [...]}
    match payload.get("message").and_then(|v| v.as_str()) {
        Some(message) => format!("HTTP {}: {}", status, message),
        None => format!("HTTP {}: {}", status, text),
    }
}

pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha256_hex(secret, payload) {
        Some(computed) => secure_eq(
            computed.as_bytes(),
            signature.trim().to_ascii_lowercase().as_bytes(),
        ),
        None => false,
    }
}

pub fn sha256_hex(payload: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(payload))
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Milliseconds since the Unix epoch, used in gateway references.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(3), Duration::from_secs(1));
        assert!(backoff_delay(40) >= backoff_delay(32));
    }

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn hmac_verification_accepts_own_signature() {
        let payload = b"id:123;request-id:abc;ts:1700000000;";
        let signature = hmac_sha256_hex("secret", payload).unwrap();
        assert!(verify_hmac_sha256_hex(payload, "secret", &signature));
        assert!(verify_hmac_sha256_hex(
            payload,
            "secret",
            &signature.to_ascii_uppercase()
        ));
        assert!(!verify_hmac_sha256_hex(payload, "other", &signature));
        assert!(!verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature"));
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn error_bodies_are_summarized() {
        let pagbank = serde_json::json!({
            "error_messages": [{"code": "40002", "description": "invalid_parameter", "parameter_name": "customer.tax_id"}]
        });
        assert_eq!(
            describe_error_body(400, Some(&pagbank), ""),
            "HTTP 400: 40002: invalid_parameter (customer.tax_id)"
        );

        let mp = serde_json::json!({"message": "invalid_token", "status": 401});
        assert_eq!(describe_error_body(401, Some(&mp), ""), "HTTP 401: invalid_token");
        assert_eq!(describe_error_body(502, None, "bad gateway"), "HTTP 502: bad gateway");
    }
}
