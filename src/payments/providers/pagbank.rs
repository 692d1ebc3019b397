use crate::config::GatewayConfig;
use crate::logging::secret_prefix;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CreatePaymentRequest, GatewayPayment, PaymentMethod, QrCode, WebhookNotification,
    WebhookRequest,
};
use crate::payments::utils::{epoch_millis, secure_eq, sha256_hex, PaymentHttpClient};
use crate::validation::split_phone;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::info;

const GATEWAY: &str = "pagbank";

/// How long a PIX QR code stays payable.
const PIX_EXPIRATION_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct PagBankConfig {
    pub token: String,
    pub base_url: String,
    pub production: bool,
    pub notification_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl PagBankConfig {
    pub fn from_gateway_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let token = config
            .pagbank_token
            .clone()
            .ok_or_else(|| GatewayError::NotConfigured {
                message: "PAGBANK_TOKEN environment variable is required".to_string(),
            })?;

        Ok(Self {
            token,
            base_url: config.pagbank_url().trim_end_matches('/').to_string(),
            production: config.pagbank_production,
            notification_url: config.notification_url.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

pub struct PagBankGateway {
    config: PagBankConfig,
    http: PaymentHttpClient,
}

/// Translate an order's charge status into the canonical gateway vocabulary.
pub fn canonical_status(pagbank_status: &str) -> &'static str {
    match pagbank_status {
        "PAID" => "approved",
        "DECLINED" => "rejected",
        "CANCELED" => "cancelled",
        "IN_ANALYSIS" => "in_process",
        _ => "pending",
    }
}

impl PagBankGateway {
    pub fn new(config: PagBankConfig) -> GatewayResult<Self> {
        let http = PaymentHttpClient::new(
            GATEWAY,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;

        info!(
            token = %secret_prefix(Some(&config.token)),
            production = config.production,
            base_url = %config.base_url,
            "PagBank gateway configured"
        );
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Body of `POST /orders`. Amounts are integer cents.
    fn order_body(&self, request: &CreatePaymentRequest, now_millis: i64) -> GatewayResult<JsonValue> {
        let cents = request.amount_in_cents()?;
        let (area, number) = split_phone(&request.payer.phone);

        let mut body = json!({
            "reference_id": request.external_reference,
            "customer": {
                "name": request.payer.name,
                "email": request.payer.email,
                "tax_id": request.payer.cpf,
                "phones": [{
                    "country": "55",
                    "area": area,
                    "number": number,
                    "type": "MOBILE",
                }],
            },
            "items": [{
                "name": request.description,
                "quantity": 1,
                "unit_amount": cents,
            }],
        });

        match request.method {
            PaymentMethod::Pix => {
                let expires_at = (Utc::now() + ChronoDuration::seconds(PIX_EXPIRATION_SECS))
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
                body["qr_codes"] = json!([{
                    "amount": { "value": cents },
                    "expiration_date": expires_at,
                }]);
            }
            PaymentMethod::CreditCard => {
                let card = request.card.as_ref().ok_or_else(|| GatewayError::Validation {
                    message: "encrypted card is required for credit card payments".to_string(),
                    field: Some("token".to_string()),
                })?;

                body["charges"] = json!([{
                    "reference_id": format!("CHARGE-{}", now_millis),
                    "description": request.description,
                    "amount": { "value": cents, "currency": "BRL" },
                    "payment_method": {
                        "type": "CREDIT_CARD",
                        "installments": card.installments.max(1),
                        "capture": true,
                        "card": {
                            "encrypted": card.token,
                            "store": false,
                        },
                    },
                }]);
            }
        }

        if let Some(url) = &self.config.notification_url {
            body["notification_urls"] = json!([url]);
        }

        Ok(body)
    }
}

/// Read an order resource returned by `/orders`.
fn parse_order(raw: JsonValue) -> GatewayResult<GatewayPayment> {
    let id = raw
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::InvalidResponse {
            gateway: GATEWAY.to_string(),
            message: "order id missing from response".to_string(),
        })?
        .to_string();

    // An order has no charge until it is paid (PIX) or attempted (card).
    let charge = raw
        .get("charges")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());
    let charge_status = charge
        .and_then(|c| c.get("status"))
        .and_then(|v| v.as_str())
        .unwrap_or("WAITING");
    let status_detail = charge
        .and_then(|c| c.get("payment_response"))
        .and_then(|r| r.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| Some(charge_status.to_string()));

    let qr_code = raw
        .get("qr_codes")
        .and_then(|q| q.as_array())
        .and_then(|q| q.first())
        .and_then(|qr| {
            let text = qr.get("text").and_then(|v| v.as_str())?;
            let image_url = qr
                .get("links")
                .and_then(|l| l.as_array())
                .and_then(|links| {
                    links.iter().find(|link| {
                        link.get("rel").and_then(|v| v.as_str()) == Some("QRCODE.PNG")
                    })
                })
                .and_then(|link| link.get("href"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Some(QrCode {
                text: text.to_string(),
                image_base64: None,
                image_url,
            })
        });

    Ok(GatewayPayment {
        id,
        status: canonical_status(charge_status).to_string(),
        status_detail,
        reference_id: raw
            .get("reference_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        qr_code,
        raw,
    })
}

#[async_trait]
impl PaymentGateway for PagBankGateway {
    async fn create_payment(&self, request: CreatePaymentRequest) -> GatewayResult<GatewayPayment> {
        let body = self.order_body(&request, epoch_millis())?;

        let raw = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/orders"),
                Some(&self.config.token),
                Some(&body),
                &[
                    ("accept", "application/json"),
                    ("x-idempotency-key", request.idempotency_key.as_str()),
                ],
            )
            .await?;

        parse_order(raw)
    }

    async fn get_payment(&self, payment_id: &str) -> GatewayResult<GatewayPayment> {
        let payment_id = payment_id.trim();
        if !is_order_id(payment_id) {
            return Err(GatewayError::Validation {
                message: "order id must look like ORDE_<id>".to_string(),
                field: Some("id".to_string()),
            });
        }

        let raw = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/orders/{}", payment_id)),
                Some(&self.config.token),
                None,
                &[("accept", "application/json")],
            )
            .await?;

        parse_order(raw)
    }

    fn name(&self) -> &'static str {
        GATEWAY
    }

    /// Notifications are signed as `sha256("<token>-<raw body>")` in
    /// `x-authenticity-token`.
    fn verify_webhook(&self, request: &WebhookRequest) -> GatewayResult<WebhookNotification> {
        let presented = request.header("x-authenticity-token").ok_or_else(|| {
            GatewayError::WebhookVerification {
                message: "missing x-authenticity-token header".to_string(),
            }
        })?;

        let mut signed = format!("{}-", self.config.token).into_bytes();
        signed.extend_from_slice(&request.payload);
        let expected = sha256_hex(&signed);
        if !secure_eq(
            expected.as_bytes(),
            presented.trim().to_ascii_lowercase().as_bytes(),
        ) {
            return Err(GatewayError::WebhookVerification {
                message: "signature mismatch".to_string(),
            });
        }

        let payload: JsonValue = serde_json::from_slice(&request.payload).map_err(|e| {
            GatewayError::WebhookVerification {
                message: format!("notification body is not JSON: {}", e),
            }
        })?;
        let payment_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| request.data_id.clone())
            .ok_or_else(|| GatewayError::WebhookVerification {
                message: "notification carries no order id".to_string(),
            })?;

        Ok(WebhookNotification {
            payment_id,
            event_type: Some("order".to_string()),
        })
    }
}

/// `ORDE_` followed by alphanumerics and dashes.
fn is_order_id(id: &str) -> bool {
    id.strip_prefix("ORDE_").map_or(false, |rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CardDetails, DonationStatus, Payer};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn gateway() -> PagBankGateway {
        PagBankGateway::new(PagBankConfig {
            token: "pb-token".to_string(),
            base_url: "https://sandbox.api.pagseguro.com".to_string(),
            production: false,
            notification_url: Some("https://example.com/api/webhooks/pagbank".to_string()),
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap()
    }

    fn request(method: PaymentMethod) -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: BigDecimal::from_str("100.50").unwrap(),
            description: "Oferta".to_string(),
            method,
            payer: Payer {
                name: "Ana Souza".to_string(),
                email: "ana@example.com".to_string(),
                cpf: "12345678909".to_string(),
                phone: "(11) 98888-7777".to_string(),
            },
            card: None,
            external_reference: "REF-1".to_string(),
            idempotency_key: "idem-1".to_string(),
        }
    }

    #[test]
    fn status_vocabulary_is_translated() {
        assert_eq!(canonical_status("PAID"), "approved");
        assert_eq!(canonical_status("DECLINED"), "rejected");
        assert_eq!(canonical_status("CANCELED"), "cancelled");
        assert_eq!(canonical_status("IN_ANALYSIS"), "in_process");
        assert_eq!(canonical_status("AUTHORIZED"), "pending");
        assert_eq!(
            DonationStatus::from_gateway_status(canonical_status("CANCELED")),
            DonationStatus::Canceled
        );
    }

    #[test]
    fn pix_order_is_in_cents_with_qr_code() {
        let body = gateway().order_body(&request(PaymentMethod::Pix), 1).unwrap();

        assert_eq!(body["items"][0]["unit_amount"], 10050);
        assert_eq!(body["qr_codes"][0]["amount"]["value"], 10050);
        assert!(body["qr_codes"][0]["expiration_date"].is_string());
        assert_eq!(body["customer"]["phones"][0]["area"], "11");
        assert_eq!(body["customer"]["phones"][0]["number"], "988887777");
        assert_eq!(
            body["notification_urls"][0],
            "https://example.com/api/webhooks/pagbank"
        );
        assert!(body.get("charges").is_none());
    }

    #[test]
    fn card_order_sends_only_encrypted_card() {
        let mut req = request(PaymentMethod::CreditCard);
        req.card = Some(CardDetails {
            token: "encrypted-blob".to_string(),
            payment_method_id: "visa".to_string(),
            installments: 1,
            issuer_id: None,
        });

        let body = gateway().order_body(&req, 77).unwrap();
        let card = &body["charges"][0]["payment_method"]["card"];
        assert_eq!(card["encrypted"], "encrypted-blob");
        assert!(card.get("number").is_none());
        assert_eq!(body["charges"][0]["reference_id"], "CHARGE-77");
    }

    #[test]
    fn order_response_is_parsed() {
        let payment = parse_order(json!({
            "id": "ORDE_123",
            "reference_id": "REF-1",
            "qr_codes": [{
                "text": "00020101021226...",
                "links": [
                    {"rel": "QRCODE.BASE64", "href": "https://example.com/base64"},
                    {"rel": "QRCODE.PNG", "href": "https://example.com/qr.png"}
                ]
            }]
        }))
        .unwrap();

        assert_eq!(payment.id, "ORDE_123");
        assert_eq!(payment.status, "pending");
        let qr = payment.qr_code.unwrap();
        assert_eq!(qr.image_url.as_deref(), Some("https://example.com/qr.png"));

        let paid = parse_order(json!({
            "id": "ORDE_123",
            "charges": [{"status": "PAID", "payment_response": {"message": "SUCESSO"}}]
        }))
        .unwrap();
        assert_eq!(paid.donation_status(), DonationStatus::Paid);
        assert_eq!(paid.status_detail.as_deref(), Some("SUCESSO"));
    }

    #[test]
    fn webhook_authenticity_token_is_checked() {
        let payload = br#"{"id":"ORDE_123","charges":[{"status":"PAID"}]}"#.to_vec();
        let mut signed = b"pb-token-".to_vec();
        signed.extend_from_slice(&payload);

        let mut headers = http::HeaderMap::new();
        headers.insert("x-authenticity-token", sha256_hex(&signed).parse().unwrap());
        let mut request = WebhookRequest {
            headers,
            data_id: None,
            payload,
        };

        let notification = gateway().verify_webhook(&request).unwrap();
        assert_eq!(notification.payment_id, "ORDE_123");

        request
            .headers
            .insert("x-authenticity-token", "00".parse().unwrap());
        assert!(gateway().verify_webhook(&request).is_err());
    }

    #[tokio::test]
    async fn lookup_rejects_ids_outside_the_order_format() {
        assert!(is_order_id("ORDE_3A2F4B9B-0C0E-4D3A-9C1B-5E6F7A8B9C0D"));

        let gateway = gateway();
        for id in ["../../users/me", "ORDE_", "ORDE_1/../../x", "CHAR_123", "ORDE_1%2F"] {
            let err = gateway.get_payment(id).await.unwrap_err();
            assert!(matches!(err, GatewayError::Validation { .. }), "{}", id);
        }
    }
}
