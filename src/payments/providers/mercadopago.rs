use crate::config::GatewayConfig;
use crate::logging::secret_prefix;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CreatePaymentRequest, GatewayPayment, PaymentMethod, QrCode, WebhookNotification,
    WebhookRequest,
};
use crate::payments::utils::{epoch_millis, verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{info, warn};

const GATEWAY: &str = "mercadopago";

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub public_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub notification_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl MercadoPagoConfig {
    pub fn from_gateway_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let access_token =
            config
                .mp_access_token
                .clone()
                .ok_or_else(|| GatewayError::NotConfigured {
                    message: "MP_ACCESS_TOKEN environment variable is required".to_string(),
                })?;

        Ok(Self {
            access_token,
            public_key: config.mp_public_key.clone(),
            webhook_secret: config.mp_webhook_secret.clone(),
            base_url: config.mp_base_url.trim_end_matches('/').to_string(),
            notification_url: config.notification_url.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    /// Test credentials are issued with a `TEST` prefix.
    pub fn is_test_mode(&self) -> bool {
        self.access_token.starts_with("TEST")
    }
}

pub struct MercadoPagoGateway {
    config: MercadoPagoConfig,
    http: PaymentHttpClient,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> GatewayResult<Self> {
        let http = PaymentHttpClient::new(
            GATEWAY,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;

        info!(
            access_token = %secret_prefix(Some(&config.access_token)),
            public_key = %secret_prefix(config.public_key.as_deref()),
            test_mode = config.is_test_mode(),
            "Mercado Pago gateway configured"
        );
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Body of `POST /v1/payments`.
    fn payment_body(&self, request: &CreatePaymentRequest, now_millis: i64) -> GatewayResult<JsonValue> {
        let (first_name, last_name) = request.payer.split_name();

        // The gateway refuses payments whose payer is the collector account itself,
        // which is what test users end up being.
        let email = if self.config.is_test_mode() {
            format!("test_user_{}@test.com", now_millis)
        } else {
            request.payer.email.clone()
        };

        let amount = request
            .amount
            .to_f64()
            .ok_or_else(|| GatewayError::Validation {
                message: format!("amount out of range: {}", request.amount),
                field: Some("amount".to_string()),
            })?;

        let mut body = json!({
            "transaction_amount": amount,
            "description": request.description,
            "payer": {
                "email": email,
                "first_name": first_name,
                "last_name": last_name,
                "identification": {
                    "type": "CPF",
                    "number": request.payer.cpf,
                },
            },
            "external_reference": request.external_reference,
        });

        match request.method {
            PaymentMethod::Pix => {
                body["payment_method_id"] = json!("pix");
            }
            PaymentMethod::CreditCard => {
                let card = request.card.as_ref().ok_or_else(|| GatewayError::Validation {
                    message: "card token is required for credit card payments".to_string(),
                    field: Some("token".to_string()),
                })?;

                if card.token.starts_with("tst") && !self.config.is_test_mode() {
                    warn!("test card token used with a production access token");
                }

                body["payment_method_id"] = json!(card.payment_method_id);
                body["token"] = json!(card.token);
                body["installments"] = json!(card.installments.max(1));
                if let Some(issuer_id) = &card.issuer_id {
                    body["issuer_id"] = json!(issuer_id);
                }
            }
        }

        if let Some(url) = &self.config.notification_url {
            body["notification_url"] = json!(url);
        }

        Ok(body)
    }
}

/// Read a payment resource returned by `/v1/payments`.
fn parse_payment(raw: JsonValue) -> GatewayResult<GatewayPayment> {
    let id = match raw.get("id") {
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(GatewayError::InvalidResponse {
                gateway: GATEWAY.to_string(),
                message: "payment id missing from response".to_string(),
            })
        }
    };

    let status = raw
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("pending")
        .to_string();

    let transaction_data = raw
        .get("point_of_interaction")
        .and_then(|poi| poi.get("transaction_data"));
    let qr_code = transaction_data.and_then(|data| {
        let text = data.get("qr_code").and_then(|v| v.as_str())?;
        Some(QrCode {
            text: text.to_string(),
            image_base64: data
                .get("qr_code_base64")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            image_url: None,
        })
    });

    Ok(GatewayPayment {
        id,
        status,
        status_detail: raw
            .get("status_detail")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        reference_id: raw
            .get("external_reference")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        qr_code,
        raw,
    })
}

/// Split `ts=<ts>,v1=<hash>` into its two parts.
fn parse_signature_header(header: &str) -> Option<(String, String)> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ts" => ts = Some(value.trim().to_string()),
            "v1" => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some((ts?, v1?))
}

fn data_id_from_body(payload: &JsonValue) -> Option<String> {
    match payload.get("data").and_then(|d| d.get("id")) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_payment(&self, request: CreatePaymentRequest) -> GatewayResult<GatewayPayment> {
        let body = self.payment_body(&request, epoch_millis())?;

        let raw = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/payments"),
                Some(&self.config.access_token),
                Some(&body),
                &[("X-Idempotency-Key", request.idempotency_key.as_str())],
            )
            .await?;

        let payment = parse_payment(raw)?;
        if payment.status == "rejected" {
            warn!(
                payment_id = %payment.id,
                status_detail = ?payment.status_detail,
                "Mercado Pago rejected payment"
            );
        }
        Ok(payment)
    }

    async fn get_payment(&self, payment_id: &str) -> GatewayResult<GatewayPayment> {
        // Payment ids are numeric; anything else never reaches the URL path.
        let payment_id = payment_id.trim();
        if payment_id.is_empty() || !payment_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::Validation {
                message: "payment id must be numeric".to_string(),
                field: Some("id".to_string()),
            });
        }

        let raw = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/payments/{}", payment_id)),
                Some(&self.config.access_token),
                None,
                &[],
            )
            .await?;

        parse_payment(raw)
    }

    fn name(&self) -> &'static str {
        GATEWAY
    }

    fn verify_webhook(&self, request: &WebhookRequest) -> GatewayResult<WebhookNotification> {
        let secret = self.config.webhook_secret.as_deref().ok_or_else(|| {
            GatewayError::WebhookVerification {
                message: "MP_WEBHOOK_SECRET is not configured".to_string(),
            }
        })?;

        let header = request
            .header("x-signature")
            .ok_or_else(|| GatewayError::WebhookVerification {
                message: "missing x-signature header".to_string(),
            })?;
        let (ts, v1) =
            parse_signature_header(header).ok_or_else(|| GatewayError::WebhookVerification {
                message: "malformed x-signature header".to_string(),
            })?;

        let payload: JsonValue = serde_json::from_slice(&request.payload).unwrap_or(JsonValue::Null);
        let data_id = request
            .data_id
            .clone()
            .or_else(|| data_id_from_body(&payload))
            .ok_or_else(|| GatewayError::WebhookVerification {
                message: "notification carries no data.id".to_string(),
            })?;

        // Alphanumeric ids are signed in lower case.
        let mut manifest = format!("id:{};", data_id.to_lowercase());
        if let Some(request_id) = request.header("x-request-id") {
            manifest.push_str(&format!("request-id:{};", request_id));
        }
        manifest.push_str(&format!("ts:{};", ts));

        if !verify_hmac_sha256_hex(manifest.as_bytes(), secret, &v1) {
            return Err(GatewayError::WebhookVerification {
                message: "signature mismatch".to_string(),
            });
        }

        let event_type = payload
            .get("type")
            .or_else(|| payload.get("action"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(WebhookNotification {
            payment_id: data_id,
            event_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CardDetails, Payer};
    use crate::payments::utils::hmac_sha256_hex;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn gateway(access_token: &str) -> MercadoPagoGateway {
        MercadoPagoGateway::new(MercadoPagoConfig {
            access_token: access_token.to_string(),
            public_key: None,
            webhook_secret: Some("whsec".to_string()),
            base_url: "https://api.mercadopago.com".to_string(),
            notification_url: None,
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap()
    }

    fn request(method: PaymentMethod) -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: BigDecimal::from_str("100.00").unwrap(),
            description: "Dízimo".to_string(),
            method,
            payer: Payer {
                name: "João da Silva".to_string(),
                email: "joao@example.com".to_string(),
                cpf: "12345678909".to_string(),
                phone: "11999999999".to_string(),
            },
            card: None,
            external_reference: "REF-1700000000000".to_string(),
            idempotency_key: "idem-1".to_string(),
        }
    }

    #[test]
    fn pix_body_uses_payer_identity() {
        let body = gateway("APP_USR-123")
            .payment_body(&request(PaymentMethod::Pix), 42)
            .unwrap();

        assert_eq!(body["payment_method_id"], "pix");
        assert_eq!(body["transaction_amount"], 100.0);
        assert_eq!(body["payer"]["email"], "joao@example.com");
        assert_eq!(body["payer"]["first_name"], "João");
        assert_eq!(body["payer"]["last_name"], "da Silva");
        assert_eq!(body["payer"]["identification"]["type"], "CPF");
        assert_eq!(body["payer"]["identification"]["number"], "12345678909");
        assert_eq!(body["external_reference"], "REF-1700000000000");
        assert!(body.get("token").is_none());
    }

    #[test]
    fn test_token_replaces_payer_email() {
        let body = gateway("TEST-123")
            .payment_body(&request(PaymentMethod::Pix), 1700000000000)
            .unwrap();
        assert_eq!(body["payer"]["email"], "test_user_1700000000000@test.com");
    }

    #[test]
    fn card_body_carries_token_and_defaults_installments() {
        let mut req = request(PaymentMethod::CreditCard);
        req.card = Some(CardDetails {
            token: "card_tok".to_string(),
            payment_method_id: "visa".to_string(),
            installments: 0,
            issuer_id: Some("25".to_string()),
        });

        let body = gateway("APP_USR-123").payment_body(&req, 1).unwrap();
        assert_eq!(body["payment_method_id"], "visa");
        assert_eq!(body["token"], "card_tok");
        assert_eq!(body["installments"], 1);
        assert_eq!(body["issuer_id"], "25");
    }

    #[test]
    fn card_body_without_card_is_rejected() {
        let result = gateway("APP_USR-123").payment_body(&request(PaymentMethod::CreditCard), 1);
        assert!(matches!(result, Err(GatewayError::Validation { .. })));
    }

    #[test]
    fn payment_response_is_parsed_with_qr_code() {
        let payment = parse_payment(json!({
            "id": 123456789,
            "status": "pending",
            "status_detail": "pending_waiting_transfer",
            "external_reference": "REF-1",
            "point_of_interaction": {
                "transaction_data": {
                    "qr_code": "00020126...",
                    "qr_code_base64": "iVBORw0KGgo="
                }
            }
        }))
        .unwrap();

        assert_eq!(payment.id, "123456789");
        assert_eq!(payment.status, "pending");
        assert_eq!(payment.reference_id.as_deref(), Some("REF-1"));
        let qr = payment.qr_code.unwrap();
        assert_eq!(qr.text, "00020126...");
        assert_eq!(qr.image_base64.as_deref(), Some("iVBORw0KGgo="));
    }

    #[test]
    fn payment_without_id_is_invalid() {
        assert!(parse_payment(json!({"status": "approved"})).is_err());
    }

    #[test]
    fn signature_header_is_parsed() {
        assert_eq!(
            parse_signature_header("ts=1704908010,v1=abc123"),
            Some(("1704908010".to_string(), "abc123".to_string()))
        );
        assert_eq!(parse_signature_header("v1=abc123"), None);
    }

    #[test]
    fn webhook_signature_is_verified() {
        let gateway = gateway("APP_USR-123");
        let manifest = "id:123456;request-id:req-1;ts:1704908010;";
        let v1 = hmac_sha256_hex("whsec", manifest.as_bytes()).unwrap();

        let mut headers = http::HeaderMap::new();
        headers.insert("x-signature", format!("ts=1704908010,v1={}", v1).parse().unwrap());
        headers.insert("x-request-id", "req-1".parse().unwrap());
        let mut request = WebhookRequest {
            headers,
            data_id: None,
            payload: br#"{"type":"payment","data":{"id":"123456"}}"#.to_vec(),
        };

        let notification = gateway.verify_webhook(&request).unwrap();
        assert_eq!(notification.payment_id, "123456");
        assert_eq!(notification.event_type.as_deref(), Some("payment"));

        request
            .headers
            .insert("x-signature", "ts=1704908010,v1=deadbeef".parse().unwrap());
        assert!(matches!(
            gateway.verify_webhook(&request),
            Err(GatewayError::WebhookVerification { .. })
        ));

        request.headers.remove("x-signature");
        assert!(gateway.verify_webhook(&request).is_err());
    }

    #[tokio::test]
    async fn lookup_rejects_non_numeric_ids_before_calling_out() {
        let gateway = gateway("APP_USR-123");
        for id in ["../../users/me", "123?x=1", "12/34", ""] {
            let err = gateway.get_payment(id).await.unwrap_err();
            assert!(matches!(err, GatewayError::Validation { .. }), "{}", id);
            assert!(!err.is_retryable());
        }
    }
}
