use crate::payments::error::GatewayError;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
        }
    }

    /// Confirmed later by the gateway rather than in the creation call.
    pub fn is_asynchronous(&self) -> bool {
        matches!(self, PaymentMethod::Pix)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = GatewayError;

    /// Exact match; `pis` is a legacy spelling of `pix` still sent by old forms.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pix" | "pis" => Ok(PaymentMethod::Pix),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            _ => Err(GatewayError::Validation {
                message: format!("unsupported payment method: {}", value),
                field: Some("paymentMethod".to_string()),
            }),
        }
    }
}

/// Internal lifecycle of a donation. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Paid,
    Declined,
    Canceled,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Paid => "paid",
            DonationStatus::Declined => "declined",
            DonationStatus::Canceled => "canceled",
        }
    }

    /// Normalize the gateway vocabulary. Case-sensitive; unknown values stay pending.
    pub fn from_gateway_status(status: &str) -> Self {
        match status {
            "approved" => DonationStatus::Paid,
            "rejected" => DonationStatus::Declined,
            "cancelled" => DonationStatus::Canceled,
            "in_process" => DonationStatus::Pending,
            _ => DonationStatus::Pending,
        }
    }

    /// Every stored spelling that reads back as this status.
    pub fn stored_spellings(&self) -> &'static [&'static str] {
        match self {
            DonationStatus::Pending => &["pending"],
            DonationStatus::Paid => &["paid"],
            DonationStatus::Declined => &["declined", "refused"],
            DonationStatus::Canceled => &["canceled", "cancelled", "failed"],
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DonationStatus::Pending)
    }

    /// Whether a stored record in `self` may move to `next`.
    ///
    /// Terminal states are frozen; re-applying the same status is allowed and
    /// is a no-op for the store.
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        *self == next || !self.is_terminal()
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    /// Parse a stored status, folding the legacy spellings that older rows carry.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DonationStatus::Pending),
            "paid" => Ok(DonationStatus::Paid),
            "declined" | "refused" => Ok(DonationStatus::Declined),
            "canceled" | "cancelled" | "failed" => Ok(DonationStatus::Canceled),
            other => Err(format!("unknown donation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payer {
    pub name: String,
    pub email: String,
    /// Digits only
    pub cpf: String,
    pub phone: String,
}

impl Payer {
    /// First word of the name and everything after it.
    pub fn split_name(&self) -> (String, String) {
        let trimmed = self.name.trim();
        match trimmed.split_once(' ') {
            Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
            None => (trimmed.to_string(), String::new()),
        }
    }
}

/// Card reference tokenized by the client against the gateway. Raw card
/// numbers never reach this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDetails {
    pub token: String,
    pub payment_method_id: String,
    pub installments: u32,
    pub issuer_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub amount: BigDecimal,
    pub description: String,
    pub method: PaymentMethod,
    pub payer: Payer,
    pub card: Option<CardDetails>,
    /// `REF-<millis>`, sent to the gateway as our own reference
    pub external_reference: String,
    /// Sent with the creation call so a retried POST cannot charge twice
    pub idempotency_key: String,
}

impl CreatePaymentRequest {
    pub fn amount_in_cents(&self) -> Result<i64, GatewayError> {
        amount_in_cents(&self.amount)
    }
}

pub fn amount_in_cents(amount: &BigDecimal) -> Result<i64, GatewayError> {
    (amount.clone() * BigDecimal::from(100))
        .round(0)
        .to_i64()
        .ok_or_else(|| GatewayError::Validation {
            message: format!("amount out of range: {}", amount),
            field: Some("amount".to_string()),
        })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QrCode {
    /// Copy-and-paste PIX code
    pub text: String,
    /// PNG image, base64 encoded
    pub image_base64: Option<String>,
    /// PNG image hosted by the gateway
    pub image_url: Option<String>,
}

impl QrCode {
    /// Link to the QR image: the hosted URL, or an inline `data:` URI.
    pub fn image_href(&self) -> Option<String> {
        self.image_url.clone().or_else(|| {
            self.image_base64
                .as_ref()
                .map(|b64| format!("data:image/png;base64,{}", b64))
        })
    }
}

/// A payment as seen by the gateway, with its status already expressed in
/// the canonical gateway vocabulary (`approved`, `rejected`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    pub status_detail: Option<String>,
    pub reference_id: Option<String>,
    pub qr_code: Option<QrCode>,
    #[serde(default)]
    pub raw: JsonValue,
}

impl GatewayPayment {
    pub fn donation_status(&self) -> DonationStatus {
        DonationStatus::from_gateway_status(&self.status)
    }
}

/// Incoming notification as received by the webhook route.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: http::HeaderMap,
    /// `data.id` query parameter, when the gateway sends one
    pub data_id: Option<String>,
    pub payload: Vec<u8>,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A verified notification that names the payment to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotification {
    pub payment_id: String,
    pub event_type: Option<String>,
}
