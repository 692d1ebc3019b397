//! Donation intent orchestration
//!
//! Validates the donation form, creates the payment at the gateway, records
//! the donation and shapes the response the donation form expects. Fields are
//! checked in a fixed order and the first failure is reported; nothing reaches
//! the gateway or the store before the whole form is valid.

use crate::database::repository::{DonationRecord, DonationStore, NewDonation};
use crate::error::{AppError, AppResult, ValidationError};
use crate::middleware::logging::log_external_call;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CardDetails, CreatePaymentRequest, DonationStatus, GatewayPayment, Payer, PaymentMethod,
};
use crate::payments::utils::epoch_millis;
use crate::validation::{digits_only, validate_cpf, validate_email, validate_phone};
use crate::workers::reconciliation_poller::PollerRegistry;
use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_DESCRIPTION: &str = "Doação Chama Church";

const AMOUNT_NOT_POSITIVE: &str = "Valor da doação deve ser maior que zero";
const AMOUNT_TOO_PRECISE: &str = "Valor da doação deve ter no máximo duas casas decimais";
const AMOUNT_TOO_LARGE: &str = "Valor da doação excede o limite permitido";

/// Amounts are stored as NUMERIC(12,2).
const MAX_AMOUNT_INTEGER_DIGITS: usize = 10;

/// A fully validated donation form.
#[derive(Debug, Clone)]
pub struct DonationForm {
    pub amount: BigDecimal,
    pub description: String,
    pub church_location: String,
    pub method: PaymentMethod,
    pub payer: Payer,
    pub card: Option<CardDetails>,
}

impl DonationForm {
    /// Validate a raw request body.
    ///
    /// Order: top-level presence (amount, customer, churchLocation,
    /// paymentMethod), customer shape and fields, amount value, CPF, email,
    /// phone, payment method, then card data.
    pub fn from_json(body: &JsonValue) -> Result<Self, ValidationError> {
        for field in ["amount", "customer", "churchLocation", "paymentMethod"] {
            if is_blank(body.get(field)) {
                return Err(missing(field));
            }
        }

        let customer = match body.get("customer") {
            Some(JsonValue::Object(customer)) => customer,
            _ => return Err(ValidationError::MissingCustomer),
        };

        let required =
            |field: &'static str| text(customer.get(field)).ok_or_else(|| missing(field));
        let name = required("name")?;
        let email = required("email")?;
        let cpf = required("cpf")?;
        let phone = required("phone")?;

        let amount = parse_amount(body.get("amount"))?;

        if !validate_cpf(&cpf) {
            return Err(ValidationError::InvalidCpf);
        }
        if !validate_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }
        if !validate_phone(&phone) {
            return Err(ValidationError::InvalidPhone);
        }

        let raw_method = text(body.get("paymentMethod")).unwrap_or_default();
        let method = PaymentMethod::from_str(&raw_method).map_err(|_| {
            ValidationError::InvalidPaymentMethod {
                method: raw_method.clone(),
            }
        })?;

        let card = match method {
            PaymentMethod::CreditCard => {
                let token = text(body.get("token"));
                let payment_method_id = text(body.get("paymentMethodId"));
                match (token, payment_method_id) {
                    (Some(token), Some(payment_method_id)) => Some(CardDetails {
                        token,
                        payment_method_id,
                        installments: parse_installments(body.get("installments"))?,
                        issuer_id: text(body.get("issuerId")),
                    }),
                    _ => return Err(ValidationError::CardDataRequired),
                }
            }
            PaymentMethod::Pix => None,
        };

        let church_location = text(body.get("churchLocation"))
            .ok_or_else(|| missing("churchLocation"))?;

        Ok(DonationForm {
            amount,
            description: text(body.get("description"))
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            church_location,
            method,
            payer: Payer {
                name,
                email,
                cpf: digits_only(&cpf),
                phone,
            },
            card,
        })
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

/// Absent, null, `false` and empty strings all count as not provided.
fn is_blank(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// String (trimmed) or number rendered as text; anything else is absent.
fn text(value: Option<&JsonValue>) -> Option<String> {
    match value {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_amount(value: Option<&JsonValue>) -> Result<BigDecimal, ValidationError> {
    let raw = match value {
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    let invalid = |reason: &str| ValidationError::InvalidAmount {
        amount: raw.clone(),
        reason: reason.to_string(),
    };

    // Plain decimal notation only.
    if !raw.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+')) {
        return Err(invalid(AMOUNT_NOT_POSITIVE));
    }

    let amount = BigDecimal::from_str(&raw).map_err(|_| invalid(AMOUNT_NOT_POSITIVE))?;
    if amount <= BigDecimal::from(0) {
        return Err(invalid(AMOUNT_NOT_POSITIVE));
    }

    let integer_digits = raw
        .trim_start_matches('+')
        .split('.')
        .next()
        .unwrap_or_default()
        .trim_start_matches('0')
        .len();
    if integer_digits > MAX_AMOUNT_INTEGER_DIGITS {
        return Err(invalid(AMOUNT_TOO_LARGE));
    }

    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > 2 {
        return Err(invalid(AMOUNT_TOO_PRECISE));
    }
    Ok(amount.with_scale(2))
}

fn parse_installments(value: Option<&JsonValue>) -> Result<u32, ValidationError> {
    let Some(raw) = text(value) else {
        return Ok(1);
    };
    raw.parse::<u32>()
        .map(|n| n.max(1))
        .map_err(|_| ValidationError::InvalidField {
            field: "installments".to_string(),
            reason: "deve ser um número inteiro".to_string(),
        })
}

/// QR link in the shape the donation form renders (`rel = QRCODE.PNG`).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrCodeLink {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrCodeView {
    pub links: Vec<QrCodeLink>,
    pub text: String,
}

/// Body returned by the donation route.
#[derive(Debug, Clone, Serialize)]
pub struct DonationResponse {
    pub id: String,
    /// Gateway-native status
    pub status: String,
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_codes: Option<Vec<QrCodeView>>,
}

/// Everything the orchestrator learned while processing a donation.
#[derive(Debug, Clone)]
pub struct DonationOutcome {
    pub payment: GatewayPayment,
    pub method: PaymentMethod,
    pub status: DonationStatus,
    /// `None` when the record could not be written; the charge still stands.
    pub record: Option<DonationRecord>,
    pub watching: bool,
}

impl DonationOutcome {
    pub fn to_response(&self) -> DonationResponse {
        let qr_codes = match (&self.method, &self.payment.qr_code) {
            (PaymentMethod::Pix, Some(qr)) => Some(vec![QrCodeView {
                links: qr
                    .image_href()
                    .map(|href| QrCodeLink {
                        rel: "QRCODE.PNG".to_string(),
                        href,
                    })
                    .into_iter()
                    .collect(),
                text: qr.text.clone(),
            }]),
            _ => None,
        };

        DonationResponse {
            id: self.payment.id.clone(),
            status: self.payment.status.clone(),
            detail: self.payment.status_detail.clone(),
            qr_codes,
        }
    }
}

pub struct DonationOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn DonationStore>,
    poller: Option<Arc<PollerRegistry>>,
}

impl DonationOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn DonationStore>) -> Self {
        Self {
            gateway,
            store,
            poller: None,
        }
    }

    /// Start a status watch for every pending PIX donation.
    pub fn with_poller(mut self, poller: Arc<PollerRegistry>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Validate and process a raw donation body.
    pub async fn donate(&self, body: &JsonValue) -> AppResult<DonationOutcome> {
        let form = DonationForm::from_json(body).map_err(|e| {
            info!(error = ?e, "donation rejected by validation");
            AppError::validation(e)
        })?;
        self.create_donation(form).await
    }

    pub async fn create_donation(&self, form: DonationForm) -> AppResult<DonationOutcome> {
        let request = CreatePaymentRequest {
            amount: form.amount.clone(),
            description: form.description.clone(),
            method: form.method,
            payer: form.payer.clone(),
            card: form.card.clone(),
            external_reference: format!("REF-{}", epoch_millis()),
            idempotency_key: Uuid::new_v4().to_string(),
        };

        info!(
            gateway = self.gateway.name(),
            method = %form.method,
            amount = %form.amount,
            church_location = %form.church_location,
            reference = %request.external_reference,
            "creating donation payment"
        );

        let payment = log_external_call(
            self.gateway.name(),
            "create_payment",
            self.gateway.create_payment(request),
        )
        .await
        .map_err(|e| {
            error!(
                gateway = self.gateway.name(),
                error = %e,
                "payment creation failed"
            );
            AppError::from(e)
        })?;

        let status = payment.donation_status();
        if status == DonationStatus::Declined {
            warn!(
                payment_id = %payment.id,
                detail = ?payment.status_detail,
                raw = %payment.raw,
                "payment declined by gateway"
            );
        }

        let record = self.record(&form, &payment, status).await;

        let mut watching = false;
        if form.method.is_asynchronous() && status == DonationStatus::Pending {
            if let Some(poller) = &self.poller {
                watching = poller.start(&payment.id).await || poller.is_watching(&payment.id).await;
            }
        }

        info!(
            payment_id = %payment.id,
            status = %status,
            recorded = record.is_some(),
            watching,
            "donation processed"
        );

        Ok(DonationOutcome {
            payment,
            method: form.method,
            status,
            record,
            watching,
        })
    }

    /// Persist the donation. Failures are logged and swallowed: the gateway
    /// has already accepted the charge and reconciliation can catch up.
    async fn record(
        &self,
        form: &DonationForm,
        payment: &GatewayPayment,
        status: DonationStatus,
    ) -> Option<DonationRecord> {
        let donation = NewDonation {
            amount: form.amount.clone(),
            donation_type: form.description.clone(),
            church_location: form.church_location.clone(),
            payment_method: form.method,
            status,
            payer: form.payer.clone(),
            gateway_payment_id: payment.id.clone(),
            gateway_reference_id: payment.reference_id.clone(),
        };

        match self.store.insert(donation).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!(
                    payment_id = %payment.id,
                    status = %status,
                    duplicate = e.is_unique_violation(),
                    error = %e,
                    "failed to record donation after successful charge"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> JsonValue {
        json!({
            "amount": "100.00",
            "description": "Dízimo",
            "churchLocation": "sede",
            "paymentMethod": "pix",
            "customer": {
                "name": "João Teste",
                "email": "joao@example.com",
                "cpf": "123.456.789-09",
                "phone": "(11) 99999-9999"
            }
        })
    }

    fn rejection(body: &JsonValue) -> ValidationError {
        DonationForm::from_json(body).unwrap_err()
    }

    #[test]
    fn valid_pix_form() {
        let form = DonationForm::from_json(&body()).unwrap();
        assert_eq!(form.amount, BigDecimal::from_str("100.00").unwrap());
        assert_eq!(form.method, PaymentMethod::Pix);
        assert_eq!(form.payer.cpf, "12345678909");
        assert_eq!(form.description, "Dízimo");
        assert!(form.card.is_none());
    }

    #[test]
    fn top_level_fields_are_checked_in_order() {
        let mut b = body();
        b["amount"] = JsonValue::Null;
        b["paymentMethod"] = json!("");
        assert_eq!(rejection(&b), missing("amount"));

        let mut b = body();
        b.as_object_mut().unwrap().remove("churchLocation");
        b["paymentMethod"] = json!("");
        assert_eq!(rejection(&b), missing("churchLocation"));
    }

    #[test]
    fn customer_must_be_an_object() {
        let mut b = body();
        b["customer"] = json!("João");
        assert_eq!(rejection(&b), ValidationError::MissingCustomer);
    }

    #[test]
    fn customer_fields_are_required() {
        let mut b = body();
        b["customer"]["email"] = json!("");
        b["customer"]["phone"] = JsonValue::Null;
        assert_eq!(rejection(&b), missing("email"));
    }

    #[test]
    fn amount_must_be_positive_with_two_decimals() {
        for bad in [json!(-5), json!("0"), json!("abc"), json!(0)] {
            let mut b = body();
            b["amount"] = bad;
            assert!(matches!(
                rejection(&b),
                ValidationError::InvalidAmount { ref reason, .. } if reason == AMOUNT_NOT_POSITIVE
            ));
        }

        let mut b = body();
        b["amount"] = json!("10.005");
        assert!(matches!(
            rejection(&b),
            ValidationError::InvalidAmount { ref reason, .. } if reason == AMOUNT_TOO_PRECISE
        ));

        let mut b = body();
        b["amount"] = json!(25.5);
        assert_eq!(
            DonationForm::from_json(&b).unwrap().amount,
            BigDecimal::from_str("25.50").unwrap()
        );
    }

    #[test]
    fn amount_is_bounded_by_the_stored_precision() {
        let mut b = body();
        b["amount"] = json!("9999999999.99");
        assert_eq!(
            DonationForm::from_json(&b).unwrap().amount,
            BigDecimal::from_str("9999999999.99").unwrap()
        );

        for too_large in [json!("10000000000.00"), json!(1e15), json!("0012345678901")] {
            let mut b = body();
            b["amount"] = too_large;
            assert!(matches!(
                rejection(&b),
                ValidationError::InvalidAmount { ref reason, .. }
                    if reason == AMOUNT_TOO_LARGE || reason == AMOUNT_NOT_POSITIVE
            ));
        }

        let mut b = body();
        b["amount"] = json!("10000000000");
        assert!(matches!(
            rejection(&b),
            ValidationError::InvalidAmount { ref reason, .. } if reason == AMOUNT_TOO_LARGE
        ));
    }

    #[test]
    fn exponent_notation_is_rejected_without_expanding() {
        for bad in ["1e900000000", "1E5", "5e-1"] {
            let mut b = body();
            b["amount"] = json!(bad);
            assert!(matches!(
                rejection(&b),
                ValidationError::InvalidAmount { ref amount, .. } if amount == bad
            ));
        }
    }

    #[test]
    fn identity_checks_run_cpf_email_phone() {
        let mut b = body();
        b["customer"]["cpf"] = json!("12345678900");
        b["customer"]["email"] = json!("not-an-email");
        assert_eq!(rejection(&b), ValidationError::InvalidCpf);

        let mut b = body();
        b["customer"]["email"] = json!("not-an-email");
        b["customer"]["phone"] = json!("123");
        assert_eq!(rejection(&b), ValidationError::InvalidEmail);

        let mut b = body();
        b["customer"]["phone"] = json!("123");
        assert_eq!(rejection(&b), ValidationError::InvalidPhone);
    }

    #[test]
    fn payment_method_is_checked_after_identity() {
        let mut b = body();
        b["paymentMethod"] = json!("boleto");
        assert_eq!(
            rejection(&b),
            ValidationError::InvalidPaymentMethod {
                method: "boleto".to_string()
            }
        );

        let mut b = body();
        b["paymentMethod"] = json!("pis");
        assert_eq!(
            DonationForm::from_json(&b).unwrap().method,
            PaymentMethod::Pix
        );
    }

    #[test]
    fn credit_card_needs_token_and_method_id() {
        let mut b = body();
        b["paymentMethod"] = json!("credit_card");
        b["token"] = json!("card-token");
        assert_eq!(rejection(&b), ValidationError::CardDataRequired);

        b["paymentMethodId"] = json!("visa");
        b["installments"] = json!("3");
        b["issuerId"] = json!(25);
        let card = DonationForm::from_json(&b).unwrap().card.unwrap();
        assert_eq!(card.token, "card-token");
        assert_eq!(card.installments, 3);
        assert_eq!(card.issuer_id.as_deref(), Some("25"));
    }

    #[test]
    fn description_defaults() {
        let mut b = body();
        b.as_object_mut().unwrap().remove("description");
        assert_eq!(
            DonationForm::from_json(&b).unwrap().description,
            DEFAULT_DESCRIPTION
        );
    }
}
