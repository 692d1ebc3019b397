use crate::payments::error::GatewayResult;
use crate::payments::types::{
    CreatePaymentRequest, GatewayPayment, WebhookNotification, WebhookRequest,
};
use async_trait::async_trait;

/// A payment processor able to create and look up donations.
///
/// Implementations translate their own status vocabulary into the canonical
/// one (`approved`, `rejected`, `cancelled`, `in_process`, `pending`) so that
/// callers only ever normalize through [`DonationStatus::from_gateway_status`].
///
/// [`DonationStatus::from_gateway_status`]: crate::payments::types::DonationStatus::from_gateway_status
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: CreatePaymentRequest) -> GatewayResult<GatewayPayment>;

    async fn get_payment(&self, payment_id: &str) -> GatewayResult<GatewayPayment>;

    fn name(&self) -> &'static str;

    /// Authenticate an incoming notification and extract the payment it refers to.
    fn verify_webhook(&self, request: &WebhookRequest) -> GatewayResult<WebhookNotification>;
}
