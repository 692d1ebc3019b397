use crate::config::{GatewayConfig, GatewayKind};
use crate::payments::error::GatewayResult;
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::{
    MercadoPagoConfig, MercadoPagoGateway, PagBankConfig, PagBankGateway,
};
use std::sync::Arc;

/// Builds gateway backends from configuration.
pub struct GatewayFactory {
    config: GatewayConfig,
}

impl GatewayFactory {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn get_gateway(&self, kind: GatewayKind) -> GatewayResult<Arc<dyn PaymentGateway>> {
        match kind {
            GatewayKind::MercadoPago => Ok(Arc::new(MercadoPagoGateway::new(
                MercadoPagoConfig::from_gateway_config(&self.config)?,
            )?)),
            GatewayKind::PagBank => Ok(Arc::new(PagBankGateway::new(
                PagBankConfig::from_gateway_config(&self.config)?,
            )?)),
        }
    }

    /// The backend selected by `PAYMENT_GATEWAY`.
    pub fn get_default_gateway(&self) -> GatewayResult<Arc<dyn PaymentGateway>> {
        self.get_gateway(self.config.kind)
    }

    /// Backends that have credentials configured.
    pub fn list_available_gateways(&self) -> Vec<GatewayKind> {
        let mut available = Vec::new();
        if self.config.mp_access_token.is_some() {
            available.push(GatewayKind::MercadoPago);
        }
        if self.config.pagbank_token.is_some() {
            available.push(GatewayKind::PagBank);
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::GatewayError;

    fn config(kind: GatewayKind) -> GatewayConfig {
        GatewayConfig {
            kind,
            mp_access_token: Some("TEST-123".to_string()),
            mp_public_key: None,
            mp_webhook_secret: None,
            mp_base_url: "https://api.mercadopago.com".to_string(),
            pagbank_token: None,
            pagbank_production: false,
            pagbank_base_url: None,
            notification_url: None,
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn default_gateway_follows_configuration() {
        let factory = GatewayFactory::new(config(GatewayKind::MercadoPago));
        let gateway = factory.get_default_gateway().unwrap();
        assert_eq!(gateway.name(), "mercadopago");
    }

    #[test]
    fn missing_credentials_are_reported() {
        let factory = GatewayFactory::new(config(GatewayKind::PagBank));
        assert!(matches!(
            factory.get_default_gateway(),
            Err(GatewayError::NotConfigured { .. })
        ));
        assert_eq!(
            factory.list_available_gateways(),
            vec![GatewayKind::MercadoPago]
        );
    }
}
