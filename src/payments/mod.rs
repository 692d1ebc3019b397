//! Payment gateway adapters behind the [`PaymentGateway`] trait.

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use factory::GatewayFactory;
pub use provider::PaymentGateway;
pub use types::{DonationStatus, GatewayPayment, PaymentMethod};
