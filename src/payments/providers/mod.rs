pub mod mercadopago;
pub mod pagbank;

pub use mercadopago::{MercadoPagoConfig, MercadoPagoGateway};
pub use pagbank::{PagBankConfig, PagBankGateway};
