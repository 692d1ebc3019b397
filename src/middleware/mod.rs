pub mod admin_auth;
pub mod error;
pub mod logging;
