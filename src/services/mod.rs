//! Business logic behind the HTTP handlers

pub mod admin_dashboard;
pub mod donation_orchestrator;
pub mod donor_lookup;
pub mod reconciliation;
pub mod webhook_processor;

pub use donation_orchestrator::{DonationForm, DonationOrchestrator, DonationOutcome};
pub use reconciliation::{ReconciliationError, ReconciliationService, StatusUpdate};
