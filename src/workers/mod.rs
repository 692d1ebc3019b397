//! Background workers.

pub mod reconciliation_poller;
