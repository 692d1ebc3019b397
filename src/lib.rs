//! Chama Church donation backend.
//!
//! Thin HTTP service that validates donation forms, forwards them to a
//! payment gateway (Mercado Pago or PagBank), persists the outcome and keeps
//! pending PIX payments reconciled with the gateway.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod validation;
pub mod workers;
