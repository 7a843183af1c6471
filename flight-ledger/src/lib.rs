//! Flight Ledger - Purchased vs. flown hour reconciliation for flight-school clients.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
