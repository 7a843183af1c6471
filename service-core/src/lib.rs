//! service-core: Shared infrastructure for the flight-school back-office crates.
pub mod config;
pub mod error;
pub mod observability;
