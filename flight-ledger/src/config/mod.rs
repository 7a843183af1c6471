//! Configuration module for flight-ledger.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;

use crate::models::InvoiceStatus;
use crate::services::allocation::TrancheBands;
use crate::services::classifier::{DEFAULT_COURSE_KEYWORDS, DEFAULT_HOUR_UNITS};
use crate::services::fifo::DEFAULT_LOW_HOURS_THRESHOLD;

/// Rows per retrieval window; the backing store caps pages at this size.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Knobs of the ledger computation itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub course_total_hours: Decimal,
    pub low_hours_threshold: Decimal,
    pub hour_unit_codes: Vec<String>,
    pub course_keywords: Vec<String>,
    pub tranche_bands: TrancheBands,
    pub page_size: usize,
    pub max_pages: usize,
    /// Invoices in these states count as purchases.
    pub invoice_statuses: Vec<InvoiceStatus>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            course_total_hours: Decimal::from(45),
            low_hours_threshold: DEFAULT_LOW_HOURS_THRESHOLD,
            hour_unit_codes: DEFAULT_HOUR_UNITS.iter().map(|s| s.to_string()).collect(),
            course_keywords: DEFAULT_COURSE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            tranche_bands: TrancheBands::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            invoice_statuses: vec![InvoiceStatus::Issued, InvoiceStatus::Paid],
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "flight-ledger".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig::from_lookup(|key| env::var(key).ok())?,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("DATABASE_URL")
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required")))?;
        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => parse_connections("DATABASE_MAX_CONNECTIONS", &v)?,
            None => 10,
        };
        let min_connections = match get("DATABASE_MIN_CONNECTIONS") {
            Some(v) => parse_connections("DATABASE_MIN_CONNECTIONS", &v)?,
            None => 2.min(max_connections),
        };
        if min_connections > max_connections {
            return Err(invalid(
                "DATABASE_MIN_CONNECTIONS",
                &min_connections.to_string(),
                "must not exceed DATABASE_MAX_CONNECTIONS",
            ));
        }

        Ok(Self {
            url,
            max_connections,
            min_connections,
        })
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take their defaults;
    /// set but invalid values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let course_total_hours = match get("COURSE_TOTAL_HOURS") {
            Some(v) => parse_positive_decimal("COURSE_TOTAL_HOURS", &v)?,
            None => defaults.course_total_hours,
        };
        let low_hours_threshold = match get("LOW_HOURS_THRESHOLD") {
            Some(v) => {
                let value = parse_decimal("LOW_HOURS_THRESHOLD", &v)?;
                if value < Decimal::ZERO {
                    return Err(invalid("LOW_HOURS_THRESHOLD", &v, "must not be negative"));
                }
                value
            }
            None => defaults.low_hours_threshold,
        };
        let hour_unit_codes = match get("HOUR_UNIT_CODES") {
            Some(v) => parse_list("HOUR_UNIT_CODES", &v)?,
            None => defaults.hour_unit_codes,
        };
        let course_keywords = match get("COURSE_KEYWORDS") {
            Some(v) => parse_list("COURSE_KEYWORDS", &v)?,
            None => defaults.course_keywords,
        };
        let tranche_bands = match get("TRANCHE_AMOUNT_BANDS") {
            Some(v) => TrancheBands::parse(&v)
                .map_err(|e| invalid("TRANCHE_AMOUNT_BANDS", &v, &e.to_string()))?,
            None => defaults.tranche_bands,
        };
        let page_size = match get("RETRIEVAL_PAGE_SIZE") {
            Some(v) => parse_positive_usize("RETRIEVAL_PAGE_SIZE", &v)?,
            None => defaults.page_size,
        };
        let max_pages = match get("RETRIEVAL_MAX_PAGES") {
            Some(v) => parse_positive_usize("RETRIEVAL_MAX_PAGES", &v)?,
            None => defaults.max_pages,
        };
        let invoice_statuses = match get("INVOICE_STATUSES") {
            Some(v) => parse_list("INVOICE_STATUSES", &v)?
                .iter()
                .map(|s| {
                    InvoiceStatus::from_string(s)
                        .ok_or_else(|| invalid("INVOICE_STATUSES", s, "unknown invoice status"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.invoice_statuses,
        };

        Ok(Self {
            course_total_hours,
            low_hours_threshold,
            hour_unit_codes,
            course_keywords,
            tranche_bands,
            page_size,
            max_pages,
            invoice_statuses,
        })
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{}={:?}: {}", key, value, reason))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(value.trim()).map_err(|e| invalid(key, value, &e.to_string()))
}

fn parse_positive_decimal(key: &str, value: &str) -> Result<Decimal, AppError> {
    let parsed = parse_decimal(key, value)?;
    if parsed <= Decimal::ZERO {
        return Err(invalid(key, value, "must be positive"));
    }
    Ok(parsed)
}

fn parse_positive_usize(key: &str, value: &str) -> Result<usize, AppError> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(invalid(key, value, "must be positive")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(key, value, &e.to_string())),
    }
}

fn parse_connections(key: &str, value: &str) -> Result<u32, AppError> {
    let parsed = parse_positive_usize(key, value)?;
    u32::try_from(parsed).map_err(|e| invalid(key, value, &e.to_string()))
}

fn parse_list(key: &str, value: &str) -> Result<Vec<String>, AppError> {
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return Err(invalid(key, value, "must list at least one value"));
    }
    Ok(items)
}
