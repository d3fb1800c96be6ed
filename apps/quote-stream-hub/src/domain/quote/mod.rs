//! Quote Domain Types
//!
//! Price snapshot types produced by the upstream market-data provider and
//! symbol normalization rules shared by every subscription entry point.
//!
//! Quotes are ephemeral: they are produced by one poll cycle, fanned out to
//! subscribers, evaluated against alerts, and then dropped. Nothing in this
//! module is persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (uppercase stock ticker).
pub type Symbol = String;

/// Maximum accepted symbol length after normalization.
pub const MAX_SYMBOL_LEN: usize = 10;

// =============================================================================
// Symbol Normalization
// =============================================================================

/// A symbol that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid symbol: {0:?}")]
pub struct InvalidSymbol(pub String);

/// Normalize a raw symbol: trim, uppercase, validate charset and length.
///
/// Accepted symbols are 1 to [`MAX_SYMBOL_LEN`] characters from
/// `[A-Z0-9.-]` after uppercasing.
///
/// # Errors
///
/// Returns [`InvalidSymbol`] when the input is empty, too long, or contains
/// characters outside the accepted set.
pub fn normalize_symbol(raw: &str) -> Result<Symbol, InvalidSymbol> {
    let symbol = raw.trim().to_uppercase();

    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return Err(InvalidSymbol(raw.to_string()));
    }

    if !symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(InvalidSymbol(raw.to_string()));
    }

    Ok(symbol)
}

/// Normalize a list of raw symbols, preserving request order and dropping
/// duplicates after normalization.
///
/// # Errors
///
/// Returns [`InvalidSymbol`] for the first symbol that fails validation;
/// nothing is partially normalized.
pub fn normalize_symbols(raw: &[String]) -> Result<Vec<Symbol>, InvalidSymbol> {
    let mut normalized = Vec::with_capacity(raw.len());

    for item in raw {
        let symbol = normalize_symbol(item)?;
        if !normalized.contains(&symbol) {
            normalized.push(symbol);
        }
    }

    Ok(normalized)
}

// =============================================================================
// Quote Types
// =============================================================================

/// Session statistics attached to a quote.
///
/// Forwarded to clients only on the first (immediate) delivery for a newly
/// activated symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Session open.
    pub open: Decimal,
    /// Previous session close.
    pub previous_close: Decimal,
}

/// A single upstream price/volume snapshot for a symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change since previous close.
    pub change: Decimal,
    /// Percentage change since previous close.
    pub change_percent: Decimal,
    /// Session volume.
    pub volume: u64,
    /// Provider timestamp for this snapshot.
    pub timestamp: DateTime<Utc>,
    /// Session statistics, when the provider supplied them.
    pub session: Option<SessionStats>,
}

// =============================================================================
// Tests
// =============================================================================
