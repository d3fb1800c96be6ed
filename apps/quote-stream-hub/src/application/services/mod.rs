//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `alerts`: evaluates quotes against ACTIVE alerts and drives the
//!   ACTIVE → TRIGGERED transition

/// Alert evaluation against the quote stream.
pub mod alerts;
