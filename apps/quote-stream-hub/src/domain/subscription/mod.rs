//! Subscription Registry
//!
//! The single source of truth for "who is listening to what": symbol →
//! subscriber sets with reference counting, per-user alert/portfolio channel
//! membership, and per-connection state.
//!
//! # Design
//!
//! Every mutation (subscribe, unsubscribe, disconnect, channel join) takes
//! one mutex over the whole registry state. The critical sections are map
//! operations only, so serializing them is cheap and rules out lost updates
//! such as two disconnects racing on a reference-count decrement.
//!
//! The registry never talks to the poller directly. Mutations return an
//! outcome listing the symbols that transitioned 0→1 (`activated`) or 1→0
//! (`deactivated`) subscribers; the caller applies those to the poll-task
//! map. This keeps activation and teardown decisions inside the same
//! critical section that changed the counts.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::alert::UserId;
use crate::domain::quote::{self, Symbol};

/// Default cap on distinct symbols per connection.
pub const DEFAULT_SYMBOL_CAP: usize = 20;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Rejection of a price subscription request. Nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// The request would exceed the per-connection symbol cap.
    #[error("symbol limit exceeded: {requested} symbols requested, limit is {limit}")]
    SymbolLimitExceeded {
        /// Configured cap.
        limit: usize,
        /// Distinct symbols the connection would hold after the request.
        requested: usize,
    },
    /// A symbol in the request failed validation.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),
    /// The connection was never registered or already disconnected.
    #[error("unknown connection")]
    UnknownConnection,
}

impl From<quote::InvalidSymbol> for SubscribeError {
    fn from(err: quote::InvalidSymbol) -> Self {
        Self::InvalidSymbol(err.0)
    }
}

/// Rejection of an alerts/portfolio channel join.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelJoinError {
    /// The connection presented no identity at handshake.
    #[error("authentication required")]
    AuthRequired,
    /// The connection was never registered or already disconnected.
    #[error("unknown connection")]
    UnknownConnection,
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a successful subscribe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// Normalized symbol list actually applied (request order, deduplicated).
    pub applied: Vec<Symbol>,
    /// Symbols whose subscriber count went 0→1; a poll task must start.
    pub activated: Vec<Symbol>,
}

/// Result of a successful unsubscribe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    /// Normalized symbol list that was requested (membership or not).
    pub removed: Vec<Symbol>,
    /// Symbols whose subscriber count went 1→0; the poll task must stop.
    pub deactivated: Vec<Symbol>,
}

/// Result of a disconnect sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Symbols whose subscriber count went 1→0; the poll task must stop.
    pub deactivated: Vec<Symbol>,
}

/// Registry counters for the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live connections.
    pub connections: usize,
    /// Connections with an attached identity.
    pub authenticated: usize,
    /// Symbols with at least one subscriber.
    pub symbols: usize,
    /// Users with at least one alert-channel connection.
    pub alert_channel_users: usize,
    /// Users with at least one portfolio-channel connection.
    pub portfolio_channel_users: usize,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct ConnectionEntry {
    user_id: Option<UserId>,
    symbols: HashSet<Symbol>,
    alerts: bool,
    portfolio: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    symbols: HashMap<Symbol, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
    alert_channels: HashMap<UserId, HashSet<ConnectionId>>,
    portfolio_channels: HashMap<UserId, HashSet<ConnectionId>>,
}

// =============================================================================
// Registry
// =============================================================================

/// Serialized coordinator for symbol subscriptions and user channels.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    symbol_cap: usize,
    state: Mutex<RegistryState>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create a registry with the default per-connection symbol cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_symbol_cap(DEFAULT_SYMBOL_CAP)
    }

    /// Create a registry with a custom per-connection symbol cap.
    #[must_use]
    pub fn with_symbol_cap(symbol_cap: usize) -> Self {
        Self {
            symbol_cap,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a connection at handshake time with its optional identity.
    pub fn register(&self, connection: ConnectionId, user_id: Option<UserId>) {
        let mut state = self.state.lock();

        if let Some(user) = &user_id {
            state.users.entry(user.clone()).or_default().insert(connection);
        }

        state.connections.insert(
            connection,
            ConnectionEntry {
                user_id,
                ..ConnectionEntry::default()
            },
        );
    }

    /// Subscribe a connection to a list of symbols.
    ///
    /// Rejects the whole request, with no partial change, when the resulting
    /// distinct-symbol count would exceed the cap or any symbol is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError`] for an unknown connection, an invalid
    /// symbol, or a cap violation.
    pub fn subscribe(
        &self,
        connection: ConnectionId,
        raw_symbols: &[String],
    ) -> Result<SubscribeOutcome, SubscribeError> {
        let applied = quote::normalize_symbols(raw_symbols)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(&connection)
            .ok_or(SubscribeError::UnknownConnection)?;

        let additions = applied
            .iter()
            .filter(|s| !entry.symbols.contains(*s))
            .count();
        let requested = entry.symbols.len() + additions;
        if requested > self.symbol_cap {
            return Err(SubscribeError::SymbolLimitExceeded {
                limit: self.symbol_cap,
                requested,
            });
        }

        let mut activated = Vec::new();
        for symbol in &applied {
            if entry.symbols.insert(symbol.clone()) {
                let subscribers = state.symbols.entry(symbol.clone()).or_default();
                subscribers.insert(connection);
                if subscribers.len() == 1 {
                    activated.push(symbol.clone());
                }
            }
        }

        Ok(SubscribeOutcome { applied, activated })
    }

    /// Unsubscribe a connection from a list of symbols.
    ///
    /// Symbols the connection never subscribed to are a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError`] for an unknown connection or an invalid
    /// symbol.
    pub fn unsubscribe(
        &self,
        connection: ConnectionId,
        raw_symbols: &[String],
    ) -> Result<UnsubscribeOutcome, SubscribeError> {
        let removed = quote::normalize_symbols(raw_symbols)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(&connection)
            .ok_or(SubscribeError::UnknownConnection)?;

        let mut deactivated = Vec::new();
        for symbol in &removed {
            if entry.symbols.remove(symbol)
                && Self::drop_subscriber(&mut state.symbols, symbol, connection)
            {
                deactivated.push(symbol.clone());
            }
        }

        Ok(UnsubscribeOutcome {
            removed,
            deactivated,
        })
    }

    /// Remove a connection from every symbol and channel it belongs to.
    ///
    /// Idempotent: disconnecting an unknown connection changes nothing.
    pub fn disconnect(&self, connection: ConnectionId) -> DisconnectOutcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(entry) = state.connections.remove(&connection) else {
            return DisconnectOutcome::default();
        };

        let mut deactivated = Vec::new();
        for symbol in &entry.symbols {
            if Self::drop_subscriber(&mut state.symbols, symbol, connection) {
                deactivated.push(symbol.clone());
            }
        }

        if let Some(user) = &entry.user_id {
            Self::drop_member(&mut state.users, user, connection);
            if entry.alerts {
                Self::drop_member(&mut state.alert_channels, user, connection);
            }
            if entry.portfolio {
                Self::drop_member(&mut state.portfolio_channels, user, connection);
            }
        }

        DisconnectOutcome { deactivated }
    }

    /// Join the per-user alerts channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelJoinError::AuthRequired`] for anonymous connections.
    pub fn join_alerts(&self, connection: ConnectionId) -> Result<UserId, ChannelJoinError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(&connection)
            .ok_or(ChannelJoinError::UnknownConnection)?;
        let user = entry
            .user_id
            .clone()
            .ok_or(ChannelJoinError::AuthRequired)?;

        entry.alerts = true;
        state
            .alert_channels
            .entry(user.clone())
            .or_default()
            .insert(connection);

        Ok(user)
    }

    /// Join the per-user portfolio channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelJoinError::AuthRequired`] for anonymous connections.
    pub fn join_portfolio(&self, connection: ConnectionId) -> Result<UserId, ChannelJoinError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(&connection)
            .ok_or(ChannelJoinError::UnknownConnection)?;
        let user = entry
            .user_id
            .clone()
            .ok_or(ChannelJoinError::AuthRequired)?;

        entry.portfolio = true;
        state
            .portfolio_channels
            .entry(user.clone())
            .or_default()
            .insert(connection);

        Ok(user)
    }

    // =========================================================================
    // Snapshot queries
    // =========================================================================

    /// Current subscribers of a symbol.
    #[must_use]
    pub fn symbol_subscribers(&self, symbol: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .symbols
            .get(symbol)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers of a symbol.
    #[must_use]
    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.state.lock().symbols.get(symbol).map_or(0, HashSet::len)
    }

    /// Symbols with at least one subscriber.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.state.lock().symbols.keys().cloned().collect()
    }

    /// Symbols a connection is subscribed to.
    #[must_use]
    pub fn connection_symbols(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.state
            .lock()
            .connections
            .get(&connection)
            .map(|entry| entry.symbols.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A user's alert-channel connections.
    #[must_use]
    pub fn alert_channel_members(&self, user_id: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .alert_channels
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// A user's portfolio-channel connections.
    #[must_use]
    pub fn portfolio_channel_members(&self, user_id: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .portfolio_channels
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every live connection of a user, channel membership or not.
    #[must_use]
    pub fn user_connections(&self, user_id: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .users
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Registry counters for the health endpoint.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            connections: state.connections.len(),
            authenticated: state
                .connections
                .values()
                .filter(|entry| entry.user_id.is_some())
                .count(),
            symbols: state.symbols.len(),
            alert_channel_users: state.alert_channels.len(),
            portfolio_channel_users: state.portfolio_channels.len(),
        }
    }

    // =========================================================================
    // Internal helpers (called under the state lock)
    // =========================================================================

    /// Remove one subscriber; returns true when the symbol reached zero.
    fn drop_subscriber(
        symbols: &mut HashMap<Symbol, HashSet<ConnectionId>>,
        symbol: &str,
        connection: ConnectionId,
    ) -> bool {
        if let Some(subscribers) = symbols.get_mut(symbol) {
            subscribers.remove(&connection);
            if subscribers.is_empty() {
                symbols.remove(symbol);
                return true;
            }
        }
        false
    }

    fn drop_member(
        channels: &mut HashMap<UserId, HashSet<ConnectionId>>,
        user: &str,
        connection: ConnectionId,
    ) {
        if let Some(members) = channels.get_mut(user) {
            members.remove(&connection);
            if members.is_empty() {
                channels.remove(user);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
