//! Client Session Handling
//!
//! Owns the lifecycle of one dashboard connection: handshake-time identity
//! resolution, ingress dispatch, the egress pump, and cleanup.
//!
//! A missing or invalid credential makes the session anonymous; it is not
//! an error. Cleanup (sink removal, registry disconnect, poll-task
//! teardown) runs exactly once per connection regardless of how the
//! session terminates — every exit path of the socket loop converges on the
//! single `cleanup` call at the end of `handle_socket`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::application::ports::IdentityVerifier;
use crate::domain::subscription::{ChannelJoinError, ConnectionId, SubscriptionRegistry};
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics;
use crate::infrastructure::poller::QuotePoller;
use crate::infrastructure::ws::messages::{ClientMessage, ServerMessage};

/// Manages dashboard client sessions.
pub struct ConnectionManager {
    registry: Arc<SubscriptionRegistry>,
    hub: SharedBroadcastHub,
    poller: Arc<QuotePoller>,
    verifier: Arc<dyn IdentityVerifier>,
    egress_capacity: usize,
}

impl ConnectionManager {
    /// Create a manager wiring sessions to the registry, hub and poller.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        hub: SharedBroadcastHub,
        poller: Arc<QuotePoller>,
        verifier: Arc<dyn IdentityVerifier>,
        egress_capacity: usize,
    ) -> Self {
        Self {
            registry,
            hub,
            poller,
            verifier,
            egress_capacity,
        }
    }

    /// Drive one WebSocket session to completion.
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, credential: Option<String>) {
        let connection = ConnectionId::new();

        let user_id = match credential {
            Some(token) => match self.verifier.verify(&token).await {
                Ok(identity) => Some(identity.user_id),
                Err(error) => {
                    tracing::debug!(
                        connection = %connection,
                        %error,
                        "Credential rejected, continuing anonymously"
                    );
                    None
                }
            },
            None => None,
        };

        self.registry.register(connection, user_id.clone());

        let (tx, mut rx) = mpsc::channel::<ServerMessage>(self.egress_capacity);
        self.hub.register_sink(connection, tx.clone());
        metrics::set_connections(self.hub.sink_count() as f64);
        tracing::info!(
            connection = %connection,
            authenticated = user_id.is_some(),
            "Connection established"
        );

        let greeting = ServerMessage::Connected {
            connection_id: connection,
            authenticated: user_id.is_some(),
            user_id,
        };
        let _ = tx.send(greeting).await;

        let (mut sink, mut stream) = socket.split();

        // Egress pump: drain the per-connection queue into the socket.
        let egress = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let payload = match serde_json::to_string(&frame) {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::warn!(%error, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        });

        // Ingress loop: every exit path falls through to cleanup below.
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(error) => {
                    tracing::debug!(connection = %connection, %error, "WebSocket receive error");
                    break;
                }
            };

            match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(request) => self.dispatch(connection, request, &tx).await,
                Err(error) => {
                    let _ = tx
                        .send(ServerMessage::error(format!("Unrecognized message: {error}")))
                        .await;
                }
            }
        }

        egress.abort();
        self.cleanup(connection);
    }

    /// Handle one parsed client request and queue the reply.
    async fn dispatch(
        &self,
        connection: ConnectionId,
        request: ClientMessage,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match request {
            ClientMessage::SubscribePrices { symbols } => {
                match self.registry.subscribe(connection, &symbols) {
                    Ok(outcome) => {
                        self.poller.apply(&outcome.activated, &[]);
                        ServerMessage::SubscribedPrices {
                            symbols: outcome.applied,
                        }
                    }
                    Err(error) => ServerMessage::error(error.to_string()),
                }
            }
            ClientMessage::UnsubscribePrices { symbols } => {
                match self.registry.unsubscribe(connection, &symbols) {
                    Ok(outcome) => {
                        self.poller.apply(&[], &outcome.deactivated);
                        ServerMessage::UnsubscribedPrices {
                            symbols: outcome.removed,
                        }
                    }
                    Err(error) => ServerMessage::error(error.to_string()),
                }
            }
            ClientMessage::SubscribeAlerts => match self.registry.join_alerts(connection) {
                Ok(_) => ServerMessage::SubscribedAlerts,
                Err(ChannelJoinError::AuthRequired) => {
                    ServerMessage::error("Authentication required to subscribe to alerts")
                }
                Err(error) => ServerMessage::error(error.to_string()),
            },
            ClientMessage::SubscribePortfolio => match self.registry.join_portfolio(connection) {
                Ok(_) => ServerMessage::SubscribedPortfolio,
                Err(ChannelJoinError::AuthRequired) => {
                    ServerMessage::error("Authentication required to subscribe to portfolio updates")
                }
                Err(error) => ServerMessage::error(error.to_string()),
            },
        };

        let _ = tx.send(reply).await;
    }

    /// Tear down one connection: sink, registry membership, poll tasks.
    fn cleanup(&self, connection: ConnectionId) {
        self.hub.remove_sink(connection);
        let outcome = self.registry.disconnect(connection);
        self.poller.apply(&[], &outcome.deactivated);
        metrics::set_connections(self.hub.sink_count() as f64);
        tracing::info!(connection = %connection, "Connection closed");
    }
}
