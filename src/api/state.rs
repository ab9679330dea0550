use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::controller::SessionController;
use crate::host::HostProvider;

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state
pub struct AppState {
    pub controller: Arc<SessionController>,

    /// Resolves tab ids to page hosts
    pub hosts: Arc<dyn HostProvider>,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    /// Total connection count (for metrics)
    connection_count: AtomicUsize,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>, hosts: Arc<dyn HostProvider>) -> Self {
        Self {
            controller,
            hosts,
            connected_clients: DashMap::new(),
            connection_count: AtomicUsize::new(0),
        }
    }

    /// Register a WebSocket client connection
    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        let count = self.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Client {} connected (total: {}, active: {})",
            client_id,
            count,
            self.connected_clients.len()
        );
    }

    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                client.connected_at.elapsed(),
                self.connected_clients.len()
            );
        }
    }
}
