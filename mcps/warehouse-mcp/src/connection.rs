//! Persistent connection lifecycle
//!
//! The manager owns the one physical connection of the process. Access goes
//! through a [`Lease`], which holds an exclusive lock for its whole lifetime:
//! acquire, session options, query and reset all happen under one lease, so
//! no two executions can interleave on the connection-global options.
//!
//! State machine: `Absent → Live → (Live | Absent)`. Health is probed lazily
//! on every acquire; a failed probe drops the handle and reconnects once.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{Connector, Session, StoreError};

/// The live connection plus identity metadata
pub struct Handle {
    id: u64,
    created_at: DateTime<Utc>,
    session: Box<dyn Session>,
}

impl Handle {
    /// Identity of the physical connection; changes on every reconnect
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Live { id: u64, created_at: DateTime<Utc> },
}

#[derive(Default)]
struct Slot {
    handle: Option<Handle>,
    connects: u64,
}

/// Owner of the single persistent connection
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    slot: Arc<Mutex<Slot>>,
}

impl ConnectionManager {
    /// Create a manager in the `Absent` state; nothing connects until the
    /// first acquire
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Wait for exclusive access to the connection
    pub async fn lease(&self) -> Lease {
        Lease {
            slot: self.slot.clone().lock_owned().await,
            connector: self.connector.clone(),
        }
    }

    /// Current state, waiting for any in-flight lease to be released
    pub async fn state(&self) -> ConnectionState {
        self.lease().await.state()
    }
}

/// Exclusive access to the connection slot
///
/// Methods may block on the store and belong on a blocking thread. The lease
/// is `Send`, so it can move into the worker that does the store calls.
pub struct Lease {
    slot: OwnedMutexGuard<Slot>,
    connector: Arc<dyn Connector>,
}

impl Lease {
    /// Return the live handle, connecting or reconnecting as needed
    pub fn acquire(&mut self) -> Result<&mut Handle, StoreError> {
        let healthy = match self.slot.handle.as_mut() {
            Some(handle) => handle.session.is_alive(),
            None => false,
        };

        if healthy {
            tracing::debug!("Reusing existing healthy connection");
        } else {
            if let Some(stale) = self.slot.handle.take() {
                tracing::warn!(id = stale.id, "Connection failed health check, reconnecting");
            }
            self.connect()?;
        }

        self.slot
            .handle
            .as_mut()
            .ok_or_else(|| StoreError::ConnectionLost("no live connection".to_string()))
    }

    fn connect(&mut self) -> Result<(), StoreError> {
        tracing::info!("Connecting to data store");
        let session = self.connector.connect().map_err(|e| {
            tracing::error!("Failed to connect to data store: {}", e);
            e
        })?;

        self.slot.connects += 1;
        let handle = Handle {
            id: self.slot.connects,
            created_at: Utc::now(),
            session,
        };
        tracing::info!(id = handle.id, "Connected to data store");
        self.slot.handle = Some(handle);
        Ok(())
    }

    /// Drop the handle after a failure that indicates connection loss; the
    /// next acquire reconnects
    pub fn invalidate(&mut self) {
        if let Some(handle) = self.slot.handle.take() {
            tracing::warn!(id = handle.id, "Discarding lost connection");
            if let Err(e) = handle.session.close() {
                tracing::debug!("Close after connection loss failed: {}", e);
            }
        }
    }

    /// Close the connection for process shutdown. Returns whether a live
    /// connection was closed.
    pub fn teardown(&mut self) -> bool {
        let Some(handle) = self.slot.handle.take() else {
            return false;
        };

        match handle.session.close() {
            Ok(()) => tracing::info!(id = handle.id, "Disconnected from data store"),
            Err(e) => tracing::error!(id = handle.id, "Error closing connection: {}", e),
        }
        true
    }

    pub fn state(&self) -> ConnectionState {
        match &self.slot.handle {
            Some(handle) => ConnectionState::Live {
                id: handle.id,
                created_at: handle.created_at,
            },
            None => ConnectionState::Absent,
        }
    }

    /// End exclusive access
    pub fn release(self) {}
}
