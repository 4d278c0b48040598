//! Registry of cancellation handles for the connections a server is currently serving.

use crate::CancelToken;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an accepted connection.
///
/// Identities increase monotonically and are never reused, even after the connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identity.
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Concurrent map from connection identity to that connection's [`CancelToken`].
///
/// Entries are added and removed by the connection handlers themselves. The shutdown controller
/// only ever calls [`cancel_all`](Registry::cancel_all), which never removes anything, so an
/// entry is removed exactly once, by its owner.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<ConnectionId, CancelToken>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` under `id`, replacing any previous entry.
    pub fn insert(&self, id: ConnectionId, token: CancelToken) {
        self.lock().insert(id, token);
    }

    /// Remove the entry for `id`, returning its token if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<CancelToken> {
        self.lock().remove(&id)
    }

    /// Return true if `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Return how many connections are registered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Return true if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancel every registered connection.
    ///
    /// Tokens are fired outside the lock, and entries stay in place until their handlers exit.
    /// Returns the number of tokens this call actually cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancelToken> = self.lock().values().cloned().collect();
        tokens.iter().filter(|token| token.cancel()).count()
    }

    /// Allocate a fresh identity and token and register them until the returned
    /// [`Registration`] is dropped.
    pub fn register(self: &Arc<Self>) -> Registration {
        let id = ConnectionId::next();
        let token = CancelToken::new();
        self.insert(id, token.clone());
        Registration {
            registry: Arc::clone(self),
            id,
            token,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, CancelToken>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection's entry in a [`Registry`]; removed when dropped.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<Registry>,
    id: ConnectionId,
    token: CancelToken,
}

impl Registration {
    /// The identity this registration was given.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The cancellation token registered for this connection.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
