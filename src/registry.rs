//! Request-id allocation and live-session tracking.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;

use crate::connection::Connection;
use crate::error::{FcgiError, Result};
use crate::socket::Socket;

/// Collision-retry cap for id allocation.
const MAX_ALLOCATION_ATTEMPTS: usize = 10;

/// A FastCGI request id: 1..=65535, 0 is reserved by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u16);

impl SocketId {
    pub fn new(value: u16) -> Result<Self> {
        if value == 0 {
            return Err(FcgiError::InvalidArgument(
                "socket ID 0 is reserved by the protocol".into(),
            ));
        }
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        Self(rand::thread_rng().gen_range(1..=u16::MAX))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared index of live sessions, keyed by request id.
///
/// The registry is the only state shared across sessions; a plain mutex
/// around the map serializes allocation, lookup, and removal. Sessions
/// themselves live behind an async mutex so one caller at a time drives a
/// session across await points; a lock held by a driver counts as busy.
#[derive(Debug, Default)]
pub struct SocketRegistry {
    sockets: Mutex<HashMap<u16, Arc<AsyncMutex<Socket>>>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session under a freshly generated unique id.
    ///
    /// Generation retries on collision up to the attempt cap, then fails.
    pub fn allocate(&self, connection: Connection) -> Result<Arc<AsyncMutex<Socket>>> {
        self.allocate_with(connection, SocketId::generate)
    }

    fn allocate_with<F>(&self, connection: Connection, mut generate: F) -> Result<Arc<AsyncMutex<Socket>>>
    where
        F: FnMut() -> SocketId,
    {
        let mut sockets = self.sockets.lock().expect("socket registry poisoned");
        let id = (0..MAX_ALLOCATION_ATTEMPTS)
            .map(|_| generate())
            .find(|id| !sockets.contains_key(&id.value()))
            .ok_or_else(|| FcgiError::Write("could not allocate a new socket ID".into()))?;
        let socket = Arc::new(AsyncMutex::new(Socket::new(id, connection)));
        sockets.insert(id.value(), Arc::clone(&socket));
        Ok(socket)
    }

    /// Look up a live session by id.
    pub fn get(&self, id: u16) -> Result<Arc<AsyncMutex<Socket>>> {
        self.sockets
            .lock()
            .expect("socket registry poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| FcgiError::Read(format!("socket not found for socket ID: {id}")))
    }

    pub fn exists(&self, id: u16) -> bool {
        self.sockets
            .lock()
            .expect("socket registry poisoned")
            .contains_key(&id)
    }

    /// Drop a session from the index. No-op when absent.
    pub fn remove(&self, id: u16) -> Option<Arc<AsyncMutex<Socket>>> {
        self.sockets
            .lock()
            .expect("socket registry poisoned")
            .remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.sockets
            .lock()
            .expect("socket registry poisoned")
            .is_empty()
    }

    /// True when any registered session is still driving a request. A
    /// session whose lock is currently held is by definition in use.
    pub fn has_busy_sockets(&self) -> bool {
        let sockets = self.sockets.lock().expect("socket registry poisoned");
        sockets.values().any(|socket| match socket.try_lock() {
            Ok(guard) => guard.is_busy(),
            Err(_) => true,
        })
    }
}
