//! Engine driver: ties the registry, sessions, and transport together.

use crate::connection::Connection;
use crate::error::Result;
use crate::registry::SocketRegistry;
use crate::request::Request;
use crate::response::Response;

/// FastCGI client. Each request gets its own session and connection; the
/// registry tracks sessions between the send and read phases.
///
/// Sessions are always removed from the registry and their streams closed
/// when a request finishes, whether it completed, timed out, or failed.
#[derive(Debug, Default)]
pub struct Client {
    sockets: SocketRegistry,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a request and block (asynchronously) for its response.
    pub async fn send_request(
        &self,
        connection: Connection,
        request: &Request,
    ) -> Result<Response> {
        let socket_id = self.send_async_request(connection, request).await?;
        self.read_response(socket_id, None).await
    }

    /// Send a request without waiting for the response; returns the socket
    /// id to read it with. Several sessions can be in flight at once, which
    /// overlaps their network latency.
    pub async fn send_async_request(
        &self,
        connection: Connection,
        request: &Request,
    ) -> Result<u16> {
        let socket = self.sockets.allocate(connection)?;
        let mut session = socket.lock().await;
        let socket_id = session.id().value();

        if let Err(e) = session.send_request(request).await {
            session.disconnect().await;
            drop(session);
            self.sockets.remove(socket_id);
            return Err(e);
        }
        Ok(socket_id)
    }

    /// Read the response for a previously sent request. The session is
    /// released and its connection closed on every exit path.
    pub async fn read_response(
        &self,
        socket_id: u16,
        timeout_ms: Option<u64>,
    ) -> Result<Response> {
        let socket = self.sockets.get(socket_id)?;
        let mut session = socket.lock().await;

        let result = session.fetch_response(timeout_ms).await;
        session.disconnect().await;
        drop(session);
        self.sockets.remove(socket_id);
        result
    }

    /// True while any session has been sent but not yet read — in-flight
    /// work a caller should drain before shutdown.
    pub fn has_unhandled_responses(&self) -> bool {
        self.sockets.has_busy_sockets()
    }
}
