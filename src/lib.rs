//! Async FastCGI client engine.
//!
//! Frames one request as a sequence of typed packets, writes it to a
//! responder (e.g. PHP-FPM) over TCP or a unix-domain socket, and decodes
//! the paired STDOUT/STDERR/END_REQUEST stream back into a [`Response`].
//!
//! ```no_run
//! use fcgi_client::{Client, Connection, Request, RequestMethod};
//!
//! # async fn run() -> fcgi_client::Result<()> {
//! let client = Client::new();
//! let connection = Connection::tcp("127.0.0.1", 9000);
//! let request = Request::new(RequestMethod::Get, "/var/www/index.php")
//!     .with_server_param("QUERY_STRING", "page=1");
//! let response = client.send_request(connection, &request).await?;
//! assert!(response.successful());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod content;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod response;
pub mod socket;

pub use client::Client;
pub use connection::{Address, Connection, FcgiStream};
pub use content::Content;
pub use error::{FcgiError, Result};
pub use registry::{SocketId, SocketRegistry};
pub use request::{Request, RequestDefaults, RequestMethod};
pub use response::Response;
pub use socket::{Socket, SocketStatus};
