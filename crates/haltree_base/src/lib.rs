/* 📖 # Why have haltree_base as a core library?
haltree_base provides the foundational error handling, tracing setup and HTTP plumbing
used across all crates. The engine only depends on the HttpService seam, never on the
socket-level server, which keeps the resolution core testable without a network.
*/

pub mod error;
pub mod http;
pub mod server;
pub mod tracing;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, HaltreeError, HaltreeResult, ResultExt};
pub use http::{
    HttpBody, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpServerConfig,
    HttpServerHandle, HttpService, HttpStatusCode,
};
pub use server::start_server;
