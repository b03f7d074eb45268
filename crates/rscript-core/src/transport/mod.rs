//! Local transport between the bridge and the host.
//!
//! Every message is a 4-byte little-endian length followed by the payload.
//! A connection carries one request frame and one response frame, then closes.

mod endpoint;
mod frame;
mod message;

use std::time::Duration;

use thiserror::Error;

pub use endpoint::{
    AsyncStream, Connection, ENDPOINT_ENV, Endpoint, Listener, connect, connect_blocking,
};
pub use frame::{
    DEFAULT_MAX_FRAME_LEN, read_frame_blocking, recv_frame, send_frame, write_frame_blocking,
};
pub use message::Request;

/// Transport failures.
///
/// Each variant maps to a different user action on the client side, so they
/// are kept apart rather than folded into `std::io::Error`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Nothing is listening on the endpoint.
    #[error("server is not running on {endpoint}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint exists but did not accept the connection in time.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// The peer accepted the connection but stopped sending.
    #[error("no response within {0:?}")]
    ReadTimeout(Duration),

    /// The peer stopped reading before the response was written.
    #[error("response not accepted within {0:?}")]
    WriteTimeout(Duration),

    /// The peer closed the stream before a whole frame arrived.
    #[error("connection closed after {received} of {expected} bytes")]
    Disconnected { expected: usize, received: usize },

    /// The length prefix exceeds the configured limit.
    #[error("frame length {length} exceeds limit of {limit} bytes")]
    FrameTooLarge { length: usize, limit: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the peer was never reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable { .. } | TransportError::ConnectTimeout { .. }
        )
    }

    /// Whether the stream ended cleanly between frames, before any byte of
    /// the next length prefix.
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            TransportError::Disconnected { expected: frame::PREFIX_LEN, received: 0 }
        )
    }

    /// Suggestion for the user, if there is an obvious one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            TransportError::Unreachable { .. } | TransportError::ConnectTimeout { .. } => {
                Some("start the host (rscript-host) or check --endpoint")
            }
            TransportError::ReadTimeout(_) => {
                Some("the host is busy or stalled; raise --timeout or check the host log")
            }
            TransportError::WriteTimeout(_) => {
                Some("the client stopped reading; check that it is still running")
            }
            TransportError::Disconnected { .. } => {
                Some("the host closed the connection; it may have been stopped")
            }
            TransportError::FrameTooLarge { .. } => {
                Some("the peer is not speaking the rscript protocol")
            }
            TransportError::Io(_) => None,
        }
    }
}
