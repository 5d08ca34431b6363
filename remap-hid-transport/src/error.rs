//! Transport error types.

use std::io;
use thiserror::Error;

use crate::EndpointId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("endpoint {0:?} is not registered with the pool")]
    UnknownEndpoint(EndpointId),

    #[error("endpoint {0:?} has exhausted its reconnect budget")]
    ReconnectExhausted(EndpointId),

    #[error("datagram send on {endpoint:?} failed, falling back to stream: {source}")]
    DatagramFallback { endpoint: EndpointId, source: io::Error },

    #[error("stream I/O on {endpoint:?} failed: {source}")]
    StreamIo { endpoint: EndpointId, source: io::Error },

    #[error("connect to {endpoint:?} failed: {source}")]
    Connect { endpoint: EndpointId, source: io::Error },
}
