//! The per-endpoint connection pool: one entry per
//! registered virtual-HID-device socket. Delivery prefers an unreliable
//! but cheap `UnixDatagram`; a send failure falls back to establishing (or
//! re-establishing) a length-prefixed `UnixStream`, and a consecutive
//! string of failures on both backs the endpoint off exponentially.

use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixDatagram, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::error::TransportError;
use crate::types::{EndpointAddress, EndpointId, ReportFrame};

struct EndpointState {
    address: EndpointAddress,
    datagram: Option<UnixDatagram>,
    stream: Option<UnixStream>,
    backoff: Backoff,
}

impl EndpointState {
    fn new(address: EndpointAddress) -> Self {
        Self {
            address,
            datagram: None,
            stream: None,
            backoff: Backoff::new(),
        }
    }
}

/// Holds every registered endpoint behind one `tokio::sync::Mutex` — reports
/// are emitted one pass at a time by the pipeline worker, so contention is
/// not a concern; correctness (never interleaving two frames' bytes on the
/// same socket) is.
pub struct ConnectionPool {
    endpoints: Mutex<HashMap<EndpointId, EndpointState>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, id: EndpointId, address: EndpointAddress) {
        self.endpoints.lock().await.insert(id, EndpointState::new(address));
    }

    pub async fn unregister(&self, id: EndpointId) {
        self.endpoints.lock().await.remove(&id);
    }

    /// Sends one frame to `id`'s endpoint. Tries the datagram path first;
    /// on failure, falls back to the stream path, reconnecting either
    /// socket lazily. A success on either path resets the endpoint's
    /// backoff; a failure on both records one more consecutive failure.
    pub async fn send(&self, id: EndpointId, frame: &ReportFrame) -> Result<(), TransportError> {
        let mut endpoints = self.endpoints.lock().await;
        let state = endpoints.get_mut(&id).ok_or(TransportError::UnknownEndpoint(id))?;

        if state.backoff.exhausted() {
            return Err(TransportError::ReconnectExhausted(id));
        }

        match send_datagram(id, state, frame).await {
            Ok(()) => {
                state.backoff.record_success();
                Ok(())
            }
            Err(datagram_err) => {
                debug!(endpoint = id.0, %datagram_err, "datagram send failed, falling back to stream");
                match send_stream(id, state, frame).await {
                    Ok(()) => {
                        state.backoff.record_success();
                        Ok(())
                    }
                    Err(stream_err) => {
                        state.datagram = None;
                        state.stream = None;
                        state.backoff.record_failure();
                        warn!(endpoint = id.0, %stream_err, "stream fallback also failed");
                        Err(stream_err)
                    }
                }
            }
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

async fn send_datagram(id: EndpointId, state: &mut EndpointState, frame: &ReportFrame) -> Result<(), TransportError> {
    if state.datagram.is_none() {
        let socket = UnixDatagram::unbound().map_err(|source| TransportError::Connect { endpoint: id, source })?;
        socket
            .connect(&state.address.datagram_path)
            .map_err(|source| TransportError::Connect { endpoint: id, source })?;
        state.datagram = Some(socket);
    }
    let socket = state.datagram.as_ref().expect("just populated above");
    socket
        .send(&frame.0)
        .await
        .map_err(|source| TransportError::DatagramFallback { endpoint: id, source })?;
    Ok(())
}

async fn send_stream(id: EndpointId, state: &mut EndpointState, frame: &ReportFrame) -> Result<(), TransportError> {
    if state.stream.is_none() {
        let stream = UnixStream::connect(&state.address.stream_path)
            .await
            .map_err(|source| TransportError::Connect { endpoint: id, source })?;
        state.stream = Some(stream);
    }
    let stream = state.stream.as_mut().expect("just populated above");

    let len = u32::try_from(frame.0.len()).unwrap_or(u32::MAX);
    let write = async {
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(&frame.0).await
    };
    write.await.map_err(|source| {
        state.stream = None;
        TransportError::StreamIo { endpoint: id, source }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn address(dir: &tempfile::TempDir) -> EndpointAddress {
        EndpointAddress {
            datagram_path: dir.path().join("dgram.sock"),
            stream_path: dir.path().join("stream.sock"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_stream_when_no_datagram_listener_exists() {
        let dir = tempfile::tempdir().unwrap();
        let address = address(&dir);
        let listener = UnixListener::bind(&address.stream_path).unwrap();

        let pool = ConnectionPool::new();
        pool.register(EndpointId(1), address).await;

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(&mut socket, &mut len_buf).await.unwrap();
            u32::from_be_bytes(len_buf)
        });

        pool.send(EndpointId(1), &ReportFrame(vec![1, 2, 3])).await.unwrap();
        let received_len = accept.await.unwrap();
        assert_eq!(received_len, 3);
    }

    #[tokio::test]
    async fn unknown_endpoint_is_rejected() {
        let pool = ConnectionPool::new();
        let err = pool.send(EndpointId(99), &ReportFrame(vec![])).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownEndpoint(EndpointId(99))));
    }

    #[tokio::test]
    async fn exhausted_backoff_is_rejected_without_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::new();
        pool.register(EndpointId(1), address(&dir)).await;

        for _ in 0..20 {
            let _ = pool.send(EndpointId(1), &ReportFrame(vec![9])).await;
        }
        let err = pool.send(EndpointId(1), &ReportFrame(vec![9])).await.unwrap_err();
        assert!(matches!(err, TransportError::ReconnectExhausted(EndpointId(1))));
    }
}
