//! The small vocabulary the pool actor moves between `remap-core`'s
//! post-processor and the outbound socket: an endpoint identifier and the
//! already-encoded bytes of one report frame.

use std::path::PathBuf;

/// Identifies one registered outbound endpoint (one virtual HID device's
/// socket). Assigned by the caller at [`crate::pool::ConnectionPool::register`]
/// time — the pool does not invent its own numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u32);

/// Where an endpoint's Unix datagram and fallback stream sockets live.
#[derive(Debug, Clone)]
pub struct EndpointAddress {
    pub datagram_path: PathBuf,
    pub stream_path: PathBuf,
}

/// One already-encoded HID report, ready to go on the wire. `remap-core`'s
/// `post_processor::Frame` is encoded into this by the caller (`remapd` or
/// `remap-virtual-device`) before it reaches this crate — the pool has no
/// opinion on report layout, only on getting bytes to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFrame(pub Vec<u8>);
