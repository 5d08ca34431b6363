//! Identifiers and timestamps shared across the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque small integer, stable for the lifetime of a seized device.
///
/// `0` is reserved for "virtual / synthetic / no device" — used by
/// manipulator-synthesized events that do not originate from any seized
/// hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub const ZERO: DeviceId = DeviceId(0);

    pub fn is_virtual(self) -> bool {
        self == Self::ZERO
    }
}

/// Opaque OS-provided id used only to map OS device objects to [`DeviceId`].
/// The mapping itself lives outside the core (grabber collaborator); this
/// type exists so the core's device registry can speak of it without
/// depending on OS-specific types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryEntryId(pub u64);

/// Monotonic, nanosecond timestamp. All queue ordering invariants are
/// expressed in terms of this type; it never represents wall-clock time
/// directly (see [`crate::event_queue::EventQueue::time_stamp_delay`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventTimeStamp(u64);

impl EventTimeStamp {
    pub const ZERO: EventTimeStamp = EventTimeStamp(0);

    pub fn from_nanoseconds(ns: u64) -> Self {
        Self(ns)
    }

    pub fn nanoseconds(self) -> u64 {
        self.0
    }

    pub fn milliseconds(self) -> u64 {
        self.0 / 1_000_000
    }

    pub fn plus_milliseconds(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms.saturating_mul(1_000_000)))
    }

    pub fn plus_nanoseconds(self, ns: u64) -> Self {
        Self(self.0.saturating_add(ns))
    }

    /// `true` if fewer than `ms` milliseconds elapsed between `self` (the
    /// earlier timestamp) and `other`.
    pub fn within_milliseconds(self, other: EventTimeStamp, ms: u64) -> bool {
        other.0.saturating_sub(self.0) < ms.saturating_mul(1_000_000)
    }
}

/// Identifies one exact [`crate::event_queue::EventQueueEntry`] across
/// asynchronous time — delayed-action callbacks and `to_if_held_down`
/// timers reference an activation by its triggering entry's id rather
/// than by queue position, since the queue is drained and rebuilt on
/// every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventQueueEntryId(u64);

impl EventQueueEntryId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

/// Allocates strictly-increasing, globally-unique [`EventQueueEntryId`]s.
///
/// One instance is shared (via cheap `Clone`) by every [`EventQueue`] in
/// the pipeline, so ids stay unique across the whole chain rather than
/// merely within one stage's queue.
///
/// [`EventQueue`]: crate::event_queue::EventQueue
#[derive(Debug, Clone)]
pub struct UniqueIdGenerator(Arc<AtomicU64>);

impl UniqueIdGenerator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub fn next(&self) -> EventQueueEntryId {
        EventQueueEntryId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UniqueIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_strictly_increase() {
        let gen = UniqueIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        let c = gen.next();
        assert!(a.get() < b.get());
        assert!(b.get() < c.get());
    }

    #[test]
    fn clones_share_the_same_counter() {
        let gen = UniqueIdGenerator::new();
        let clone = gen.clone();
        let a = gen.next();
        let b = clone.next();
        assert!(a.get() < b.get());
    }
}
