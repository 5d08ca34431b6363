//! The event queue: the sole currency between pipeline stages, carrying
//! the ordering and timing invariants the rest of the core relies on.

use crate::event::{EventCode, InputEvent};
use crate::ids::{DeviceId, EventQueueEntryId, EventTimeStamp, UniqueIdGenerator};
use std::collections::{HashMap, VecDeque};

/// One queued event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQueueEntry {
    pub device_id: DeviceId,
    pub event_time_stamp: EventTimeStamp,
    pub event: InputEvent,
    /// The event exactly as received from the grabber, before any
    /// manipulator touched it. Used for `to_if_alone` bookkeeping and for
    /// reconstructing the queue when a simultaneous group aborts.
    pub original_event: InputEvent,
    /// Cleared once a manipulator absorbs this entry; a manipulator
    /// downstream in the chain must ignore an invalid entry.
    pub valid: bool,
    /// If true, this entry must not by itself cause modifier-flag frames
    /// to be emitted by the post-processor — it waits to be combined with
    /// a subsequent non-lazy event.
    pub lazy: bool,
    pub unique_id: EventQueueEntryId,
}

impl EventQueueEntry {
    pub fn event_type(&self) -> crate::event::EventType {
        self.event.event_type()
    }
}

/// Holds one stage's batch of entries.
#[derive(Debug, Clone)]
pub struct EventQueue {
    entries: VecDeque<EventQueueEntry>,
    last_event_time_by_code: HashMap<(DeviceId, EventCode), EventTimeStamp>,
    time_stamp_delay: u64,
    unique_id_generator: UniqueIdGenerator,
}

impl EventQueue {
    pub fn new(unique_id_generator: UniqueIdGenerator) -> Self {
        Self {
            entries: VecDeque::new(),
            last_event_time_by_code: HashMap::new(),
            time_stamp_delay: 0,
            unique_id_generator,
        }
    }

    pub fn unique_id_generator(&self) -> &UniqueIdGenerator {
        &self.unique_id_generator
    }

    /// Invariant-preserving append of a pre-built entry: if `entry.time`
    /// is strictly less than the current tail's, it is raised to match.
    /// The entry's own `unique_id` is
    /// left untouched — callers that want a fresh id should use
    /// [`Self::push_back_event`].
    pub fn push_back(&mut self, mut entry: EventQueueEntry) {
        if let Some(back) = self.entries.back() {
            if entry.event_time_stamp < back.event_time_stamp {
                entry.event_time_stamp = back.event_time_stamp;
            }
        }
        if let Some(code) = entry.event.code() {
            self.last_event_time_by_code
                .insert((entry.device_id, code), entry.event_time_stamp);
        }
        self.entries.push_back(entry);
        debug_assert!(
            self.entries
                .iter()
                .zip(self.entries.iter().skip(1))
                .all(|(a, b)| a.event_time_stamp <= b.event_time_stamp),
            "event queue ordering invariant violated"
        );
    }

    /// Convenience constructor-and-append: builds a fresh entry (with a
    /// newly-allocated `unique_id`) from `device_id`/`time`/`event` and
    /// pushes it.
    pub fn push_back_event(
        &mut self,
        device_id: DeviceId,
        time: EventTimeStamp,
        event: InputEvent,
    ) -> EventQueueEntryId {
        let unique_id = self.unique_id_generator.next();
        let entry = EventQueueEntry {
            device_id,
            event_time_stamp: time,
            original_event: event.clone(),
            event,
            valid: true,
            lazy: false,
            unique_id,
        };
        self.push_back(entry);
        unique_id
    }

    pub fn erase_front(&mut self) -> Option<EventQueueEntry> {
        self.entries.pop_front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_event_time_by_code.clear();
    }

    pub fn front(&self) -> Option<&EventQueueEntry> {
        self.entries.front()
    }

    pub fn back(&self) -> Option<&EventQueueEntry> {
        self.entries.back()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventQueueEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EventQueueEntry> {
        self.entries.iter_mut()
    }

    pub fn find_event_by_unique_id(&self, id: EventQueueEntryId) -> Option<&EventQueueEntry> {
        self.entries.iter().find(|e| e.unique_id == id)
    }

    pub fn find_event_by_unique_id_mut(
        &mut self,
        id: EventQueueEntryId,
    ) -> Option<&mut EventQueueEntry> {
        self.entries.iter_mut().find(|e| e.unique_id == id)
    }

    /// Reconstructs a queue from a recorded list of entries — used when a
    /// simultaneous-key group aborts and the absorbed entries must fall
    /// through to the rest of the chain unchanged but for monotonic
    /// timestamp bumping.
    pub fn make_queue(unique_id_generator: UniqueIdGenerator, original_entries: &[EventQueueEntry]) -> Self {
        let mut queue = Self::new(unique_id_generator);
        for entry in original_entries {
            let mut reverted = entry.clone();
            reverted.event = entry.original_event.clone();
            reverted.valid = true;
            reverted.lazy = false;
            queue.push_back(reverted);
        }
        queue
    }

    /// The last time an event with this `(device_id, code)` was seen,
    /// used for `to_if_alone` threshold checks.
    pub fn last_event_time(&self, device_id: DeviceId, code: EventCode) -> Option<EventTimeStamp> {
        self.last_event_time_by_code.get(&(device_id, code)).copied()
    }

    /// A per-queue bias that lets a manipulator space out synthesized
    /// events without re-reading the wall clock.
    pub fn increase_time_stamp_delay(&mut self, delta: u64) {
        self.time_stamp_delay = self.time_stamp_delay.saturating_add(delta);
    }

    pub fn get_time_stamp_delay(&self) -> u64 {
        self.time_stamp_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCode, KeyCode};

    fn queue() -> EventQueue {
        EventQueue::new(UniqueIdGenerator::new())
    }

    /// For any sequence of `push_back` calls, the resulting queue is
    /// sorted nondecreasing by `event_time_stamp`.
    #[test]
    fn push_back_keeps_nondecreasing_order() {
        let mut q = queue();
        q.push_back_event(
            DeviceId(1),
            EventTimeStamp::from_nanoseconds(100),
            InputEvent::KeyDown(EventCode::KeyCode(KeyCode::ESCAPE)),
        );
        q.push_back_event(
            DeviceId(1),
            EventTimeStamp::from_nanoseconds(50),
            InputEvent::KeyUp(EventCode::KeyCode(KeyCode::ESCAPE)),
        );

        let times: Vec<_> = q.iter().map(|e| e.event_time_stamp).collect();
        assert_eq!(times[0], EventTimeStamp::from_nanoseconds(100));
        // the second push carried an earlier timestamp than the tail, so
        // it must have been raised to match rather than going backwards.
        assert_eq!(times[1], EventTimeStamp::from_nanoseconds(100));
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn unique_ids_are_globally_unique_and_increasing() {
        let mut q = queue();
        let a = q.push_back_event(
            DeviceId(1),
            EventTimeStamp::from_nanoseconds(1),
            InputEvent::KeyDown(EventCode::KeyCode(KeyCode::ESCAPE)),
        );
        let b = q.push_back_event(
            DeviceId(1),
            EventTimeStamp::from_nanoseconds(2),
            InputEvent::KeyUp(EventCode::KeyCode(KeyCode::ESCAPE)),
        );
        assert!(a.get() < b.get());
    }

    #[test]
    fn find_by_unique_id_roundtrips() {
        let mut q = queue();
        let id = q.push_back_event(
            DeviceId(1),
            EventTimeStamp::from_nanoseconds(1),
            InputEvent::KeyDown(EventCode::KeyCode(KeyCode::ESCAPE)),
        );
        assert!(q.find_event_by_unique_id(id).is_some());
        let bogus = EventQueueEntryId::from_raw_for_test(id.get() + 1_000_000);
        assert!(q.find_event_by_unique_id(bogus).is_none());
    }
}
