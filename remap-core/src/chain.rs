//! The manipulator chain: the ordered arena of [`BasicManipulator`]s a
//! profile compiles into, and the per-pass broker that feeds it the
//! input queue and collects its output.
//!
//! Manipulators never need to reach back into the chain that owns them,
//! so the arena is just `manipulators: Vec<BasicManipulator>`, addressed
//! by index and iterated in rule order.

use crate::config::{CoreConfiguration, Profile};
use crate::environment::ManipulatorEnvironment;
use crate::event::InputEvent;
use crate::event_queue::EventQueue;
use crate::ids::{DeviceId, EventTimeStamp};
use crate::manipulator::{BasicManipulator, Posting};

/// Owns the ordered manipulators compiled from one profile's rules and
/// brokers one event-queue pass across all of them.
pub struct ManipulatorChain {
    manipulators: Vec<BasicManipulator>,
}

impl ManipulatorChain {
    /// Compiles every rule's manipulators, in order, merging the
    /// profile's global [`crate::config::Parameters`] with each
    /// manipulator's own overrides.
    pub fn from_profile(profile: &Profile) -> Self {
        let manipulators = profile
            .rules
            .iter()
            .flat_map(|rule| rule.manipulators.iter())
            .map(|definition| BasicManipulator::new(definition.clone(), &profile.parameters))
            .collect();
        Self { manipulators }
    }

    /// Rebuilds the chain from the configuration's selected profile.
    /// Callers are responsible for force-terminating the previous chain's
    /// live activations first.
    pub fn from_configuration(configuration: &CoreConfiguration) -> Option<Self> {
        configuration.selected_profile().map(Self::from_profile)
    }

    pub fn is_empty(&self) -> bool {
        self.manipulators.is_empty()
    }

    /// Runs one pass: every manipulator in order gets a chance to claim
    /// entries still valid in `queue` after the manipulators ahead of it
    /// ran. Because each
    /// manipulator mutates entries in place (clearing `valid`) rather
    /// than copying the queue into a private output buffer, "manipulator
    /// N's output becomes manipulator N+1's input" falls out of sharing
    /// the one queue across the pass — there is nothing left for N+1 to
    /// see once N has claimed an entry.
    pub fn process_queue(&mut self, queue: &mut EventQueue, environment: &mut ManipulatorEnvironment) -> Vec<Posting> {
        let mut postings = Vec::new();
        for manipulator in self.manipulators.iter_mut() {
            manipulator.process_queue(queue, environment, &mut postings);
        }
        postings
    }

    /// Drains every manipulator's `to_if_held_down`/`to_delayed_action`
    /// timers against `now` — the chain is what the pipeline worker asks
    /// to fire any timer whose deadline has passed.
    pub fn check_timers(&mut self, now: EventTimeStamp, queue: &mut EventQueue, environment: &mut ManipulatorEnvironment) -> Vec<Posting> {
        let mut postings = Vec::new();
        for manipulator in self.manipulators.iter_mut() {
            manipulator.check_timers(now, queue, environment, &mut postings);
        }
        postings
    }

    /// Whether any manipulator in the chain is still waiting to complete
    /// a simultaneous-key match involving `front`, and if so, whether
    /// that wait has expired — used by the pipeline worker to decide
    /// whether `front` may be forwarded to the post-processor yet.
    pub fn should_hold_front(&self, queue: &EventQueue, now: EventTimeStamp) -> bool {
        let Some(front) = queue.front().cloned() else { return false };
        self.manipulators
            .iter()
            .any(|m| m.could_still_match(queue, &front) && !m.pending_expired(queue, &front, now))
    }

    /// Force-completes every manipulator's live activations on
    /// `device_id`, releasing whatever `to` stream each was still holding
    /// open, in chain order, at `now`. Triggered by `device_ungrabbed`,
    /// profile reload, and `device_keys_and_pointing_buttons_are_released`.
    pub fn force_terminate(&mut self, device_id: DeviceId, now: EventTimeStamp, environment: &mut ManipulatorEnvironment) -> Vec<Posting> {
        let mut postings = Vec::new();
        for manipulator in self.manipulators.iter_mut() {
            manipulator.force_terminate(device_id, now, environment, &mut postings);
        }
        postings
    }

    /// True if any manipulator still has a live activation anywhere.
    pub fn has_active_manipulators(&self) -> bool {
        self.manipulators.iter().any(|m| m.active())
    }

    /// The earliest deadline pending anywhere in the chain — either a
    /// `to_if_held_down` timer or a simultaneous-group detection window
    /// closing on the queue's front entry — if any. The pipeline worker
    /// sizes its single `tokio::time::sleep_until` arm off this instead of
    /// polling on a fixed tick — the chain is the min-heap's root, not a
    /// heap itself, since re-deriving the minimum on demand is cheap at
    /// this workspace's manipulator-count scale and avoids keeping a
    /// second data structure in sync with `manipulators`. Without this,
    /// a pending simultaneous-key wait with no further inbound events
    /// would hold its front entry forever instead of timing out per §4.3.8.
    pub fn next_timer_deadline(&self, queue: &EventQueue) -> Option<EventTimeStamp> {
        let held_down = self.manipulators.iter().filter_map(|m| m.next_timer_deadline());
        let simultaneous = queue
            .front()
            .into_iter()
            .flat_map(|front| self.manipulators.iter().filter_map(move |m| m.simultaneous_timeout_deadline(queue, front)));
        held_down.chain(simultaneous).min()
    }
}

/// Handles the chain-wide events that are not themselves subject to `from`
/// matching but instead drive force-termination directly:
/// `device_ungrabbed`, `device_keys_and_pointing_buttons_are_released`,
/// and the modifier-flag-manager purge that accompanies an ungrab.
pub fn handle_lifecycle_event(
    chain: &mut ManipulatorChain,
    environment: &mut ManipulatorEnvironment,
    device_id: DeviceId,
    event: &InputEvent,
    now: EventTimeStamp,
) -> Vec<Posting> {
    match event {
        InputEvent::DeviceUngrabbed => {
            environment.modifier_flag_manager.erase_all_active_modifier_flags(device_id);
            chain.force_terminate(device_id, now, environment)
        }
        InputEvent::DeviceKeysAndPointingButtonsAreReleased => {
            environment
                .modifier_flag_manager
                .erase_all_active_modifier_flags_except_lock_and_sticky(device_id);
            chain.force_terminate(device_id, now, environment)
        }
        _ => Vec::new(),
    }
}
