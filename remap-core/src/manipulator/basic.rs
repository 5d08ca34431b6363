//! The basic manipulator: the state machine that turns a
//! matching `from` event into a `to` stream, `to_if_alone`/`to_if_held_down`
//! outcomes, a `to_delayed_action` resolution, and `to_after_key_up`.

use crate::config::{ManipulatorDefinition, Parameters};
use crate::conditions::evaluate_all;
use crate::definitions::{KeyOrder, KeyUpWhen, ToEventAction, ToEventDefinition};
use crate::environment::ManipulatorEnvironment;
use crate::event::{EventCode, InputEvent};
use crate::event_queue::{EventQueue, EventQueueEntry};
use crate::ids::{DeviceId, EventQueueEntryId, EventTimeStamp};
use crate::modifier_flag::{Expansion, ModifierFamily, ModifierFlag, ModifierFlagSet};
use crate::modifier_flag_manager::{ActiveModifierFlag, ContributorType};
use std::collections::BTreeSet;

/// One output produced while processing an event queue pass: either a
/// synthesized event to hand to the post-processor, or a queue entry that
/// passed through the chain unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub time: EventTimeStamp,
    pub event: InputEvent,
    pub lazy: bool,
}

/// The held-down half of a `to` list's last key entry ("output hold"):
/// every entry but the last is posted down-then-up at
/// once, but the last entry's key_up — and the release of whatever
/// modifiers it raised — waits until the triggering `from` is released.
#[derive(Debug, Clone, PartialEq)]
struct PendingRelease {
    code: EventCode,
    raised_modifiers: Vec<ActiveModifierFlag>,
    lazy: bool,
}

/// Tracks one in-flight press of a (non-simultaneous) `from` key, or one
/// completed simultaneous group, from key_down until its outcome is fully
/// resolved at key_up (or by a force-termination event).
#[derive(Debug, Clone)]
struct Activation {
    device_id: DeviceId,
    key_down_time: EventTimeStamp,
    /// Codes that must each see a key_up before a simultaneous activation
    /// is resolved (empty / irrelevant for a single-key `from`).
    member_codes: Vec<EventCode>,
    released_codes: BTreeSet<EventCode>,
    /// Becomes true the first time any *other* key_down is observed on
    /// this device while the activation is alive (relevant to
    /// `to_if_alone`).
    interrupted: bool,
    held_down_fired: bool,
    delayed_action_fired: bool,
    /// Set once a simultaneous group with `key_up_when: any` has resolved
    /// on its first member release; the activation keeps absorbing the
    /// remaining members' key_ups until they are all up, but must not be
    /// finished a second time.
    resolved: bool,
    /// The `to` list's deferred last-entry release, if its last entry was
    /// a key.
    pending_release: Option<PendingRelease>,
}

impl Activation {
    fn all_members_released(&self, key_up_when: KeyUpWhen) -> bool {
        match key_up_when {
            KeyUpWhen::Any => !self.released_codes.is_empty(),
            KeyUpWhen::All => self.member_codes.iter().all(|c| self.released_codes.contains(c)),
        }
    }
}

/// A single `from` -> outcome rule, bound to its effective (profile
/// defaults merged with per-manipulator overrides) [`Parameters`].
pub struct BasicManipulator {
    definition: ManipulatorDefinition,
    parameters: Parameters,
    activations: Vec<Activation>,
}

fn modifiers_match(
    mandatory: &[ModifierFamily],
    optional: &[ModifierFamily],
    current: &ModifierFlagSet,
) -> bool {
    for family in mandatory {
        match family.expand() {
            Expansion::Flags(flags) => {
                if !flags.iter().any(|f| current.contains(f)) {
                    return false;
                }
            }
            Expansion::Any => {
                if current.iter().all(|f| *f == ModifierFlag::Zero) {
                    return false;
                }
            }
        }
    }

    if optional.iter().any(|f| matches!(f, ModifierFamily::Any)) {
        return true;
    }

    let mut covered: ModifierFlagSet = ModifierFlagSet::new();
    for family in mandatory.iter().chain(optional.iter()) {
        match family.expand() {
            Expansion::Flags(flags) => covered.extend(flags.iter().copied()),
            Expansion::Any => return true,
        }
    }
    current.iter().all(|f| covered.contains(f) || *f == ModifierFlag::Zero)
}

/// Raises every flag covered by `families` that is not already
/// effectively pressed, emitting a (lazy) modifier key_down for each one
/// actually newly pressed: key_downs of the definition's modifiers not
/// already pressed. Returns every contributor
/// pushed, whether or not it caused a new key_down, so the matching
/// [`lower_modifiers`] call released exactly what was raised here.
fn raise_modifiers(
    families: &[ModifierFamily],
    device_id: DeviceId,
    time: EventTimeStamp,
    environment: &mut ManipulatorEnvironment,
    postings: &mut Vec<Posting>,
) -> Vec<ActiveModifierFlag> {
    let mut raised = Vec::new();
    for family in families {
        for &flag in family.covered_flags() {
            if !environment.modifier_flag_manager.is_pressed(flag) {
                if let Some(keycode) = flag.hid_keycode() {
                    postings.push(Posting {
                        time,
                        event: InputEvent::KeyDown(EventCode::KeyCode(keycode)),
                        lazy: true,
                    });
                }
            }
            let contributor = ActiveModifierFlag::new(ContributorType::Increase, flag, device_id);
            environment.modifier_flag_manager.push_back_active_modifier_flag(contributor);
            raised.push(contributor);
        }
    }
    raised
}

/// Lowers every contributor `raise_modifiers` pushed, emitting a (lazy)
/// modifier key_up only for the flags that actually become unpressed as a
/// result (another manipulator or a still-held physical key may keep a
/// flag pressed after this contributor is removed).
fn lower_modifiers(
    raised: &[ActiveModifierFlag],
    device_id: DeviceId,
    time: EventTimeStamp,
    environment: &mut ManipulatorEnvironment,
    postings: &mut Vec<Posting>,
) {
    for contributor in raised {
        environment
            .modifier_flag_manager
            .push_back_active_modifier_flag(ActiveModifierFlag::new(ContributorType::Decrease, contributor.flag, device_id));
        if !environment.modifier_flag_manager.is_pressed(contributor.flag) {
            if let Some(keycode) = contributor.flag.hid_keycode() {
                postings.push(Posting {
                    time,
                    event: InputEvent::KeyUp(EventCode::KeyCode(keycode)),
                    lazy: true,
                });
            }
        }
    }
}

/// Posts one `to_event_definition`. When `defer_release` is set and the
/// definition's action is a key, the key_up (and the modifiers this entry
/// raised) are *not* posted — the caller gets them back as a
/// [`PendingRelease`] to post later, implementing the "output hold"
/// semantics for a `to` list's last entry.
fn post_definition(
    def: &ToEventDefinition,
    device_id: DeviceId,
    down_time: EventTimeStamp,
    up_time: EventTimeStamp,
    environment: &mut ManipulatorEnvironment,
    postings: &mut Vec<Posting>,
    defer_release: bool,
) -> Option<PendingRelease> {
    let raised = raise_modifiers(&def.modifiers, device_id, down_time, environment, postings);

    match &def.action {
        ToEventAction::Key(code) => {
            postings.push(Posting {
                time: down_time,
                event: InputEvent::KeyDown(*code),
                lazy: def.lazy,
            });
            if defer_release {
                return Some(PendingRelease {
                    code: *code,
                    raised_modifiers: raised,
                    lazy: def.lazy,
                });
            }
            postings.push(Posting {
                time: up_time,
                event: InputEvent::KeyUp(*code),
                lazy: def.lazy,
            });
        }
        ToEventAction::ShellCommand(command) => postings.push(Posting {
            time: down_time,
            event: InputEvent::ShellCommand(command.clone()),
            lazy: false,
        }),
        ToEventAction::SelectInputSource(specifiers) => postings.push(Posting {
            time: down_time,
            event: InputEvent::SelectInputSource(specifiers.clone()),
            lazy: false,
        }),
        ToEventAction::SetVariable { name, value } => {
            environment.set_variable(name.clone(), value.clone());
            postings.push(Posting {
                time: down_time,
                event: InputEvent::SetVariable {
                    name: name.clone(),
                    value: value.clone(),
                },
                lazy: false,
            });
        }
        ToEventAction::MouseKey {
            dx,
            dy,
            vertical_wheel,
            horizontal_wheel,
            speed_multiplier,
        } => postings.push(Posting {
            time: down_time,
            event: InputEvent::MouseKey {
                dx: *dx,
                dy: *dy,
                vertical_wheel: *vertical_wheel,
                horizontal_wheel: *horizontal_wheel,
                speed_multiplier: *speed_multiplier,
            },
            lazy: false,
        }),
    }

    lower_modifiers(&raised, device_id, up_time, environment, postings);
    None
}

/// Posts a manipulator's main `to` list: every entry but the last posts
/// its full down/up pair immediately; the last entry, if a key, is held
/// open and handed back as a [`PendingRelease`].
fn post_to_stream(
    defs: &[ToEventDefinition],
    device_id: DeviceId,
    time: EventTimeStamp,
    environment: &mut ManipulatorEnvironment,
    postings: &mut Vec<Posting>,
) -> Option<PendingRelease> {
    let last_index = defs.len().saturating_sub(1);
    let mut pending = None;
    for (index, def) in defs.iter().enumerate() {
        let defer = index == last_index && matches!(def.action, ToEventAction::Key(_));
        let released = post_definition(def, device_id, time, time, environment, postings, defer);
        if defer {
            pending = released;
        }
    }
    pending
}

/// Advances `queue`'s timestamp-delay bias by one tick and returns `base`
/// offset by the running total, so a stream of synthesized events gets
/// strictly increasing virtual timestamps without re-reading the wall
/// clock.
fn next_synthetic_time(queue: &mut EventQueue, base: EventTimeStamp) -> EventTimeStamp {
    queue.increase_time_stamp_delay(1);
    base.plus_nanoseconds(queue.get_time_stamp_delay())
}

/// Posts a self-contained synthetic tap (`to_if_alone`, `to_if_held_down`,
/// `to_after_key_up`, `to_delayed_action`'s sub-streams): every entry,
/// including the last, posts its full down/up pair immediately — none of
/// these streams hold a key open the way the main `to` list can. Each
/// entry's key_down/key_up is spaced out via the queue's timestamp-delay
/// bias so a tap never collapses onto a single instant.
fn post_tap(defs: &[ToEventDefinition], device_id: DeviceId, time: EventTimeStamp, queue: &mut EventQueue, environment: &mut ManipulatorEnvironment, postings: &mut Vec<Posting>) {
    for def in defs {
        let down_time = next_synthetic_time(queue, time);
        let up_time = next_synthetic_time(queue, time);
        post_definition(def, device_id, down_time, up_time, environment, postings, false);
    }
}

fn release_pending(
    pending: &PendingRelease,
    time: EventTimeStamp,
    device_id: DeviceId,
    environment: &mut ManipulatorEnvironment,
    postings: &mut Vec<Posting>,
) {
    postings.push(Posting {
        time,
        event: InputEvent::KeyUp(pending.code),
        lazy: pending.lazy,
    });
    lower_modifiers(&pending.raised_modifiers, device_id, time, environment, postings);
}

impl BasicManipulator {
    pub fn new(definition: ManipulatorDefinition, profile_parameters: &Parameters) -> Self {
        let parameters = profile_parameters.apply_overrides(definition.parameters.as_ref());
        Self {
            definition,
            parameters,
            activations: Vec::new(),
        }
    }

    fn is_simultaneous(&self) -> bool {
        self.definition.from.is_simultaneous()
    }

    /// Whether `front` could still become part of a match this manipulator
    /// is waiting on — used by the chain to decide whether the queue's
    /// front entry may be forwarded yet. When
    /// `detect_key_down_uninterruptedly` is false (the default), an
    /// unrelated key_down observed anywhere behind `front` in `queue`
    /// cancels the wait immediately rather than letting it ride out the
    /// full `simultaneous_threshold_milliseconds` window.
    pub fn could_still_match(&self, queue: &EventQueue, front: &EventQueueEntry) -> bool {
        if !self.is_simultaneous() || !front.valid {
            return false;
        }
        let InputEvent::KeyDown(code) = front.event else {
            return false;
        };
        if !self.definition.from.events.iter().any(|event_def| event_def.code.matches(code)) {
            return false;
        }
        if !self.definition.from.simultaneous_options.detect_key_down_uninterruptedly {
            let unrelated_interruption = queue.iter().any(|other| {
                other.valid
                    && other.device_id == front.device_id
                    && other.event_time_stamp > front.event_time_stamp
                    && matches!(
                        other.event,
                        InputEvent::KeyDown(other_code) if !self.definition.from.events.iter().any(|d| d.code.matches(other_code))
                    )
            });
            if unrelated_interruption {
                return false;
            }
        }
        true
    }

    /// True once the simultaneous-detection window has elapsed for
    /// `front` without this manipulator completing a match — the chain
    /// uses this to stop waiting and let `front` pass through.
    pub fn pending_expired(&self, queue: &EventQueue, front: &EventQueueEntry, now: EventTimeStamp) -> bool {
        if !self.could_still_match(queue, front) {
            return false;
        }
        !front
            .event_time_stamp
            .within_milliseconds(now, self.parameters.simultaneous_threshold_milliseconds)
    }

    /// The timestamp at which this manipulator's wait on `front` would
    /// time out, if it is currently waiting on it at all — used so the
    /// pipeline worker can schedule a wakeup for a simultaneous-group
    /// timeout the same way it schedules one for a `to_if_held_down` timer,
    /// instead of relying on another inbound event to notice the window
    /// has closed.
    pub fn simultaneous_timeout_deadline(&self, queue: &EventQueue, front: &EventQueueEntry) -> Option<EventTimeStamp> {
        if !self.could_still_match(queue, front) {
            return None;
        }
        Some(front.event_time_stamp.plus_milliseconds(self.parameters.simultaneous_threshold_milliseconds))
    }

    /// Whether this manipulator has any live activation at all — used by
    /// the chain to decide it is not yet safe
    /// to discard this manipulator's bookkeeping.
    pub fn active(&self) -> bool {
        !self.activations.is_empty()
    }

    fn device_has_activation(&self, device_id: DeviceId) -> bool {
        self.activations.iter().any(|a| a.device_id == device_id)
    }

    fn mark_interrupted(&mut self, device_id: DeviceId) {
        for activation in self.activations.iter_mut() {
            if activation.device_id == device_id {
                activation.interrupted = true;
            }
        }
    }

    fn try_match_single(
        &mut self,
        entry: &mut EventQueueEntry,
        queue: &mut EventQueue,
        environment: &mut ManipulatorEnvironment,
        postings: &mut Vec<Posting>,
    ) -> bool {
        let InputEvent::KeyDown(code) = entry.event else {
            return false;
        };
        let event_def = &self.definition.from.events[0];
        if !event_def.code.matches(code) {
            return false;
        }
        if self.device_has_activation(entry.device_id) {
            // This `from` is already down on this device: the host's OS
            // auto-repeat, not a fresh press. Absorb it so the raw code
            // never leaks through as a pass-through posting; a `to` entry
            // with `repeat: true` is re-posted as its own tap for each
            // repeat instead of being swallowed outright.
            entry.valid = false;
            let repeating: Vec<ToEventDefinition> = self.definition.to.iter().filter(|def| def.repeat).cloned().collect();
            if !repeating.is_empty() {
                post_tap(&repeating, entry.device_id, entry.event_time_stamp, queue, environment, postings);
            }
            return true;
        }
        if !modifiers_match(
            &self.definition.from.mandatory_modifiers,
            &self.definition.from.optional_modifiers,
            &environment.modifier_flag_manager.make_modifier_flags(),
        ) {
            return false;
        }
        if !evaluate_all(&self.definition.conditions, environment, entry.device_id) {
            return false;
        }

        entry.valid = false;
        let pending_release = post_to_stream(&self.definition.to, entry.device_id, entry.event_time_stamp, environment, postings);
        self.activations.push(Activation {
            device_id: entry.device_id,
            key_down_time: entry.event_time_stamp,
            member_codes: vec![code],
            released_codes: BTreeSet::new(),
            interrupted: false,
            held_down_fired: false,
            delayed_action_fired: false,
            resolved: false,
            pending_release,
        });
        true
    }

    fn try_resolve_single_key_up(
        &mut self,
        entry: &mut EventQueueEntry,
        queue: &mut EventQueue,
        environment: &mut ManipulatorEnvironment,
        postings: &mut Vec<Posting>,
    ) -> bool {
        let InputEvent::KeyUp(code) = entry.event else {
            return false;
        };
        let Some(index) = self
            .activations
            .iter()
            .position(|a| a.device_id == entry.device_id && a.member_codes.contains(&code))
        else {
            return false;
        };
        entry.valid = false;
        let activation = self.activations.remove(index);
        self.finish_activation(&activation, entry.event_time_stamp, queue, environment, postings);
        true
    }

    fn finish_activation(
        &self,
        activation: &Activation,
        key_up_time: EventTimeStamp,
        queue: &mut EventQueue,
        environment: &mut ManipulatorEnvironment,
        postings: &mut Vec<Posting>,
    ) {
        // The `to` stream's held-open last entry is released first, so an
        // alone/held-down tap is never shadowed by a lingering chord.
        if let Some(pending) = &activation.pending_release {
            release_pending(pending, key_up_time, activation.device_id, environment, postings);
        }

        let held_ms = activation.key_down_time.milliseconds();
        let up_ms = key_up_time.milliseconds();
        let held_duration_ms = up_ms.saturating_sub(held_ms);

        if !activation.interrupted
            && !activation.held_down_fired
            && !self.definition.to_if_alone.is_empty()
            && held_duration_ms < self.parameters.to_if_alone_timeout_milliseconds
        {
            post_tap(&self.definition.to_if_alone, activation.device_id, key_up_time, queue, environment, postings);
        }

        if !activation.held_down_fired
            && !self.definition.to_if_held_down.is_empty()
            && held_duration_ms > self.parameters.to_if_held_down_threshold_milliseconds
        {
            post_tap(&self.definition.to_if_held_down, activation.device_id, key_up_time, queue, environment, postings);
        }

        // `to_if_invoked` fires exclusively from the timer path
        // (`check_timers`) once the delay elapses, independent of release;
        // here we only need to fire `to_if_canceled` for a key released
        // before the timer ever got the chance to fire it.
        if let Some(delayed) = &self.definition.to_delayed_action {
            if !activation.delayed_action_fired {
                post_tap(&delayed.to_if_canceled, activation.device_id, key_up_time, queue, environment, postings);
            }
        }

        post_tap(&self.definition.from.to_after_key_up, activation.device_id, key_up_time, queue, environment, postings);
        post_tap(
            &self.definition.from.simultaneous_options.to_after_key_up,
            activation.device_id,
            key_up_time,
            queue,
            environment,
            postings,
        );
    }

    fn try_match_simultaneous(
        &mut self,
        queue: &mut EventQueue,
        environment: &mut ManipulatorEnvironment,
        postings: &mut Vec<Posting>,
    ) {
        let device_ids: Vec<DeviceId> = queue.iter().map(|e| e.device_id).collect::<BTreeSet<_>>().into_iter().collect();
        for device_id in device_ids {
            if self.device_has_activation(device_id) {
                continue;
            }
            if !modifiers_match(
                &self.definition.from.mandatory_modifiers,
                &self.definition.from.optional_modifiers,
                &environment.modifier_flag_manager.make_modifier_flags(),
            ) {
                continue;
            }
            if !evaluate_all(&self.definition.conditions, environment, device_id) {
                continue;
            }

            let candidates: Vec<(EventQueueEntryId, EventCode, EventTimeStamp)> = queue
                .iter()
                .filter(|e| e.device_id == device_id && e.valid)
                .filter_map(|e| match e.event {
                    InputEvent::KeyDown(code) => Some((e.unique_id, code, e.event_time_stamp)),
                    _ => None,
                })
                .collect();

            let mut matched: Vec<(EventQueueEntryId, EventCode, EventTimeStamp)> = Vec::new();
            for event_def in &self.definition.from.events {
                let Some(hit) = candidates
                    .iter()
                    .find(|(id, code, _)| event_def.code.matches(*code) && !matched.iter().any(|(m, _, _)| m == id))
                else {
                    matched.clear();
                    break;
                };
                matched.push(*hit);
            }
            if matched.len() != self.definition.from.events.len() {
                continue;
            }

            let order_ok = match self.definition.from.simultaneous_options.key_down_order {
                KeyOrder::Insensitive => true,
                KeyOrder::Strict => matched.windows(2).all(|w| w[0].2 <= w[1].2),
                KeyOrder::StrictInverse => matched.windows(2).all(|w| w[0].2 >= w[1].2),
            };
            if !order_ok {
                continue;
            }

            let min_time = matched.iter().map(|(_, _, t)| *t).min().unwrap();
            let max_time = matched.iter().map(|(_, _, t)| *t).max().unwrap();
            if !min_time.within_milliseconds(max_time, self.parameters.simultaneous_threshold_milliseconds) {
                continue;
            }

            for (id, ..) in &matched {
                if let Some(e) = queue.find_event_by_unique_id_mut(*id) {
                    e.valid = false;
                }
            }
            let pending_release = post_to_stream(&self.definition.to, device_id, max_time, environment, postings);
            self.activations.push(Activation {
                device_id,
                key_down_time: min_time,
                member_codes: matched.iter().map(|(_, code, _)| *code).collect(),
                released_codes: BTreeSet::new(),
                interrupted: false,
                held_down_fired: false,
                delayed_action_fired: false,
                resolved: false,
                pending_release,
            });
        }
    }

    fn try_resolve_simultaneous_key_up(
        &mut self,
        entry: &mut EventQueueEntry,
        queue: &mut EventQueue,
        environment: &mut ManipulatorEnvironment,
        postings: &mut Vec<Posting>,
    ) -> bool {
        let InputEvent::KeyUp(code) = entry.event else {
            return false;
        };
        // Once `key_up_when: any` has resolved the group, a still-live
        // activation (one not all its members up yet) keeps absorbing the
        // remaining members' key_ups instead of matching here again.
        let Some(index) = self
            .activations
            .iter()
            .position(|a| a.device_id == entry.device_id && a.member_codes.contains(&code) && !a.released_codes.contains(&code))
        else {
            return false;
        };
        entry.valid = false;
        self.activations[index].released_codes.insert(code);

        let key_up_when = self.definition.from.simultaneous_options.key_up_when;
        if !self.activations[index].resolved && self.activations[index].all_members_released(key_up_when) {
            self.activations[index].resolved = true;
            let activation = self.activations[index].clone();
            self.finish_activation(&activation, entry.event_time_stamp, queue, environment, postings);
        }

        if self.activations[index].member_codes.iter().all(|c| self.activations[index].released_codes.contains(c)) {
            self.activations.remove(index);
        }
        true
    }

    /// Runs one pass over the currently-valid entries in `queue`,
    /// consuming the ones this manipulator claims and appending whatever
    /// they produce to `postings`.
    pub fn process_queue(&mut self, queue: &mut EventQueue, environment: &mut ManipulatorEnvironment, postings: &mut Vec<Posting>) {
        if self.is_simultaneous() {
            self.try_match_simultaneous(queue, environment, postings);
        }

        let unique_ids: Vec<EventQueueEntryId> = queue.iter().filter(|e| e.valid).map(|e| e.unique_id).collect();
        for id in unique_ids {
            let Some(entry) = queue.find_event_by_unique_id_mut(id) else { continue };
            if !entry.valid {
                continue;
            }
            let device_id = entry.device_id;
            let mut entry_owned = entry.clone();

            let claimed = if self.is_simultaneous() {
                self.try_resolve_simultaneous_key_up(&mut entry_owned, queue, environment, postings)
            } else {
                self.try_match_single(&mut entry_owned, queue, environment, postings)
                    || self.try_resolve_single_key_up(&mut entry_owned, queue, environment, postings)
            };

            if claimed {
                if let Some(entry) = queue.find_event_by_unique_id_mut(id) {
                    entry.valid = entry_owned.valid;
                }
            } else if matches!(entry_owned.event, InputEvent::KeyDown(_)) {
                self.mark_interrupted(device_id);
            }
        }
    }

    /// The earliest `to_if_held_down`/`to_delayed_action` deadline still
    /// pending across this manipulator's activations, if any — used by the
    /// pipeline worker to size its next `tokio::time::sleep_until` instead
    /// of polling `check_timers` on a fixed tick.
    pub fn next_timer_deadline(&self) -> Option<EventTimeStamp> {
        let mut deadlines = Vec::new();
        if !self.definition.to_if_held_down.is_empty() {
            let deadline = self
                .activations
                .iter()
                .filter(|a| !a.held_down_fired)
                .map(|a| a.key_down_time.plus_milliseconds(self.parameters.to_if_held_down_threshold_milliseconds))
                .min();
            deadlines.extend(deadline);
        }
        if self.definition.to_delayed_action.is_some() {
            let deadline = self
                .activations
                .iter()
                .filter(|a| !a.delayed_action_fired)
                .map(|a| a.key_down_time.plus_milliseconds(self.parameters.to_delayed_action_delay_milliseconds))
                .min();
            deadlines.extend(deadline);
        }
        deadlines.into_iter().min()
    }

    /// Checks every in-flight activation's `to_if_held_down` and
    /// `to_delayed_action` deadlines against `now`, firing each at most
    /// once per activation. `to_delayed_action`'s `to_if_invoked` fires
    /// here, at `activation_time + delay`, independent of release — a key
    /// held past the delay does not need to wait for its key_up.
    pub fn check_timers(&mut self, now: EventTimeStamp, queue: &mut EventQueue, environment: &mut ManipulatorEnvironment, postings: &mut Vec<Posting>) {
        if !self.definition.to_if_held_down.is_empty() {
            for activation in self.activations.iter_mut() {
                if activation.held_down_fired {
                    continue;
                }
                let elapsed_ms = now.milliseconds().saturating_sub(activation.key_down_time.milliseconds());
                if elapsed_ms > self.parameters.to_if_held_down_threshold_milliseconds {
                    activation.held_down_fired = true;
                    post_tap(&self.definition.to_if_held_down, activation.device_id, now, queue, environment, postings);
                }
            }
        }
        if let Some(delayed) = &self.definition.to_delayed_action {
            for activation in self.activations.iter_mut() {
                if activation.delayed_action_fired {
                    continue;
                }
                let elapsed_ms = now.milliseconds().saturating_sub(activation.key_down_time.milliseconds());
                if elapsed_ms >= self.parameters.to_delayed_action_delay_milliseconds {
                    activation.delayed_action_fired = true;
                    post_tap(&delayed.to_if_invoked, activation.device_id, now, queue, environment, postings);
                }
            }
        }
    }

    /// Force-completes every live activation on `device_id`: releases
    /// whatever the `to` stream is still holding open, at `now`, without
    /// running `to_if_alone`/`to_if_held_down`/`to_after_key_up` (those are
    /// normal-release outcomes, not what happens when the device itself
    /// disappears mid-chord). Used for `device_ungrabbed`,
    /// `device_keys_and_pointing_buttons_are_released`, and profile reload.
    pub fn force_terminate(&mut self, device_id: DeviceId, now: EventTimeStamp, environment: &mut ManipulatorEnvironment, postings: &mut Vec<Posting>) {
        let mut index = 0;
        while index < self.activations.len() {
            if self.activations[index].device_id != device_id {
                index += 1;
                continue;
            }
            let activation = self.activations.remove(index);
            if let Some(pending) = &activation.pending_release {
                release_pending(pending, now, device_id, environment, postings);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Condition;
    use crate::definitions::{EventDefinition, FromEventDefinition, SimultaneousOptions};
    use crate::event::{FromEventCode, KeyCode};
    use crate::logger::Logger;

    fn key(code: KeyCode) -> EventCode {
        EventCode::KeyCode(code)
    }

    fn simple_definition(from: KeyCode, to: KeyCode) -> ManipulatorDefinition {
        ManipulatorDefinition {
            from: FromEventDefinition {
                events: vec![EventDefinition {
                    code: FromEventCode::KeyCode(from),
                }],
                mandatory_modifiers: vec![],
                optional_modifiers: vec![ModifierFamily::Any],
                simultaneous_options: SimultaneousOptions::default(),
                to_after_key_up: vec![],
            },
            to: vec![ToEventDefinition {
                action: ToEventAction::Key(key(to)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
            to_if_alone: vec![],
            to_if_held_down: vec![],
            to_delayed_action: None,
            conditions: vec![],
            parameters: None,
            description: None,
        }
    }

    /// A plain remap holds its `to` key down
    /// for exactly as long as the `from` key is down; the key_up is not
    /// posted until the `from` key_up arrives.
    #[test]
    fn remaps_a_simple_key_down_and_up() {
        let definition = simple_definition(KeyCode::CAPS_LOCK, KeyCode::ESCAPE);
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));
        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));

        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(!queue.front().unwrap().valid);
        assert_eq!(postings.len(), 1, "the to-stream's only entry is held open until key_up");
        assert_eq!(postings[0].event, InputEvent::KeyDown(key(KeyCode::ESCAPE)));

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(1_000_000), InputEvent::KeyUp(key(KeyCode::CAPS_LOCK)));
        let mut postings2 = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings2);
        assert!(!queue.front().unwrap().valid);
        assert_eq!(postings2[0].event, InputEvent::KeyUp(key(KeyCode::ESCAPE)));
        assert!(manipulator.activations.is_empty());
    }

    #[test]
    fn to_if_alone_fires_only_when_released_quickly_without_interruption() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_if_alone = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ESCAPE)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(10_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings2 = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings2);
        // the held `to` key_up is released first, then the alone tap.
        assert_eq!(postings2[0].event, InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        assert!(postings2.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))));
    }

    #[test]
    fn interrupted_activation_does_not_fire_to_if_alone() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_if_alone = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ESCAPE)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(1_000_000), InputEvent::KeyDown(key(KeyCode::SPACEBAR)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(2_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(!postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))));
    }

    /// `to_if_held_down` fires at most once per activation, strictly
    /// after the threshold.
    #[test]
    fn to_if_held_down_fires_once_past_threshold() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_if_held_down = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ENTER)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        let threshold_ns = (Parameters::default().to_if_held_down_threshold_milliseconds + 1) * 1_000_000;
        let mut postings = Vec::new();
        manipulator.check_timers(EventTimeStamp::from_nanoseconds(threshold_ns), &mut queue, &mut environment, &mut postings);
        assert_eq!(postings.iter().filter(|p| p.event == InputEvent::KeyDown(key(KeyCode::ENTER))).count(), 1);

        let mut postings_again = Vec::new();
        manipulator.check_timers(EventTimeStamp::from_nanoseconds(threshold_ns * 2), &mut queue, &mut environment, &mut postings_again);
        assert!(postings_again.is_empty());
    }

    #[test]
    fn simultaneous_keys_combine_within_threshold() {
        let mut definition = ManipulatorDefinition {
            from: FromEventDefinition {
                events: vec![
                    EventDefinition {
                        code: FromEventCode::KeyCode(KeyCode::LEFT_SHIFT),
                    },
                    EventDefinition {
                        code: FromEventCode::KeyCode(KeyCode::SPACEBAR),
                    },
                ],
                mandatory_modifiers: vec![],
                optional_modifiers: vec![],
                simultaneous_options: SimultaneousOptions {
                    key_up_when: KeyUpWhen::Any,
                    ..Default::default()
                },
                to_after_key_up: vec![],
            },
            to: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::ESCAPE)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
            to_if_alone: vec![],
            to_if_held_down: vec![],
            to_delayed_action: None,
            conditions: vec![],
            parameters: None,
            description: None,
        };
        definition.from.simultaneous_options.key_up_when = KeyUpWhen::Any;
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_SHIFT)));
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(10_000_000), InputEvent::KeyDown(key(KeyCode::SPACEBAR)));

        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))));
        assert!(queue.iter().all(|e| !e.valid));
    }

    /// A device ungrabbed mid-chord must release whatever the `to`
    /// stream was still holding open.
    #[test]
    fn force_terminate_releases_the_held_to_stream() {
        let definition = simple_definition(KeyCode::CAPS_LOCK, KeyCode::ESCAPE);
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));
        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());
        assert!(manipulator.active());

        let mut postings = Vec::new();
        manipulator.force_terminate(DeviceId(1), EventTimeStamp::from_nanoseconds(5_000_000), &mut environment, &mut postings);
        assert!(!manipulator.active());
        assert_eq!(postings, vec![Posting {
            time: EventTimeStamp::from_nanoseconds(5_000_000),
            event: InputEvent::KeyUp(key(KeyCode::ESCAPE)),
            lazy: false,
        }]);
    }

    /// An OS auto-repeat key_down for a `from` key that is already active
    /// must be absorbed, not forwarded as a pass-through posting.
    #[test]
    fn os_auto_repeat_key_down_is_absorbed() {
        let definition = simple_definition(KeyCode::CAPS_LOCK, KeyCode::ESCAPE);
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));
        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(1_000_000), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(!queue.front().unwrap().valid, "the repeat key_down must be absorbed, not forwarded");
        assert!(postings.is_empty(), "repeat is not enabled on the `to` entry");
        assert!(manipulator.activations.len() == 1, "the repeat must not create a second activation");
    }

    /// A `to` entry with `repeat: true` re-fires its own tap on every OS
    /// auto-repeat of the held `from` key.
    #[test]
    fn repeat_enabled_to_entry_refires_on_each_os_auto_repeat() {
        let mut definition = simple_definition(KeyCode::CAPS_LOCK, KeyCode::ESCAPE);
        definition.to[0].repeat = true;
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));
        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(1_000_000), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert_eq!(postings.iter().filter(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))).count(), 1);
        assert_eq!(postings.iter().filter(|p| p.event == InputEvent::KeyUp(key(KeyCode::ESCAPE))).count(), 1);
    }

    /// A `key_up_when: any` group keeps absorbing the remaining members'
    /// key_ups after the first release resolves it, instead of letting
    /// them fall through as pass-through postings.
    #[test]
    fn simultaneous_any_keeps_absorbing_key_ups_after_resolution() {
        let mut definition = ManipulatorDefinition {
            from: FromEventDefinition {
                events: vec![
                    EventDefinition {
                        code: FromEventCode::KeyCode(KeyCode::LEFT_SHIFT),
                    },
                    EventDefinition {
                        code: FromEventCode::KeyCode(KeyCode::SPACEBAR),
                    },
                ],
                mandatory_modifiers: vec![],
                optional_modifiers: vec![],
                simultaneous_options: SimultaneousOptions {
                    key_up_when: KeyUpWhen::Any,
                    ..Default::default()
                },
                to_after_key_up: vec![],
            },
            to: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::ESCAPE)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
            to_if_alone: vec![],
            to_if_held_down: vec![],
            to_delayed_action: None,
            conditions: vec![],
            parameters: None,
            description: None,
        };
        definition.from.simultaneous_options.key_up_when = KeyUpWhen::Any;
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_SHIFT)));
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(10_000_000), InputEvent::KeyDown(key(KeyCode::SPACEBAR)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(20_000_000), InputEvent::KeyUp(key(KeyCode::SPACEBAR)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(!queue.front().unwrap().valid, "the first member's key_up resolves the group");

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(30_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_SHIFT)));
        let mut postings2 = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings2);
        assert!(
            !queue.front().unwrap().valid,
            "the second member's key_up must still be absorbed instead of falling through as a pass-through posting"
        );
        assert!(postings2.is_empty(), "the group already resolved; the second release must not re-fire anything");
        assert!(manipulator.activations.is_empty(), "the activation is dropped once every member is up");
    }

    /// `to_delayed_action`'s `to_if_invoked` fires from the timer path at
    /// `activation_time + delay`, independent of release.
    #[test]
    fn to_delayed_action_invokes_from_the_timer_independent_of_release() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_delayed_action = Some(crate::config::ToDelayedAction {
            to_if_invoked: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::ENTER)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
            to_if_canceled: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::TAB)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
        });
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        let delay_ns = Parameters::default().to_delayed_action_delay_milliseconds * 1_000_000;
        let mut postings = Vec::new();
        manipulator.check_timers(EventTimeStamp::from_nanoseconds(delay_ns), &mut queue, &mut environment, &mut postings);
        assert!(postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ENTER))), "to_if_invoked must fire once the delay elapses");
        assert!(!postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::TAB))));

        // The key is still held; releasing it afterward must not also
        // fire `to_if_canceled`.
        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(delay_ns + 1_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings2 = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings2);
        assert!(!postings2.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::TAB))));
    }

    /// A key released before the delayed-action timer ever fires gets
    /// `to_if_canceled` instead.
    #[test]
    fn to_delayed_action_cancels_when_released_before_the_timer_fires() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_delayed_action = Some(crate::config::ToDelayedAction {
            to_if_invoked: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::ENTER)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
            to_if_canceled: vec![ToEventDefinition {
                action: ToEventAction::Key(key(KeyCode::TAB)),
                modifiers: vec![],
                lazy: false,
                repeat: false,
            }],
        });
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(1_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::TAB))));
        assert!(!postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ENTER))));
    }

    /// Once `to_if_held_down` has fired, releasing the key afterward must
    /// not also fire `to_if_alone`.
    #[test]
    fn to_if_alone_does_not_fire_after_held_down_already_fired() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_if_alone = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ESCAPE)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        definition.to_if_held_down = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ENTER)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        let threshold_ns = (Parameters::default().to_if_held_down_threshold_milliseconds + 1) * 1_000_000;
        manipulator.check_timers(EventTimeStamp::from_nanoseconds(threshold_ns), &mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(threshold_ns + 1_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);
        assert!(
            !postings.iter().any(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))),
            "to_if_alone must not fire once the hold threshold has already fired"
        );
    }

    /// A synthesized tap's key_down and key_up must land on distinct,
    /// increasing timestamps rather than collapsing onto the key_up time.
    #[test]
    fn synthetic_tap_events_get_spaced_timestamps() {
        let mut definition = simple_definition(KeyCode::LEFT_CONTROL, KeyCode::LEFT_CONTROL);
        definition.to_if_alone = vec![ToEventDefinition {
            action: ToEventAction::Key(key(KeyCode::ESCAPE)),
            modifiers: vec![],
            lazy: false,
            repeat: false,
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));

        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());

        queue.clear();
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(10_000_000), InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)));
        let mut postings = Vec::new();
        manipulator.process_queue(&mut queue, &mut environment, &mut postings);

        let down = postings.iter().find(|p| p.event == InputEvent::KeyDown(key(KeyCode::ESCAPE))).unwrap();
        let up = postings.iter().find(|p| p.event == InputEvent::KeyUp(key(KeyCode::ESCAPE))).unwrap();
        assert!(down.time > EventTimeStamp::from_nanoseconds(10_000_000), "the tap's key_down must not collapse onto the key_up time");
        assert!(up.time > down.time, "the tap's key_up must follow its key_down on a distinct timestamp");
    }

    #[test]
    fn condition_mismatch_prevents_activation() {
        let mut definition = simple_definition(KeyCode::CAPS_LOCK, KeyCode::ESCAPE);
        definition.conditions = vec![Condition::FrontmostApplicationIf {
            bundle_identifiers: vec!["^com\\.apple\\.Terminal$".to_string()],
            file_paths: vec![],
        }];
        let mut manipulator = BasicManipulator::new(definition, &Parameters::default());
        let mut environment = ManipulatorEnvironment::new(Logger::new("test"));
        let mut queue = EventQueue::new(crate::ids::UniqueIdGenerator::new());
        queue.push_back_event(DeviceId(1), EventTimeStamp::from_nanoseconds(0), InputEvent::KeyDown(key(KeyCode::CAPS_LOCK)));
        manipulator.process_queue(&mut queue, &mut environment, &mut Vec::new());
        assert!(queue.front().unwrap().valid, "no frontmost application is set, so the condition must fail");
    }
}
