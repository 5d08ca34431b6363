//! The single dedicated pipeline worker: owns the input queue, the
//! manipulator chain, the environment, and the post-processor, and drains
//! one inbound message to completion before starting the next — no event
//! is ever processed concurrently with another, so the chain never
//! observes a torn queue.

use std::collections::HashSet;
use std::sync::Arc;

use remap_core::modifier_flag::ModifierFlag;
use remap_core::modifier_flag_manager::{ActiveModifierFlag, ContributorType};
use remap_core::{
    handle_lifecycle_event, CoreConfiguration, DeviceId, EventCode, EventQueue, EventTimeStamp, InputEvent, Logger, ManipulatorChain,
    ManipulatorEnvironment, Posting, PostProcessor, UniqueIdGenerator,
};
use remap_hid_transport::{ConnectionPool, EndpointId, ReportFrame};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One message an inbound producer (the replay feed here; a real grabber
/// or event-tap in a deployment that implements that out-of-scope
/// collaborator) hands to the pipeline worker.
#[derive(Debug, Clone)]
pub enum Inbound {
    Event {
        device_id: DeviceId,
        time: EventTimeStamp,
        event: InputEvent,
    },
    Shutdown,
}

pub struct PipelineWorker {
    queue: EventQueue,
    chain: ManipulatorChain,
    environment: ManipulatorEnvironment,
    post_processor: PostProcessor,
    transport: Arc<ConnectionPool>,
    endpoint: EndpointId,
    seen_devices: HashSet<DeviceId>,
    /// Anchors the chain's virtual event-time axis to a real instant so a
    /// `to_if_held_down` deadline can be turned into a `tokio::time::sleep_until`
    /// call. Re-anchored on every inbound event, since the only source of
    /// wall-clock truth in this workspace is "an event just arrived now".
    clock_origin: Option<(EventTimeStamp, tokio::time::Instant)>,
}

impl PipelineWorker {
    pub fn new(configuration: &CoreConfiguration, transport: Arc<ConnectionPool>, endpoint: EndpointId, logger: Logger) -> Option<Self> {
        let chain = ManipulatorChain::from_configuration(configuration)?;
        Some(Self {
            queue: EventQueue::new(UniqueIdGenerator::new()),
            chain,
            environment: ManipulatorEnvironment::new(logger),
            post_processor: PostProcessor::new(),
            transport,
            endpoint,
            seen_devices: HashSet::new(),
            clock_origin: None,
        })
    }

    /// Drains `inbound` until it closes or a [`Inbound::Shutdown`] arrives,
    /// firing any pending `to_if_held_down` timer in between.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) {
        loop {
            let deadline = self.chain.next_timer_deadline(&self.queue);
            let sleep_instant = deadline.map(|d| self.instant_for(d));
            let sleep_until = async move {
                match sleep_instant {
                    Some(instant) => tokio::time::sleep_until(instant).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(sleep_until);

            tokio::select! {
                message = inbound.recv() => {
                    match message {
                        Some(Inbound::Event { device_id, time, event }) => {
                            self.seen_devices.insert(device_id);
                            self.note_clock(time);
                            self.handle_event(device_id, time, event).await;
                        }
                        Some(Inbound::Shutdown) | None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                _ = &mut sleep_until => {
                    let now = deadline.expect("sleep_until only resolves when a deadline was armed");
                    let postings = self.chain.check_timers(now, &mut self.queue, &mut self.environment);
                    self.drain_and_emit(postings, now).await;
                }
            }
        }
    }

    fn note_clock(&mut self, time: EventTimeStamp) {
        self.clock_origin = Some((time, tokio::time::Instant::now()));
    }

    fn instant_for(&self, deadline: EventTimeStamp) -> tokio::time::Instant {
        let (origin_time, origin_instant) = match self.clock_origin {
            Some(origin) => origin,
            None => return tokio::time::Instant::now(),
        };
        if deadline.nanoseconds() <= origin_time.nanoseconds() {
            origin_instant
        } else {
            origin_instant + std::time::Duration::from_nanos(deadline.nanoseconds() - origin_time.nanoseconds())
        }
    }

    async fn handle_event(&mut self, device_id: DeviceId, time: EventTimeStamp, event: InputEvent) {
        self.environment.current_event_time = time;
        match &event {
            InputEvent::DeviceUngrabbed | InputEvent::DeviceKeysAndPointingButtonsAreReleased => {
                let postings = handle_lifecycle_event(&mut self.chain, &mut self.environment, device_id, &event, time);
                self.drain_and_emit(postings, time).await;
            }
            InputEvent::FrontmostApplicationChanged { bundle_id, file_path } => {
                self.environment.frontmost_application = Some(remap_core::environment::FrontmostApplication {
                    bundle_id: bundle_id.clone(),
                    file_path: file_path.clone(),
                });
            }
            InputEvent::InputSourceChanged {
                language,
                input_source_id,
                input_mode_id,
            } => {
                self.environment.input_source = Some(remap_core::environment::InputSource {
                    language: language.clone(),
                    input_source_id: input_source_id.clone(),
                    input_mode_id: input_mode_id.clone(),
                });
            }
            InputEvent::SystemPreferencesPropertiesChanged(snapshot) => {
                self.environment.system_preferences = snapshot.clone();
            }
            InputEvent::VirtualHidDeviceStateChanged { ready } => {
                self.environment.virtual_hid_ready = *ready;
            }
            InputEvent::CapsLockStateChanged(on) => {
                self.environment.modifier_flag_manager.erase_pressed_led_lock(remap_core::modifier_flag::ModifierFlag::CapsLock);
                if *on {
                    self.environment.modifier_flag_manager.push_back_active_modifier_flag(ActiveModifierFlag::new(
                        ContributorType::IncreaseLedLock,
                        remap_core::modifier_flag::ModifierFlag::CapsLock,
                        device_id,
                    ));
                }
            }
            _ => {
                self.queue.push_back_event(device_id, time, event);
                let postings = self.chain.process_queue(&mut self.queue, &mut self.environment);
                self.drain_and_emit(postings, time).await;
            }
        }
    }

    /// After a chain pass, drains every queue entry no longer needed:
    /// already-claimed entries are discarded outright, and entries no
    /// manipulator could still combine into a simultaneous match are
    /// forwarded unchanged, since the chain itself leaves them valid in
    /// place rather than re-emitting them.
    async fn drain_and_emit(&mut self, mut postings: Vec<Posting>, now: EventTimeStamp) {
        while let Some(front) = self.queue.front() {
            if !front.valid {
                self.queue.erase_front();
                continue;
            }
            if self.chain.should_hold_front(&self.queue, now) {
                break;
            }
            let entry = self.queue.erase_front().expect("front() just returned Some");
            self.track_unmapped_physical_modifier(entry.device_id, &entry.event);
            postings.push(Posting {
                time: entry.event_time_stamp,
                event: entry.event,
                lazy: entry.lazy,
            });
        }
        postings.sort_by_key(|posting| posting.time);
        self.emit(&postings).await;
    }

    /// A physical sided-modifier key that no manipulator's `from` claimed
    /// still contributes to the effective modifier state the same way a
    /// manipulator's own `to` raise would — otherwise an untouched
    /// `left_control` key_down would never make `mandatory_modifiers`
    /// checks on *other* manipulators see it as pressed.
    fn track_unmapped_physical_modifier(&mut self, device_id: DeviceId, event: &InputEvent) {
        let (code, contributor_type) = match event {
            InputEvent::KeyDown(EventCode::KeyCode(code)) => (*code, ContributorType::Increase),
            InputEvent::KeyUp(EventCode::KeyCode(code)) => (*code, ContributorType::Decrease),
            _ => return,
        };
        if let Some(flag) = ModifierFlag::from_keycode(code) {
            self.environment
                .modifier_flag_manager
                .push_back_active_modifier_flag(ActiveModifierFlag::new(contributor_type, flag, device_id));
        }
    }

    async fn emit(&mut self, postings: &[Posting]) {
        let frames = self.post_processor.process(postings);
        for timed_frame in &frames {
            let bytes = timed_frame.frame.encode();
            if let Err(error) = self.transport.send(self.endpoint, &ReportFrame(bytes)).await {
                warn!(%error, "dropping frame: virtual HID endpoint unavailable");
                self.environment.virtual_hid_ready = false;
            }
        }
        for posting in postings {
            if let InputEvent::ShellCommand(command) = &posting.event {
                // Shell-command execution is out of this workspace's scope;
                // logging is the full extent of what the pipeline worker
                // does with it.
                debug!(command, "shell_command posting (not executed)");
            }
        }
    }

    /// Force-terminates every device seen so far before the worker exits,
    /// so a held-open `to` stream is released rather than leaking a
    /// stuck-down key on the virtual HID device.
    async fn shutdown(&mut self) {
        let now = self.environment.current_event_time;
        let devices: Vec<DeviceId> = self.seen_devices.iter().copied().collect();
        for device_id in devices {
            let postings = self.chain.force_terminate(device_id, now, &mut self.environment);
            self.drain_and_emit(postings, now).await;
        }
    }
}
