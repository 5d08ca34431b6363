//! The virtual HID collaborator: a `uinput` keyboard and
//! pointer device that turns `remap-core`'s report frames into real kernel
//! input events, emitting only the key transitions and axis motion that
//! actually changed since the last frame.

use std::collections::HashSet;

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, Key, RelativeAxisType,
};
use thiserror::Error;
use tracing::warn;

use remap_core::post_processor::{Frame, TimedFrame};

use crate::keycode_map::{every_mapped_consumer_key, every_mapped_keyboard_key, every_mapped_pointing_button};

#[derive(Debug, Error)]
pub enum VirtualHidError {
    #[error("failed to create virtual device: {0}")]
    CreateDevice(#[source] std::io::Error),
    #[error("failed to emit event: {0}")]
    EmitEvent(#[source] std::io::Error),
}

/// Owns the one `uinput` device this workspace exposes: a combined
/// keyboard/consumer/pointer. Tracks the last bitmap sent for each report
/// class so it only emits the key codes that actually changed, the same
/// discipline `VirtualJoystick::set_axis` applies to axis values.
pub struct VirtualHidDevice {
    device: VirtualDevice,
    pressed_keys: HashSet<Key>,
}

impl VirtualHidDevice {
    pub fn new(name: &str) -> Result<Self, VirtualHidError> {
        let mut keys = AttributeSet::<Key>::new();
        for key in every_mapped_keyboard_key()
            .into_iter()
            .chain(every_mapped_consumer_key())
            .chain(every_mapped_pointing_button())
        {
            keys.insert(key);
        }

        let mut relative_axes = AttributeSet::<RelativeAxisType>::new();
        relative_axes.insert(RelativeAxisType::REL_X);
        relative_axes.insert(RelativeAxisType::REL_Y);
        relative_axes.insert(RelativeAxisType::REL_WHEEL);
        relative_axes.insert(RelativeAxisType::REL_HWHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(VirtualHidError::CreateDevice)?
            .name(name)
            .with_keys(&keys)
            .map_err(VirtualHidError::CreateDevice)?
            .with_relative_axes(&relative_axes)
            .map_err(VirtualHidError::CreateDevice)?
            .build()
            .map_err(VirtualHidError::CreateDevice)?;

        Ok(Self {
            device,
            pressed_keys: HashSet::new(),
        })
    }

    /// Applies one post-processor frame to the kernel device, emitting
    /// only the key transitions and relative motion this frame actually
    /// changes relative to what was last sent.
    pub fn apply(&mut self, timed_frame: &TimedFrame) -> Result<(), VirtualHidError> {
        match &timed_frame.frame {
            Frame::Keyboard(report) => self.apply_keyboard(report),
            Frame::Consumer(report) => self.apply_consumer(report),
            Frame::Pointing(report) => self.apply_pointing(report),
        }
    }

    fn apply_keyboard(&mut self, report: &remap_core::post_processor::KeyboardReport) -> Result<(), VirtualHidError> {
        let mut wanted = HashSet::new();
        for bit in 0..8u32 {
            if report.modifiers & (1 << bit) != 0 {
                if let Some(key) = crate::keycode_map::keycode_to_evdev(remap_core::event::KeyCode(0xE0 + bit)) {
                    wanted.insert(key);
                }
            }
        }
        for (byte_index, byte) in report.keys.iter().enumerate() {
            for bit in 0..8u32 {
                if byte & (1 << bit) != 0 {
                    let usage = (byte_index as u32) * 8 + bit;
                    if let Some(key) = crate::keycode_map::keycode_to_evdev(remap_core::event::KeyCode(usage)) {
                        wanted.insert(key);
                    }
                }
            }
        }
        self.emit_key_diff(&wanted)
    }

    fn apply_consumer(&mut self, report: &remap_core::post_processor::ConsumerReport) -> Result<(), VirtualHidError> {
        let mut wanted = HashSet::new();
        for (byte_index, byte) in report.keys.iter().enumerate() {
            for bit in 0..8u32 {
                if byte & (1 << bit) != 0 {
                    let usage = (byte_index as u32) * 8 + bit;
                    if let Some(key) = crate::keycode_map::consumer_keycode_to_evdev(remap_core::event::ConsumerKeyCode(usage)) {
                        wanted.insert(key);
                    }
                }
            }
        }
        self.emit_key_diff(&wanted)
    }

    fn apply_pointing(&mut self, report: &remap_core::post_processor::PointingReport) -> Result<(), VirtualHidError> {
        let mut events = Vec::new();
        if report.x != 0 {
            events.push(InputEvent::new_now(EventType::RELATIVE, RelativeAxisType::REL_X.0, report.x as i32));
        }
        if report.y != 0 {
            events.push(InputEvent::new_now(EventType::RELATIVE, RelativeAxisType::REL_Y.0, report.y as i32));
        }
        if report.vertical_wheel != 0 {
            events.push(InputEvent::new_now(EventType::RELATIVE, RelativeAxisType::REL_WHEEL.0, report.vertical_wheel as i32));
        }
        if report.horizontal_wheel != 0 {
            events.push(InputEvent::new_now(EventType::RELATIVE, RelativeAxisType::REL_HWHEEL.0, report.horizontal_wheel as i32));
        }

        for bit in 0..32u32 {
            let down = report.buttons & (1 << bit) != 0;
            if let Some(key) = crate::keycode_map::pointing_button_to_evdev(remap_core::event::PointingButton(bit)) {
                let was_down = self.pressed_keys.contains(&key);
                if down != was_down {
                    events.push(InputEvent::new_now(EventType::KEY, key.0, down as i32));
                    if down {
                        self.pressed_keys.insert(key);
                    } else {
                        self.pressed_keys.remove(&key);
                    }
                }
            }
        }

        if events.is_empty() {
            return Ok(());
        }
        self.device.emit(&events).map_err(VirtualHidError::EmitEvent)
    }

    fn emit_key_diff(&mut self, wanted: &HashSet<Key>) -> Result<(), VirtualHidError> {
        let mut events = Vec::new();
        for key in wanted.difference(&self.pressed_keys) {
            events.push(InputEvent::new_now(EventType::KEY, key.0, 1));
        }
        for key in self.pressed_keys.difference(wanted) {
            events.push(InputEvent::new_now(EventType::KEY, key.0, 0));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.pressed_keys = wanted.clone();
        self.device.emit(&events).map_err(VirtualHidError::EmitEvent)
    }

    /// Unmapped usages are logged and dropped rather than failing the
    /// whole frame (a profile can legally name a usage `keycode_map`
    /// doesn't yet cover).
    pub fn warn_unmapped(&self, usage: u32) {
        warn!(usage, "no evdev mapping for this HID usage; dropping");
    }
}
