//! The post-processor: turns the chain's [`Posting`] stream into the
//! actual HID report frames the virtual device collaborator sends. A
//! keyboard report coalesces every non-lazy posting at the same time
//! stamp into one frame per keyboard-state change rather than emitting a
//! report per key.

use crate::event::{EventCode, InputEvent};
use crate::ids::EventTimeStamp;
use crate::manipulator::Posting;

/// Byte width of a boot-protocol-style key bitmap: one bit per key code,
/// covering key codes 0..256.
pub const BITMAP_BYTES: usize = 32;

/// One outgoing keyboard HID report: the 8 sided modifiers as a bitmask
/// byte plus a bitmap of every other pressed key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keys: [u8; BITMAP_BYTES],
}

/// One outgoing consumer-page HID report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerReport {
    pub keys: [u8; BITMAP_BYTES],
}

/// One outgoing pointing (mouse) HID report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointingReport {
    pub buttons: u32,
    pub x: i8,
    pub y: i8,
    pub vertical_wheel: i8,
    pub horizontal_wheel: i8,
}

/// One report frame bound for the virtual HID device collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Keyboard(KeyboardReport),
    Consumer(ConsumerReport),
    Pointing(PointingReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedFrame {
    pub time: EventTimeStamp,
    pub frame: Frame,
}

impl Frame {
    /// Tag bytes for the wire encoding below. Not a HID report id —
    /// `remap-hid-transport` treats the whole payload as opaque bytes;
    /// this tag only lets the virtual-device side tell the three report
    /// shapes apart again.
    const TAG_KEYBOARD: u8 = 0;
    const TAG_CONSUMER: u8 = 1;
    const TAG_POINTING: u8 = 2;

    /// Encodes this frame for transport over a `remap-hid-transport`
    /// endpoint. The virtual-device collaborator on the other end is the
    /// only decoder, so the layout is whatever is cheapest to pack/unpack,
    /// not a real USB HID report byte-for-byte.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Keyboard(report) => {
                let mut bytes = Vec::with_capacity(2 + BITMAP_BYTES);
                bytes.push(Self::TAG_KEYBOARD);
                bytes.push(report.modifiers);
                bytes.extend_from_slice(&report.keys);
                bytes
            }
            Frame::Consumer(report) => {
                let mut bytes = Vec::with_capacity(1 + BITMAP_BYTES);
                bytes.push(Self::TAG_CONSUMER);
                bytes.extend_from_slice(&report.keys);
                bytes
            }
            Frame::Pointing(report) => {
                let mut bytes = Vec::with_capacity(9);
                bytes.push(Self::TAG_POINTING);
                bytes.extend_from_slice(&report.buttons.to_be_bytes());
                bytes.push(report.x as u8);
                bytes.push(report.y as u8);
                bytes.push(report.vertical_wheel as u8);
                bytes.push(report.horizontal_wheel as u8);
                bytes
            }
        }
    }

    /// Inverse of [`Self::encode`]; `None` on a truncated or unrecognized
    /// payload rather than panicking — a malformed frame from a misbehaving
    /// peer is dropped, not fatal to the virtual-device process.
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        let (&tag, rest) = bytes.split_first()?;
        match tag {
            Self::TAG_KEYBOARD => {
                let (&modifiers, keys) = rest.split_first()?;
                let keys: [u8; BITMAP_BYTES] = keys.try_into().ok()?;
                Some(Frame::Keyboard(KeyboardReport { modifiers, keys }))
            }
            Self::TAG_CONSUMER => {
                let keys: [u8; BITMAP_BYTES] = rest.try_into().ok()?;
                Some(Frame::Consumer(ConsumerReport { keys }))
            }
            Self::TAG_POINTING => {
                if rest.len() != 8 {
                    return None;
                }
                let buttons = u32::from_be_bytes(rest[0..4].try_into().ok()?);
                Some(Frame::Pointing(PointingReport {
                    buttons,
                    x: rest[4] as i8,
                    y: rest[5] as i8,
                    vertical_wheel: rest[6] as i8,
                    horizontal_wheel: rest[7] as i8,
                }))
            }
            _ => None,
        }
    }
}

fn bit_index(code: u32) -> Option<(usize, u8)> {
    let code = code as usize;
    if code >= BITMAP_BYTES * 8 {
        return None;
    }
    Some((code / 8, (code % 8) as u8))
}

fn set_bit(bitmap: &mut [u8; BITMAP_BYTES], code: u32, on: bool) {
    if let Some((byte, bit)) = bit_index(code) {
        if on {
            bitmap[byte] |= 1 << bit;
        } else {
            bitmap[byte] &= !(1 << bit);
        }
    }
}

/// The HID keyboard-usage-page modifier range is 0xE0-0xE7;
/// `Some(bit)` gives this code's bit position in [`KeyboardReport::modifiers`].
fn modifier_bit_for_keycode(code: u32) -> Option<u8> {
    if (0xE0..=0xE7).contains(&code) {
        Some((code - 0xE0) as u8)
    } else {
        None
    }
}

/// Accumulates the current keyboard/consumer/pointing state across a
/// [`Posting`] stream and flushes a report frame whenever a non-lazy
/// posting's effect needs to reach the device, coalescing any lazy
/// postings immediately preceding it into the same frame.
pub struct PostProcessor {
    keyboard: KeyboardReport,
    consumer: ConsumerReport,
    pointing_buttons: u32,
    keyboard_dirty: bool,
    consumer_dirty: bool,
    pointing_dirty: bool,
}

impl PostProcessor {
    pub fn new() -> Self {
        Self {
            keyboard: KeyboardReport::default(),
            consumer: ConsumerReport::default(),
            pointing_buttons: 0,
            keyboard_dirty: false,
            consumer_dirty: false,
            pointing_dirty: false,
        }
    }

    /// Processes one batch of postings (one manipulator-chain pass's
    /// worth), in order, producing the report frames to send.
    pub fn process(&mut self, postings: &[Posting]) -> Vec<TimedFrame> {
        let mut frames = Vec::new();
        for posting in postings {
            self.apply(posting, &mut frames);
        }
        frames
    }

    fn apply(&mut self, posting: &Posting, frames: &mut Vec<TimedFrame>) {
        match &posting.event {
            InputEvent::KeyDown(code) => self.apply_key(*code, true),
            InputEvent::KeyUp(code) => self.apply_key(*code, false),
            InputEvent::PointingMotion {
                dx,
                dy,
                vertical_wheel,
                horizontal_wheel,
            } => {
                frames.push(TimedFrame {
                    time: posting.time,
                    frame: Frame::Pointing(PointingReport {
                        buttons: self.pointing_buttons,
                        x: clamp_i8(*dx),
                        y: clamp_i8(*dy),
                        vertical_wheel: clamp_i8(*vertical_wheel),
                        horizontal_wheel: clamp_i8(*horizontal_wheel),
                    }),
                });
                return;
            }
            InputEvent::MouseKey {
                dx,
                dy,
                vertical_wheel,
                horizontal_wheel,
                speed_multiplier,
            } => {
                frames.push(TimedFrame {
                    time: posting.time,
                    frame: Frame::Pointing(PointingReport {
                        buttons: self.pointing_buttons,
                        x: clamp_i8((*dx as f64 * speed_multiplier) as i32),
                        y: clamp_i8((*dy as f64 * speed_multiplier) as i32),
                        vertical_wheel: clamp_i8(*vertical_wheel),
                        horizontal_wheel: clamp_i8(*horizontal_wheel),
                    }),
                });
                return;
            }
            // Everything else (shell commands, input-source selection,
            // variable sets, lifecycle notifications) is not representable
            // as an HID report; the pipeline worker dispatches those
            // directly rather than through the post-processor.
            _ => return,
        }

        if !posting.lazy {
            self.flush(posting.time, frames);
        }
    }

    fn apply_key(&mut self, code: EventCode, down: bool) {
        match code {
            EventCode::KeyCode(key_code) => {
                if let Some(bit) = modifier_bit_for_keycode(key_code.0) {
                    if down {
                        self.keyboard.modifiers |= 1 << bit;
                    } else {
                        self.keyboard.modifiers &= !(1 << bit);
                    }
                } else {
                    set_bit(&mut self.keyboard.keys, key_code.0, down);
                }
                self.keyboard_dirty = true;
            }
            EventCode::ConsumerKeyCode(c) => {
                set_bit(&mut self.consumer.keys, c.0, down);
                self.consumer_dirty = true;
            }
            EventCode::PointingButton(b) => {
                if down {
                    self.pointing_buttons |= 1 << b.0;
                } else {
                    self.pointing_buttons &= !(1 << b.0);
                }
                self.pointing_dirty = true;
            }
        }
    }

    fn flush(&mut self, time: EventTimeStamp, frames: &mut Vec<TimedFrame>) {
        if self.keyboard_dirty {
            frames.push(TimedFrame {
                time,
                frame: Frame::Keyboard(self.keyboard.clone()),
            });
            self.keyboard_dirty = false;
        }
        if self.consumer_dirty {
            frames.push(TimedFrame {
                time,
                frame: Frame::Consumer(self.consumer.clone()),
            });
            self.consumer_dirty = false;
        }
        if self.pointing_dirty {
            frames.push(TimedFrame {
                time,
                frame: Frame::Pointing(PointingReport {
                    buttons: self.pointing_buttons,
                    x: 0,
                    y: 0,
                    vertical_wheel: 0,
                    horizontal_wheel: 0,
                }),
            });
            self.pointing_dirty = false;
        }
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_i8(value: i32) -> i8 {
    value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyCode;

    fn key(code: KeyCode) -> EventCode {
        EventCode::KeyCode(code)
    }

    fn posting(time_ns: u64, event: InputEvent, lazy: bool) -> Posting {
        Posting {
            time: EventTimeStamp::from_nanoseconds(time_ns),
            event,
            lazy,
        }
    }

    /// The remapped left_control shows up as bit
    /// 0 of the modifier byte while held, and clears on release — never a
    /// bit in the key bitmap.
    #[test]
    fn sided_modifier_keycodes_set_the_modifier_byte_not_the_bitmap() {
        let mut processor = PostProcessor::new();
        let down = processor.process(&[posting(0, InputEvent::KeyDown(key(KeyCode::LEFT_CONTROL)), false)]);
        assert_eq!(down.len(), 1);
        match &down[0].frame {
            Frame::Keyboard(report) => {
                assert_eq!(report.modifiers, 0b0000_0001);
                assert_eq!(report.keys, [0u8; BITMAP_BYTES]);
            }
            other => panic!("expected a keyboard frame, got {other:?}"),
        }

        let up = processor.process(&[posting(1_000_000, InputEvent::KeyUp(key(KeyCode::LEFT_CONTROL)), false)]);
        match &up[0].frame {
            Frame::Keyboard(report) => assert_eq!(report.modifiers, 0),
            other => panic!("expected a keyboard frame, got {other:?}"),
        }
    }

    #[test]
    fn ordinary_key_sets_the_bitmap_not_the_modifier_byte() {
        let mut processor = PostProcessor::new();
        let frames = processor.process(&[posting(0, InputEvent::KeyDown(key(KeyCode::ESCAPE)), false)]);
        match &frames[0].frame {
            Frame::Keyboard(report) => {
                assert_eq!(report.modifiers, 0);
                let (byte, bit) = bit_index(KeyCode::ESCAPE.0).unwrap();
                assert_eq!(report.keys[byte] & (1 << bit), 1 << bit);
            }
            other => panic!("expected a keyboard frame, got {other:?}"),
        }
    }

    /// A lazily-posted modifier key_down immediately followed by a
    /// non-lazy key_down coalesces into one frame rather than two.
    #[test]
    fn lazy_postings_coalesce_into_a_single_frame() {
        let mut processor = PostProcessor::new();
        let frames = processor.process(&[
            posting(0, InputEvent::KeyDown(key(KeyCode::LEFT_COMMAND)), true),
            posting(0, InputEvent::KeyDown(key(KeyCode::ESCAPE)), false),
        ]);
        assert_eq!(frames.len(), 1);
        match &frames[0].frame {
            Frame::Keyboard(report) => {
                assert_eq!(report.modifiers, 0b0000_1000);
                let (byte, bit) = bit_index(KeyCode::ESCAPE.0).unwrap();
                assert_eq!(report.keys[byte] & (1 << bit), 1 << bit);
            }
            other => panic!("expected a keyboard frame, got {other:?}"),
        }
    }

    #[test]
    fn pointing_motion_reflects_currently_held_buttons() {
        use crate::event::PointingButton;
        let mut processor = PostProcessor::new();
        processor.process(&[posting(0, InputEvent::KeyDown(EventCode::PointingButton(PointingButton(0))), false)]);
        let frames = processor.process(&[posting(
            1,
            InputEvent::PointingMotion {
                dx: 5,
                dy: -5,
                vertical_wheel: 0,
                horizontal_wheel: 0,
            },
            false,
        )]);
        match &frames[0].frame {
            Frame::Pointing(report) => {
                assert_eq!(report.buttons, 1);
                assert_eq!(report.x, 5);
                assert_eq!(report.y, -5);
            }
            other => panic!("expected a pointing frame, got {other:?}"),
        }
    }

    #[test]
    fn non_hid_events_produce_no_frame() {
        let mut processor = PostProcessor::new();
        let frames = processor.process(&[posting(0, InputEvent::ShellCommand("echo hi".into()), false)]);
        assert!(frames.is_empty());
    }

    #[test]
    fn keyboard_frame_round_trips_through_the_wire_encoding() {
        let frame = Frame::Keyboard(KeyboardReport {
            modifiers: 0b0000_0101,
            keys: {
                let mut keys = [0u8; BITMAP_BYTES];
                keys[3] = 0xFF;
                keys
            },
        });
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn pointing_frame_round_trips_negative_motion() {
        let frame = Frame::Pointing(PointingReport {
            buttons: 0b10,
            x: -5,
            y: 12,
            vertical_wheel: -1,
            horizontal_wheel: 0,
        });
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn decode_rejects_truncated_and_unknown_payloads() {
        assert_eq!(Frame::decode(&[]), None);
        assert_eq!(Frame::decode(&[Frame::TAG_KEYBOARD, 0]), None);
        assert_eq!(Frame::decode(&[99]), None);
    }
}
