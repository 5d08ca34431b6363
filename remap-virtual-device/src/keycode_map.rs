//! Maps `remap-core`'s USB HID keyboard/consumer/pointing-button usages to
//! the Linux evdev key codes `uinput` expects. The two numbering spaces are
//! unrelated (HID usage 0x04 = 'a', evdev `KEY_A` = 30), so this is an
//! explicit table rather than an arithmetic transform.

use evdev::Key;
use remap_core::event::{ConsumerKeyCode, KeyCode, PointingButton};

/// The HID keyboard-usage-page codes this workspace remaps between, mapped
/// to their evdev equivalent. Covers the alphanumeric block, the sided
/// modifiers, and the keys exercised by this workspace's example profiles
/// and tests; an unmapped usage is dropped (logged by the caller) rather
/// than panicking — a profile can name a usage this table doesn't yet
/// cover without bringing the whole device down.
pub fn keycode_to_evdev(code: KeyCode) -> Option<Key> {
    Some(match code.0 {
        0x04..=0x1D => Key(Key::KEY_A.0 + (code.0 - 0x04) as u16),
        0x1E => Key::KEY_1,
        0x1F => Key::KEY_2,
        0x20 => Key::KEY_3,
        0x21 => Key::KEY_4,
        0x22 => Key::KEY_5,
        0x23 => Key::KEY_6,
        0x24 => Key::KEY_7,
        0x25 => Key::KEY_8,
        0x26 => Key::KEY_9,
        0x27 => Key::KEY_0,
        0x28 => Key::KEY_ENTER,
        0x29 => Key::KEY_ESC,
        0x2A => Key::KEY_BACKSPACE,
        0x2B => Key::KEY_TAB,
        0x2C => Key::KEY_SPACE,
        0x2D => Key::KEY_MINUS,
        0x2E => Key::KEY_EQUAL,
        0x2F => Key::KEY_LEFTBRACE,
        0x30 => Key::KEY_RIGHTBRACE,
        0x31 => Key::KEY_BACKSLASH,
        0x33 => Key::KEY_SEMICOLON,
        0x34 => Key::KEY_APOSTROPHE,
        0x35 => Key::KEY_GRAVE,
        0x36 => Key::KEY_COMMA,
        0x37 => Key::KEY_DOT,
        0x38 => Key::KEY_SLASH,
        0x39 => Key::KEY_CAPSLOCK,
        0x3A..=0x45 => Key(Key::KEY_F1.0 + (code.0 - 0x3A) as u16),
        0x4A => Key::KEY_HOME,
        0x4B => Key::KEY_PAGEUP,
        0x4C => Key::KEY_DELETE,
        0x4D => Key::KEY_END,
        0x4E => Key::KEY_PAGEDOWN,
        0x4F => Key::KEY_RIGHT,
        0x50 => Key::KEY_LEFT,
        0x51 => Key::KEY_DOWN,
        0x52 => Key::KEY_UP,
        0xE0 => Key::KEY_LEFTCTRL,
        0xE1 => Key::KEY_LEFTSHIFT,
        0xE2 => Key::KEY_LEFTALT,
        0xE3 => Key::KEY_LEFTMETA,
        0xE4 => Key::KEY_RIGHTCTRL,
        0xE5 => Key::KEY_RIGHTSHIFT,
        0xE6 => Key::KEY_RIGHTALT,
        0xE7 => Key::KEY_RIGHTMETA,
        _ => return None,
    })
}

/// The consumer-page usages this workspace's example profiles exercise
/// (media keys). Unmapped usages are dropped, same as [`keycode_to_evdev`].
pub fn consumer_keycode_to_evdev(code: ConsumerKeyCode) -> Option<Key> {
    Some(match code.0 {
        0xB5 => Key::KEY_NEXTSONG,
        0xB6 => Key::KEY_PREVIOUSSONG,
        0xB7 => Key::KEY_STOPCD,
        0xCD => Key::KEY_PLAYPAUSE,
        0xE2 => Key::KEY_MUTE,
        0xE9 => Key::KEY_VOLUMEUP,
        0xEA => Key::KEY_VOLUMEDOWN,
        _ => return None,
    })
}

pub fn pointing_button_to_evdev(button: PointingButton) -> Option<Key> {
    Some(match button.0 {
        0 => Key::BTN_LEFT,
        1 => Key::BTN_RIGHT,
        2 => Key::BTN_MIDDLE,
        3 => Key::BTN_SIDE,
        4 => Key::BTN_EXTRA,
        _ => return None,
    })
}

/// Every key this table can produce, used to build the uinput device's
/// advertised key set at construction time.
pub fn every_mapped_keyboard_key() -> Vec<Key> {
    (0x04u32..=0x52).chain(0xE0..=0xE7).filter_map(|code| keycode_to_evdev(KeyCode(code))).collect()
}

pub fn every_mapped_consumer_key() -> Vec<Key> {
    [0xB5u32, 0xB6, 0xB7, 0xCD, 0xE2, 0xE9, 0xEA]
        .into_iter()
        .filter_map(|code| consumer_keycode_to_evdev(ConsumerKeyCode(code)))
        .collect()
}

pub fn every_mapped_pointing_button() -> Vec<Key> {
    (0u32..=4).filter_map(|code| pointing_button_to_evdev(PointingButton(code))).collect()
}
