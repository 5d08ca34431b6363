//! The event model: key classes and the `InputEvent` tagged union that
//! every queue entry carries.

use serde::{Deserialize, Serialize};

/// A USB HID keyboard-usage-page key code. Named constants cover the keys
/// exercised elsewhere in this crate and its tests; any other usage value
/// is representable via the tuple constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const CAPS_LOCK: KeyCode = KeyCode(0x39);
    // The modifier-key usages (0xE0-0xE7) per the USB HID keyboard usage
    // page; `crate::post_processor` recognizes this exact range and
    // reports these through the keyboard frame's modifier byte rather
    // than its key bitmap.
    pub const LEFT_CONTROL: KeyCode = KeyCode(0xE0);
    pub const LEFT_SHIFT: KeyCode = KeyCode(0xE1);
    pub const LEFT_OPTION: KeyCode = KeyCode(0xE2);
    pub const LEFT_COMMAND: KeyCode = KeyCode(0xE3);
    pub const RIGHT_CONTROL: KeyCode = KeyCode(0xE4);
    pub const RIGHT_SHIFT: KeyCode = KeyCode(0xE5);
    pub const RIGHT_OPTION: KeyCode = KeyCode(0xE6);
    pub const RIGHT_COMMAND: KeyCode = KeyCode(0xE7);
    pub const ESCAPE: KeyCode = KeyCode(0x29);
    pub const ENTER: KeyCode = KeyCode(0x28);
    pub const SPACEBAR: KeyCode = KeyCode(0x2C);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerKeyCode(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointingButton(pub u32);

/// A concrete event code: one member of a key class, without the `any_*`
/// wildcards (those only appear on the `from` side — see [`FromEventCode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code_class", rename_all = "snake_case")]
pub enum EventCode {
    KeyCode(KeyCode),
    ConsumerKeyCode(ConsumerKeyCode),
    PointingButton(PointingButton),
}

/// The `from`-side vocabulary, which additionally allows the `any_*`
/// wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code_class", rename_all = "snake_case")]
pub enum FromEventCode {
    KeyCode(KeyCode),
    ConsumerKeyCode(ConsumerKeyCode),
    PointingButton(PointingButton),
    AnyKeyCode,
    AnyConsumerKeyCode,
    AnyPointingButton,
}

impl FromEventCode {
    /// Whether a concrete event code matches this from-side specification.
    pub fn matches(self, code: EventCode) -> bool {
        match (self, code) {
            (FromEventCode::KeyCode(a), EventCode::KeyCode(b)) => a == b,
            (FromEventCode::ConsumerKeyCode(a), EventCode::ConsumerKeyCode(b)) => a == b,
            (FromEventCode::PointingButton(a), EventCode::PointingButton(b)) => a == b,
            (FromEventCode::AnyKeyCode, EventCode::KeyCode(_)) => true,
            (FromEventCode::AnyConsumerKeyCode, EventCode::ConsumerKeyCode(_)) => true,
            (FromEventCode::AnyPointingButton, EventCode::PointingButton(_)) => true,
            _ => false,
        }
    }
}

/// `string -> int | string` variable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Int(i64),
    String(String),
}

/// One entry of a `select_input_source` list (also used by the
/// `input_source_if`/`unless` condition).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSourceSpecifier {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub input_source_id: Option<String>,
    #[serde(default)]
    pub input_mode_id: Option<String>,
}

/// A narrow snapshot of host system preferences relevant to remapping
/// decisions (fn-as-function-keys, natural scrolling, ...). The full
/// preferences surface is out of scope; only the fields a
/// manipulator might condition on are modeled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemPreferencesSnapshot {
    #[serde(default)]
    pub fn_as_function_keys: bool,
    #[serde(default)]
    pub scroll_natural: bool,
}

/// The tagged union of everything that can flow through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    KeyDown(EventCode),
    KeyUp(EventCode),
    CapsLockStateChanged(bool),
    PointingMotion {
        dx: i32,
        dy: i32,
        vertical_wheel: i32,
        horizontal_wheel: i32,
    },
    ShellCommand(String),
    SelectInputSource(Vec<InputSourceSpecifier>),
    SetVariable {
        name: String,
        value: VariableValue,
    },
    MouseKey {
        dx: i32,
        dy: i32,
        vertical_wheel: i32,
        horizontal_wheel: i32,
        speed_multiplier: f64,
    },
    DeviceKeysAndPointingButtonsAreReleased,
    DeviceUngrabbed,
    FrontmostApplicationChanged {
        bundle_id: String,
        file_path: String,
    },
    InputSourceChanged {
        language: String,
        input_source_id: String,
        input_mode_id: String,
    },
    SystemPreferencesPropertiesChanged(SystemPreferencesSnapshot),
    VirtualHidDeviceStateChanged {
        ready: bool,
    },
}

/// Whether an event is the down- or up-half of a key pair, or a
/// standalone ("single") event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    KeyDown,
    KeyUp,
    Single,
}

impl InputEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            InputEvent::KeyDown(_) => EventType::KeyDown,
            InputEvent::KeyUp(_) => EventType::KeyUp,
            _ => EventType::Single,
        }
    }

    /// The event code this event carries, if it is a key_down/key_up pair
    /// member. Used to key the `last_event_time_by_code` map.
    pub fn code(&self) -> Option<EventCode> {
        match self {
            InputEvent::KeyDown(c) | InputEvent::KeyUp(c) => Some(*c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_key_code_matches_concrete_key_but_not_consumer() {
        let from = FromEventCode::AnyKeyCode;
        assert!(from.matches(EventCode::KeyCode(KeyCode::ESCAPE)));
        assert!(!from.matches(EventCode::ConsumerKeyCode(ConsumerKeyCode(1))));
    }

    #[test]
    fn concrete_from_code_matches_only_itself() {
        let from = FromEventCode::KeyCode(KeyCode::CAPS_LOCK);
        assert!(from.matches(EventCode::KeyCode(KeyCode::CAPS_LOCK)));
        assert!(!from.matches(EventCode::KeyCode(KeyCode::ESCAPE)));
    }
}
