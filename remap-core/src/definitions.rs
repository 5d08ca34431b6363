//! `from`/`to` event definitions: the vocabulary a basic manipulator is
//! built from.

use crate::event::{EventCode, FromEventCode, InputSourceSpecifier, VariableValue};
use serde::{Deserialize, Serialize};

/// One member of a `from.simultaneous` key list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub code: FromEventCode,
}

/// Ordering constraint for a simultaneous-key group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    #[default]
    Insensitive,
    Strict,
    StrictInverse,
}

/// Which key(s) must release before the group is considered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUpWhen {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimultaneousOptions {
    #[serde(default)]
    pub detect_key_down_uninterruptedly: bool,
    #[serde(default)]
    pub key_down_order: KeyOrder,
    #[serde(default)]
    pub key_up_order: KeyOrder,
    #[serde(default)]
    pub key_up_when: KeyUpWhen,
    /// Posted once, after the group's `key_up_when` condition is met,
    /// in addition to (not instead of) the manipulator's own `to_after_key_up`.
    #[serde(default)]
    pub to_after_key_up: Vec<ToEventDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromEventDefinition {
    pub events: Vec<EventDefinition>,
    #[serde(default)]
    pub mandatory_modifiers: Vec<crate::modifier_flag::ModifierFamily>,
    #[serde(default)]
    pub optional_modifiers: Vec<crate::modifier_flag::ModifierFamily>,
    #[serde(default)]
    pub simultaneous_options: SimultaneousOptions,
    /// Posted once, after every key in `events` has gone up, regardless of
    /// whether this was a simultaneous group.
    #[serde(default)]
    pub to_after_key_up: Vec<ToEventDefinition>,
}

impl FromEventDefinition {
    /// A `from` clause with more than one event is a simultaneous-key
    /// specification.
    pub fn is_simultaneous(&self) -> bool {
        self.events.len() >= 2
    }
}

/// What a `to`-side entry actually does when posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToEventAction {
    Key(EventCode),
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToEventDefinition {
    #[serde(flatten)]
    pub action: ToEventAction,
    #[serde(default)]
    pub modifiers: Vec<crate::modifier_flag::ModifierFamily>,
    /// If true, this entry alone never causes a modifier frame; it must be
    /// combined with the next non-lazy entry by the post-processor.
    #[serde(default)]
    pub lazy: bool,
    /// If true, the key is posted as down-then-up repeatedly while the
    /// originating physical key is held, subject to host key-repeat timing.
    #[serde(default)]
    pub repeat: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyCode;

    #[test]
    fn single_event_from_is_not_simultaneous() {
        let from = FromEventDefinition {
            events: vec![EventDefinition {
                code: FromEventCode::KeyCode(KeyCode::ESCAPE),
            }],
            mandatory_modifiers: vec![],
            optional_modifiers: vec![],
            simultaneous_options: SimultaneousOptions::default(),
            to_after_key_up: vec![],
        };
        assert!(!from.is_simultaneous());
    }

    #[test]
    fn two_events_from_is_simultaneous() {
        let from = FromEventDefinition {
            events: vec![
                EventDefinition {
                    code: FromEventCode::KeyCode(KeyCode::LEFT_SHIFT),
                },
                EventDefinition {
                    code: FromEventCode::KeyCode(KeyCode::LEFT_CONTROL),
                },
            ],
            mandatory_modifiers: vec![],
            optional_modifiers: vec![],
            simultaneous_options: SimultaneousOptions::default(),
            to_after_key_up: vec![],
        };
        assert!(from.is_simultaneous());
    }

    #[test]
    fn default_simultaneous_options_are_lenient() {
        let opts = SimultaneousOptions::default();
        assert_eq!(opts.key_down_order, KeyOrder::Insensitive);
        assert_eq!(opts.key_up_order, KeyOrder::Insensitive);
        assert_eq!(opts.key_up_when, KeyUpWhen::Any);
    }
}
