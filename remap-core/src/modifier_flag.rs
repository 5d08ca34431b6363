//! Modifier flags and the higher-level "modifier family" JSON vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One of the 8 sided modifiers, `caps_lock`, `fn`, or the `zero` sentinel
/// (`zero` is always considered pressed — it is the "no modifier
/// required" marker used internally, never emitted to the virtual HID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierFlag {
    LeftControl,
    LeftShift,
    LeftOption,
    LeftCommand,
    RightControl,
    RightShift,
    RightOption,
    RightCommand,
    CapsLock,
    Fn,
    Zero,
}

impl ModifierFlag {
    /// The 8 sided modifiers, in HID keyboard-report bit order.
    pub const SIDED: [ModifierFlag; 8] = [
        ModifierFlag::LeftControl,
        ModifierFlag::LeftShift,
        ModifierFlag::LeftOption,
        ModifierFlag::LeftCommand,
        ModifierFlag::RightControl,
        ModifierFlag::RightShift,
        ModifierFlag::RightOption,
        ModifierFlag::RightCommand,
    ];

    /// Every flag the modifier-flag manager tracks state for (sided
    /// modifiers plus `caps_lock` and `fn`; `zero` is not a real flag).
    pub const TRACKED: [ModifierFlag; 10] = [
        ModifierFlag::LeftControl,
        ModifierFlag::LeftShift,
        ModifierFlag::LeftOption,
        ModifierFlag::LeftCommand,
        ModifierFlag::RightControl,
        ModifierFlag::RightShift,
        ModifierFlag::RightOption,
        ModifierFlag::RightCommand,
        ModifierFlag::CapsLock,
        ModifierFlag::Fn,
    ];

    /// The keyboard-report modifier bit this flag occupies.
    /// `None` for `caps_lock`, `fn`, and `zero` — they have no modifier-byte
    /// bit (caps_lock is reported as a regular key, `fn` is host-local).
    pub fn hid_report_bit(self) -> Option<u8> {
        match self {
            ModifierFlag::LeftControl => Some(0),
            ModifierFlag::LeftShift => Some(1),
            ModifierFlag::LeftOption => Some(2),
            ModifierFlag::LeftCommand => Some(3),
            ModifierFlag::RightControl => Some(4),
            ModifierFlag::RightShift => Some(5),
            ModifierFlag::RightOption => Some(6),
            ModifierFlag::RightCommand => Some(7),
            ModifierFlag::CapsLock | ModifierFlag::Fn | ModifierFlag::Zero => None,
        }
    }

    /// The HID keyboard usage this flag posts as an actual key_down/key_up
    /// pair when a `to` entry's `modifiers` raises or lowers it. `None` for
    /// `caps_lock`, `fn`, and `zero` — none of those are postable key codes.
    pub fn hid_keycode(self) -> Option<crate::event::KeyCode> {
        use crate::event::KeyCode;
        match self {
            ModifierFlag::LeftControl => Some(KeyCode::LEFT_CONTROL),
            ModifierFlag::LeftShift => Some(KeyCode::LEFT_SHIFT),
            ModifierFlag::LeftOption => Some(KeyCode::LEFT_OPTION),
            ModifierFlag::LeftCommand => Some(KeyCode::LEFT_COMMAND),
            ModifierFlag::RightControl => Some(KeyCode::RIGHT_CONTROL),
            ModifierFlag::RightShift => Some(KeyCode::RIGHT_SHIFT),
            ModifierFlag::RightOption => Some(KeyCode::RIGHT_OPTION),
            ModifierFlag::RightCommand => Some(KeyCode::RIGHT_COMMAND),
            ModifierFlag::CapsLock | ModifierFlag::Fn | ModifierFlag::Zero => None,
        }
    }

    /// Inverse of [`Self::hid_keycode`]: which sided modifier (if any) a
    /// key code physically is. Used to keep the modifier-flag manager in
    /// sync with a physical modifier key that passes through the chain
    /// unmapped — the manager must track a held-down physical `control` the
    /// same way it tracks one a manipulator's `to` stream raised, since
    /// both are just contributors to the same effective pressed state.
    pub fn from_keycode(code: crate::event::KeyCode) -> Option<ModifierFlag> {
        use crate::event::KeyCode;
        match code {
            KeyCode::LEFT_CONTROL => Some(ModifierFlag::LeftControl),
            KeyCode::LEFT_SHIFT => Some(ModifierFlag::LeftShift),
            KeyCode::LEFT_OPTION => Some(ModifierFlag::LeftOption),
            KeyCode::LEFT_COMMAND => Some(ModifierFlag::LeftCommand),
            KeyCode::RIGHT_CONTROL => Some(ModifierFlag::RightControl),
            KeyCode::RIGHT_SHIFT => Some(ModifierFlag::RightShift),
            KeyCode::RIGHT_OPTION => Some(ModifierFlag::RightOption),
            KeyCode::RIGHT_COMMAND => Some(ModifierFlag::RightCommand),
            _ => None,
        }
    }
}

/// A set of modifier flags. Represented as a `BTreeSet` so that equality
/// and iteration order are deterministic — "applied then reversed equals
/// what it would be from an empty manager" is phrased as set equality and
/// tests rely on that.
pub type ModifierFlagSet = BTreeSet<ModifierFlag>;

/// The JSON-facing vocabulary for `mandatory_modifiers`/`optional_modifiers`.
/// A family expands to one or more [`ModifierFlag`]s; `any` does not expand
/// to a flag list at all — it is a wildcard, handled specially wherever it
/// appears (see `FromEventDefinition` matching in `manipulator::basic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierFamily {
    Control,
    Shift,
    #[serde(rename = "option")]
    Option_,
    Command,
    LeftControl,
    LeftShift,
    LeftOption,
    LeftCommand,
    RightControl,
    RightShift,
    RightOption,
    RightCommand,
    CapsLock,
    Fn,
    Any,
}

/// What a [`ModifierFamily`] expands to.
pub enum Expansion {
    Flags(&'static [ModifierFlag]),
    Any,
}

impl ModifierFamily {
    pub fn expand(self) -> Expansion {
        use ModifierFlag::*;
        match self {
            ModifierFamily::Control => Expansion::Flags(&[LeftControl, RightControl]),
            ModifierFamily::Shift => Expansion::Flags(&[LeftShift, RightShift]),
            ModifierFamily::Option_ => Expansion::Flags(&[LeftOption, RightOption]),
            ModifierFamily::Command => Expansion::Flags(&[LeftCommand, RightCommand]),
            ModifierFamily::LeftControl => Expansion::Flags(&[LeftControl]),
            ModifierFamily::LeftShift => Expansion::Flags(&[LeftShift]),
            ModifierFamily::LeftOption => Expansion::Flags(&[LeftOption]),
            ModifierFamily::LeftCommand => Expansion::Flags(&[LeftCommand]),
            ModifierFamily::RightControl => Expansion::Flags(&[RightControl]),
            ModifierFamily::RightShift => Expansion::Flags(&[RightShift]),
            ModifierFamily::RightOption => Expansion::Flags(&[RightOption]),
            ModifierFamily::RightCommand => Expansion::Flags(&[RightCommand]),
            ModifierFamily::CapsLock => Expansion::Flags(&[CapsLock]),
            ModifierFamily::Fn => Expansion::Flags(&[Fn]),
            ModifierFamily::Any => Expansion::Any,
        }
    }

    /// The concrete flags this family covers, or every tracked flag if
    /// this is `any` (used when building the "covered by mandatory ∪
    /// optional" set for excess-modifier checks).
    pub fn covered_flags(self) -> &'static [ModifierFlag] {
        match self.expand() {
            Expansion::Flags(flags) => flags,
            Expansion::Any => &ModifierFlag::TRACKED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_expands_to_both_sides() {
        match ModifierFamily::Control.expand() {
            Expansion::Flags(flags) => {
                assert_eq!(flags, &[ModifierFlag::LeftControl, ModifierFlag::RightControl]);
            }
            Expansion::Any => panic!("control must not expand to any"),
        }
    }

    #[test]
    fn any_covers_every_tracked_flag() {
        assert_eq!(ModifierFamily::Any.covered_flags(), &ModifierFlag::TRACKED);
    }

    #[test]
    fn from_keycode_is_the_inverse_of_hid_keycode() {
        for &flag in ModifierFlag::SIDED.iter() {
            assert_eq!(ModifierFlag::from_keycode(flag.hid_keycode().unwrap()), Some(flag));
        }
        assert_eq!(ModifierFlag::from_keycode(crate::event::KeyCode::ESCAPE), None);
    }
}
