//! Ref-counted, per-source-device modifier state with locking/sticky
//! modes. Contributors are kept as an explicit list rather than a plain
//! increase/decrease counter, so that sticky and LED-lock variants, and
//! per-device purging on ungrab, are representable without a parallel
//! set of counters per kind.

use crate::ids::DeviceId;
use crate::modifier_flag::{ModifierFlag, ModifierFlagSet};

/// The kind of a single contributor to a flag's pressed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributorType {
    Increase,
    Decrease,
    IncreaseLock,
    DecreaseLock,
    IncreaseSticky,
    DecreaseSticky,
    IncreaseLedLock,
    DecreaseLedLock,
}

impl ContributorType {
    fn sign(self) -> i64 {
        use ContributorType::*;
        match self {
            Increase | IncreaseLock | IncreaseSticky | IncreaseLedLock => 1,
            Decrease | DecreaseLock | DecreaseSticky | DecreaseLedLock => -1,
        }
    }

    fn is_lock(self) -> bool {
        matches!(self, ContributorType::IncreaseLock | ContributorType::DecreaseLock)
    }

    fn is_sticky(self) -> bool {
        matches!(
            self,
            ContributorType::IncreaseSticky | ContributorType::DecreaseSticky
        )
    }

    fn is_led_lock(self) -> bool {
        matches!(
            self,
            ContributorType::IncreaseLedLock | ContributorType::DecreaseLedLock
        )
    }

    fn is_plain(self) -> bool {
        matches!(self, ContributorType::Increase | ContributorType::Decrease)
    }
}

/// One active contributor to a flag's pressed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveModifierFlag {
    pub contributor_type: ContributorType,
    pub flag: ModifierFlag,
    pub device_id: DeviceId,
}

impl ActiveModifierFlag {
    pub fn new(contributor_type: ContributorType, flag: ModifierFlag, device_id: DeviceId) -> Self {
        Self {
            contributor_type,
            flag,
            device_id,
        }
    }
}

/// The modifier-flag manager: an append-only(-ish) list of contributors,
/// queried by summing signed counts per flag.
#[derive(Debug, Default, Clone)]
pub struct ModifierFlagManager {
    contributors: Vec<ActiveModifierFlag>,
}

impl ModifierFlagManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back_active_modifier_flag(&mut self, contributor: ActiveModifierFlag) {
        self.contributors.push(contributor);
    }

    /// On a per-device reset that should not clobber locks/sticky state
    /// (e.g. `device_keys_and_pointing_buttons_are_released`).
    pub fn erase_all_active_modifier_flags_except_lock_and_sticky(&mut self, device_id: DeviceId) {
        self.contributors
            .retain(|c| !(c.device_id == device_id && c.contributor_type.is_plain()));
    }

    /// On device ungrab: every contributor bearing the device's id is
    /// removed, including locks and stickies.
    pub fn erase_all_active_modifier_flags(&mut self, device_id: DeviceId) {
        self.contributors.retain(|c| c.device_id != device_id);
    }

    /// When the OS LED for a lockable flag (only `caps_lock` in practice)
    /// flips off.
    pub fn erase_pressed_led_lock(&mut self, flag: ModifierFlag) {
        self.contributors
            .retain(|c| !(c.flag == flag && c.contributor_type.is_led_lock()));
    }

    fn balance(&self, flag: ModifierFlag) -> i64 {
        self.contributors
            .iter()
            .filter(|c| c.flag == flag)
            .map(|c| c.contributor_type.sign())
            .sum()
    }

    pub fn is_pressed(&self, flag: ModifierFlag) -> bool {
        if flag == ModifierFlag::Zero {
            return true;
        }
        self.balance(flag) > 0
    }

    pub fn is_locked(&self, flag: ModifierFlag) -> bool {
        self.contributors
            .iter()
            .any(|c| c.flag == flag && c.contributor_type.is_lock())
    }

    pub fn is_sticky(&self, flag: ModifierFlag) -> bool {
        self.contributors
            .iter()
            .any(|c| c.flag == flag && c.contributor_type.is_sticky())
    }

    /// The authoritative current modifier set.
    pub fn make_modifier_flags(&self) -> ModifierFlagSet {
        ModifierFlag::TRACKED
            .iter()
            .copied()
            .filter(|&f| self.is_pressed(f))
            .collect()
    }

    /// Computes the contributor list that would have to be pushed (onto
    /// the synthetic/virtual device id) in order for [`Self::make_modifier_flags`]
    /// to equal `desired` afterward — the "scoped modifier flags" helper
    /// used by the post-processor when a `to` event demands a different
    /// modifier state than is currently effective.
    pub fn scoped_modifier_flags_to_reach(&self, desired: &ModifierFlagSet) -> Vec<ActiveModifierFlag> {
        let mut out = Vec::new();
        for &flag in ModifierFlag::TRACKED.iter() {
            let now = self.is_pressed(flag);
            let want = desired.contains(&flag);
            if want && !now {
                out.push(ActiveModifierFlag::new(
                    ContributorType::Increase,
                    flag,
                    DeviceId::ZERO,
                ));
            } else if !want && now {
                out.push(ActiveModifierFlag::new(
                    ContributorType::Decrease,
                    flag,
                    DeviceId::ZERO,
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(n: u32) -> DeviceId {
        DeviceId(n)
    }

    #[test]
    fn increase_then_decrease_cancels() {
        let mut m = ModifierFlagManager::new();
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Increase,
            ModifierFlag::LeftControl,
            dev(1),
        ));
        assert!(m.is_pressed(ModifierFlag::LeftControl));
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Decrease,
            ModifierFlag::LeftControl,
            dev(1),
        ));
        assert!(!m.is_pressed(ModifierFlag::LeftControl));
    }

    /// Any set of contributors applied then reversed, in any interleaving
    /// consistent with the API, ends up
    /// with `make_modifier_flags()` equal to an empty manager's.
    #[test]
    fn any_applied_then_reversed_sequence_returns_to_empty() {
        let mut m = ModifierFlagManager::new();
        let empty = ModifierFlagManager::new().make_modifier_flags();

        let ops = [
            (ContributorType::Increase, ModifierFlag::LeftShift, dev(1)),
            (ContributorType::Increase, ModifierFlag::LeftCommand, dev(2)),
            (ContributorType::Decrease, ModifierFlag::LeftShift, dev(1)),
            (ContributorType::IncreaseLock, ModifierFlag::CapsLock, dev(1)),
            (ContributorType::DecreaseLock, ModifierFlag::CapsLock, dev(1)),
            (ContributorType::Decrease, ModifierFlag::LeftCommand, dev(2)),
        ];
        for (t, f, d) in ops {
            m.push_back_active_modifier_flag(ActiveModifierFlag::new(t, f, d));
        }
        assert_eq!(m.make_modifier_flags(), empty);
    }

    /// After `device_ungrabbed(d)`, no contributor with `device_id == d`
    /// remains.
    #[test]
    fn ungrab_purges_every_contributor_for_that_device() {
        let mut m = ModifierFlagManager::new();
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Increase,
            ModifierFlag::LeftControl,
            dev(1),
        ));
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::IncreaseLock,
            ModifierFlag::CapsLock,
            dev(1),
        ));
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Increase,
            ModifierFlag::LeftShift,
            dev(2),
        ));

        m.erase_all_active_modifier_flags(dev(1));

        assert!(!m.is_pressed(ModifierFlag::LeftControl));
        assert!(!m.is_locked(ModifierFlag::CapsLock));
        assert!(m.is_pressed(ModifierFlag::LeftShift));
    }

    #[test]
    fn except_lock_and_sticky_keeps_locks() {
        let mut m = ModifierFlagManager::new();
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Increase,
            ModifierFlag::LeftShift,
            dev(1),
        ));
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::IncreaseLock,
            ModifierFlag::CapsLock,
            dev(1),
        ));

        m.erase_all_active_modifier_flags_except_lock_and_sticky(dev(1));

        assert!(!m.is_pressed(ModifierFlag::LeftShift));
        assert!(m.is_locked(ModifierFlag::CapsLock));
    }

    #[test]
    fn scoped_modifier_flags_computes_minimal_diff() {
        let mut m = ModifierFlagManager::new();
        m.push_back_active_modifier_flag(ActiveModifierFlag::new(
            ContributorType::Increase,
            ModifierFlag::LeftShift,
            dev(1),
        ));

        let mut desired = ModifierFlagSet::new();
        desired.insert(ModifierFlag::LeftCommand);

        let diff = m.scoped_modifier_flags_to_reach(&desired);
        assert!(diff
            .iter()
            .any(|c| c.flag == ModifierFlag::LeftShift && c.contributor_type == ContributorType::Decrease));
        assert!(diff
            .iter()
            .any(|c| c.flag == ModifierFlag::LeftCommand && c.contributor_type == ContributorType::Increase));
    }
}
