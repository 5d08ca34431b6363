//! The configuration model: profiles, rules, and the per-manipulator
//! parameter overrides. A global default lives on the profile, and each
//! manipulator may override individual fields via an explicit, typed
//! override struct.

use crate::conditions::Condition;
use crate::definitions::{FromEventDefinition, ToEventDefinition};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub to_if_alone_timeout_milliseconds: u64,
    pub to_if_held_down_threshold_milliseconds: u64,
    pub to_delayed_action_delay_milliseconds: u64,
    pub simultaneous_threshold_milliseconds: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            to_if_alone_timeout_milliseconds: 1000,
            to_if_held_down_threshold_milliseconds: 500,
            to_delayed_action_delay_milliseconds: 500,
            simultaneous_threshold_milliseconds: 50,
        }
    }
}

/// A per-manipulator parameter override: every field is optional, and
/// unset fields fall back to the enclosing profile's [`Parameters`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverrides {
    #[serde(default)]
    pub to_if_alone_timeout_milliseconds: Option<u64>,
    #[serde(default)]
    pub to_if_held_down_threshold_milliseconds: Option<u64>,
    #[serde(default)]
    pub to_delayed_action_delay_milliseconds: Option<u64>,
    #[serde(default)]
    pub simultaneous_threshold_milliseconds: Option<u64>,
}

impl Parameters {
    pub fn apply_overrides(&self, overrides: Option<&ParameterOverrides>) -> Parameters {
        let Some(o) = overrides else {
            return self.clone();
        };
        Parameters {
            to_if_alone_timeout_milliseconds: o
                .to_if_alone_timeout_milliseconds
                .unwrap_or(self.to_if_alone_timeout_milliseconds),
            to_if_held_down_threshold_milliseconds: o
                .to_if_held_down_threshold_milliseconds
                .unwrap_or(self.to_if_held_down_threshold_milliseconds),
            to_delayed_action_delay_milliseconds: o
                .to_delayed_action_delay_milliseconds
                .unwrap_or(self.to_delayed_action_delay_milliseconds),
            simultaneous_threshold_milliseconds: o
                .simultaneous_threshold_milliseconds
                .unwrap_or(self.simultaneous_threshold_milliseconds),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToDelayedAction {
    #[serde(default)]
    pub to_if_invoked: Vec<ToEventDefinition>,
    #[serde(default)]
    pub to_if_canceled: Vec<ToEventDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulatorDefinition {
    pub from: FromEventDefinition,
    pub to: Vec<ToEventDefinition>,
    #[serde(default)]
    pub to_if_alone: Vec<ToEventDefinition>,
    #[serde(default)]
    pub to_if_held_down: Vec<ToEventDefinition>,
    #[serde(default)]
    pub to_delayed_action: Option<ToDelayedAction>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub parameters: Option<ParameterOverrides>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manipulators: Vec<ManipulatorDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfiguration {
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub selected_profile_index: usize,
}

impl CoreConfiguration {
    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profiles.get(self.selected_profile_index)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks beyond what serde already enforces.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.profiles.is_empty() {
            return Err(CoreError::ConfigSemantic("configuration must declare at least one profile".into()));
        }
        if self.selected_profile_index >= self.profiles.len() {
            return Err(CoreError::ConfigSemantic(format!(
                "selected_profile_index {} is out of range for {} profiles",
                self.selected_profile_index,
                self.profiles.len()
            )));
        }
        for profile in &self.profiles {
            for rule in &profile.rules {
                for manipulator in &rule.manipulators {
                    if manipulator.from.events.is_empty() {
                        return Err(CoreError::ConfigSemantic(
                            "manipulator `from` must name at least one event".into(),
                        ));
                    }
                    if manipulator.to.is_empty() {
                        return Err(CoreError::ConfigSemantic(
                            "manipulator `to` must not be empty".into(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
