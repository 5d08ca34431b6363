//! The manipulator environment: the single mutable aggregate every
//! condition reads and every event may mutate.

use crate::event::{SystemPreferencesSnapshot, VariableValue};
use crate::ids::EventTimeStamp;
use crate::logger::Logger;
use crate::modifier_flag_manager::ModifierFlagManager;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontmostApplication {
    pub bundle_id: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSource {
    pub language: String,
    pub input_source_id: String,
    pub input_mode_id: String,
}

pub struct ManipulatorEnvironment {
    pub frontmost_application: Option<FrontmostApplication>,
    pub input_source: Option<InputSource>,
    pub variables: HashMap<String, VariableValue>,
    pub virtual_hid_ready: bool,
    pub system_preferences: SystemPreferencesSnapshot,
    pub modifier_flag_manager: ModifierFlagManager,
    pub current_event_time: EventTimeStamp,
    pub logger: Logger,
}

impl ManipulatorEnvironment {
    pub fn new(logger: Logger) -> Self {
        Self {
            frontmost_application: None,
            input_source: None,
            variables: HashMap::new(),
            virtual_hid_ready: false,
            system_preferences: SystemPreferencesSnapshot::default(),
            modifier_flag_manager: ModifierFlagManager::new(),
            current_event_time: EventTimeStamp::ZERO,
            logger,
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: String, value: VariableValue) {
        self.variables.insert(name, value);
    }
}

impl Default for ManipulatorEnvironment {
    fn default() -> Self {
        Self::new(Logger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_roundtrip() {
        let mut env = ManipulatorEnvironment::default();
        env.set_variable("layer".to_string(), VariableValue::Int(2));
        assert_eq!(env.get_variable("layer"), Some(&VariableValue::Int(2)));
        assert_eq!(env.get_variable("missing"), None);
    }
}
