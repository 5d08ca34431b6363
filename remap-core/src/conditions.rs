//! Conditions: predicates over the environment and the triggering event,
//! all of which must hold for a manipulator to activate.

use crate::environment::ManipulatorEnvironment;
use crate::event::{InputSourceSpecifier, VariableValue};
use crate::ids::DeviceId;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A device identifier used by `device_if`/`device_unless` conditions.
/// Matching is scoped to what the core can see about a source device
/// (its allocated [`DeviceId`]) — USB/Bluetooth descriptor matching is an
/// out-of-scope, IOKit-specific concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    FrontmostApplicationIf {
        bundle_identifiers: Vec<String>,
        #[serde(default)]
        file_paths: Vec<String>,
    },
    FrontmostApplicationUnless {
        bundle_identifiers: Vec<String>,
        #[serde(default)]
        file_paths: Vec<String>,
    },
    DeviceIf {
        identifiers: Vec<DeviceIdentifier>,
    },
    DeviceUnless {
        identifiers: Vec<DeviceIdentifier>,
    },
    InputSourceIf {
        input_sources: Vec<InputSourceSpecifier>,
    },
    InputSourceUnless {
        input_sources: Vec<InputSourceSpecifier>,
    },
    VariableIf {
        name: String,
        value: VariableValue,
    },
    VariableUnless {
        name: String,
        value: VariableValue,
    },
    KeyboardTypeIf {
        keyboard_types: Vec<String>,
    },
    KeyboardTypeUnless {
        keyboard_types: Vec<String>,
    },
    EventChangedIf {
        value: bool,
    },
    EventChangedUnless {
        value: bool,
    },
}

fn any_regex_matches(patterns: &[String], value: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false))
}

fn frontmost_application_matches(
    environment: &ManipulatorEnvironment,
    bundle_identifiers: &[String],
    file_paths: &[String],
) -> bool {
    let Some(app) = &environment.frontmost_application else {
        return false;
    };
    any_regex_matches(bundle_identifiers, &app.bundle_id) || any_regex_matches(file_paths, &app.file_path)
}

fn input_source_matches(environment: &ManipulatorEnvironment, specifiers: &[InputSourceSpecifier]) -> bool {
    let Some(current) = &environment.input_source else {
        return false;
    };
    specifiers.iter().any(|spec| {
        let language_ok = spec
            .language
            .as_ref()
            .map(|p| Regex::new(p).map(|re| re.is_match(&current.language)).unwrap_or(false))
            .unwrap_or(true);
        let id_ok = spec
            .input_source_id
            .as_ref()
            .map(|p| {
                Regex::new(p)
                    .map(|re| re.is_match(&current.input_source_id))
                    .unwrap_or(false)
            })
            .unwrap_or(true);
        let mode_ok = spec
            .input_mode_id
            .as_ref()
            .map(|p| {
                Regex::new(p)
                    .map(|re| re.is_match(&current.input_mode_id))
                    .unwrap_or(false)
            })
            .unwrap_or(true);
        language_ok && id_ok && mode_ok
    })
}

impl Condition {
    /// Evaluates this condition against the current environment for an
    /// event originating on `device_id`. Conditions are evaluated at
    /// activation time only; once an activation exists it persists
    /// independently of later environment changes.
    pub fn evaluate(&self, environment: &ManipulatorEnvironment, device_id: DeviceId) -> bool {
        match self {
            Condition::FrontmostApplicationIf {
                bundle_identifiers,
                file_paths,
            } => frontmost_application_matches(environment, bundle_identifiers, file_paths),
            Condition::FrontmostApplicationUnless {
                bundle_identifiers,
                file_paths,
            } => !frontmost_application_matches(environment, bundle_identifiers, file_paths),
            Condition::DeviceIf { identifiers } => identifiers.iter().any(|id| id.device_id == device_id),
            Condition::DeviceUnless { identifiers } => identifiers.iter().all(|id| id.device_id != device_id),
            Condition::InputSourceIf { input_sources } => input_source_matches(environment, input_sources),
            Condition::InputSourceUnless { input_sources } => !input_source_matches(environment, input_sources),
            Condition::VariableIf { name, value } => environment.get_variable(name) == Some(value),
            Condition::VariableUnless { name, value } => environment.get_variable(name) != Some(value),
            // Keyboard-type matching depends on per-device IOKit
            // descriptors, which is out of scope; the core
            // always treats these as satisfied/unsatisfied respectively
            // unless a future narrow interface supplies the type.
            Condition::KeyboardTypeIf { .. } => true,
            Condition::KeyboardTypeUnless { .. } => true,
            Condition::EventChangedIf { value } => *value,
            Condition::EventChangedUnless { value } => !*value,
        }
    }
}

pub fn evaluate_all(conditions: &[Condition], environment: &ManipulatorEnvironment, device_id: DeviceId) -> bool {
    conditions.iter().all(|c| c.evaluate(environment, device_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FrontmostApplication;

    #[test]
    fn frontmost_application_if_matches_regex() {
        let mut env = ManipulatorEnvironment::default();
        env.frontmost_application = Some(FrontmostApplication {
            bundle_id: "com.apple.Terminal".to_string(),
            file_path: "/Applications/Utilities/Terminal.app".to_string(),
        });
        let cond = Condition::FrontmostApplicationIf {
            bundle_identifiers: vec!["^com\\.apple\\.Terminal$".to_string()],
            file_paths: vec![],
        };
        assert!(cond.evaluate(&env, DeviceId(1)));

        let cond_unless = Condition::FrontmostApplicationUnless {
            bundle_identifiers: vec!["^com\\.apple\\.Terminal$".to_string()],
            file_paths: vec![],
        };
        assert!(!cond_unless.evaluate(&env, DeviceId(1)));
    }

    #[test]
    fn variable_if_requires_exact_value() {
        let mut env = ManipulatorEnvironment::default();
        env.set_variable("mode".to_string(), VariableValue::Int(1));
        let cond = Condition::VariableIf {
            name: "mode".to_string(),
            value: VariableValue::Int(1),
        };
        assert!(cond.evaluate(&env, DeviceId(1)));
        let cond2 = Condition::VariableIf {
            name: "mode".to_string(),
            value: VariableValue::Int(2),
        };
        assert!(!cond2.evaluate(&env, DeviceId(1)));
    }

    #[test]
    fn device_if_matches_by_id() {
        let env = ManipulatorEnvironment::default();
        let cond = Condition::DeviceIf {
            identifiers: vec![DeviceIdentifier { device_id: DeviceId(2) }],
        };
        assert!(!cond.evaluate(&env, DeviceId(1)));
        assert!(cond.evaluate(&env, DeviceId(2)));
    }
}
