//! Mission descriptor.
//!
//! A mission is a TOML document with one `[helm]` table, an ordered list of
//! `[[state]]` entries and an ordered list of `[[behavior]]` entries. File
//! order is registration order, which is also the priority tie-break.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::behavior::BehaviorConfig;
use crate::error::{HelmError, Result};
use crate::logging::LogConfig;
use crate::state_machine::MissionState;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HelmConfig {
    /// Cycle rate in Hz.
    pub frequency: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StateDescriptor {
    pub name: String,
    #[serde(default)]
    pub initial: bool,
    pub mode: String,
    #[serde(default)]
    pub transitions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BehaviorDescriptor {
    pub name: String,
    /// Identifier the behavior factory resolves to an implementation.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Mission state name to priority.
    #[serde(default)]
    pub states: BTreeMap<String, i32>,
    #[serde(default)]
    pub params: toml::Table,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Mission {
    pub helm: HelmConfig,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default, rename = "state")]
    pub states: Vec<StateDescriptor>,
    #[serde(default, rename = "behavior")]
    pub behaviors: Vec<BehaviorDescriptor>,
}

impl StateDescriptor {
    pub fn to_state(&self) -> MissionState {
        MissionState {
            name: self.name.clone(),
            initial: self.initial,
            transitions: self.transitions.iter().cloned().collect(),
            mode: self.mode.clone(),
        }
    }
}

impl BehaviorDescriptor {
    pub fn config(&self) -> BehaviorConfig {
        BehaviorConfig {
            state_priority: self.states.clone(),
        }
    }
}

impl Mission {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mission: Mission = toml::from_str(content)?;
        mission.validate()?;
        Ok(mission)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rejects what would make startup meaningless; warns about entries that
    /// are merely inert at runtime.
    pub fn validate(&self) -> Result<()> {
        let frequency = self.helm.frequency;
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(HelmError::InvalidFrequency(frequency));
        }

        if self.states.is_empty() {
            return Err(HelmError::NoStates);
        }

        let mut names = BTreeSet::new();
        for state in &self.states {
            if !names.insert(state.name.as_str()) {
                return Err(HelmError::InvalidMission(format!("duplicate state '{}'", state.name)));
            }
        }

        let initial: Vec<&str> = self.states.iter().filter(|s| s.initial).map(|s| s.name.as_str()).collect();
        if initial.len() > 1 {
            warn!(states = ?initial, "more than one initial state, the first one is used");
        }

        for state in &self.states {
            for target in state.transitions.iter().filter(|t| !names.contains(t.as_str())) {
                warn!(state = %state.name, target = %target, "transition to unknown state will always be rejected");
            }
        }

        let mut behavior_names = HashSet::new();
        for behavior in &self.behaviors {
            if !behavior_names.insert(behavior.name.as_str()) {
                return Err(HelmError::InvalidMission(format!("duplicate behavior '{}'", behavior.name)));
            }
            for state in behavior.states.keys().filter(|s| !names.contains(s.as_str())) {
                warn!(behavior = %behavior.name, state = %state, "priority given for unknown state");
            }
        }

        Ok(())
    }

    pub fn mission_states(&self) -> Vec<MissionState> {
        self.states.iter().map(StateDescriptor::to_state).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    const MISSION: &str = r#"
[helm]
frequency = 10.0

[logging]
format = "compact"

[[state]]
name = "start"
initial = true
mode = "idle"
transitions = ["survey"]

[[state]]
name = "survey"
mode = "flight"
transitions = ["start", "kill"]

[[state]]
name = "kill"
mode = "idle"

[[behavior]]
name = "depth"
type = "depth_tracking"
states = { survey = 2 }
params = { fwd_distance = 4.0 }

[[behavior]]
name = "watchdog"
type = "monitor"
"#;

    #[test]
    fn test_parse_mission() {
        let mission = Mission::from_toml_str(MISSION).unwrap();
        assert_eq!(mission.helm.frequency, 10.0);
        assert_eq!(mission.logging.format, LogFormat::Compact);

        let states = mission.mission_states();
        assert_eq!(states.len(), 3);
        assert!(states[0].initial);
        assert!(states[1].transitions.contains("kill"));

        let depth = &mission.behaviors[0];
        assert_eq!(depth.type_id, "depth_tracking");
        assert_eq!(depth.config().priority("survey"), Some(2));
        assert_eq!(depth.params.get("fwd_distance").and_then(|v| v.as_float()), Some(4.0));

        assert!(mission.behaviors[1].states.is_empty());
    }

    #[test]
    fn test_order_is_file_order() {
        let mission = Mission::from_toml_str(MISSION).unwrap();
        let names: Vec<_> = mission.states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["start", "survey", "kill"]);
    }

    #[test]
    fn test_no_states_rejected() {
        let err = Mission::from_toml_str("[helm]\nfrequency = 5.0\n").unwrap_err();
        assert!(matches!(err, HelmError::NoStates));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let content = r#"
[helm]
frequency = 5.0
[[state]]
name = "a"
mode = "idle"
[[state]]
name = "a"
mode = "flight"
"#;
        assert!(matches!(Mission::from_toml_str(content), Err(HelmError::InvalidMission(_))));
    }

    #[test]
    fn test_bad_frequency_rejected() {
        let content = "[helm]\nfrequency = 0.0\n[[state]]\nname = \"a\"\nmode = \"idle\"\n";
        assert!(matches!(Mission::from_toml_str(content), Err(HelmError::InvalidFrequency(_))));
    }

    #[test]
    fn test_malformed_document_rejected() {
        let err = Mission::from_toml_str("[helm\nfrequency = ").unwrap_err();
        assert!(matches!(err, HelmError::MissionParse(_)));
        assert!(err.is_configuration());
    }
}
