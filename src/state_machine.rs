/**
 * Mission State Machine
 *
 * Tracks the active mission state and gates transitions: a jump is taken
 * only along an edge the active state declares, to a state that exists.
 * Anything else is rejected without touching the active state.
 */

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::error::{HelmError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionState {
    pub name: String,
    pub initial: bool,
    /// States reachable directly from this one. Edges are not symmetric.
    pub transitions: BTreeSet<String>,
    /// Low level control mode bound to this state.
    pub mode: String,
}

impl MissionState {
    pub fn new(name: &str, mode: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: mode.to_string(),
            ..Default::default()
        }
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn with_transition(mut self, target: &str) -> Self {
        self.transitions.insert(target.to_string());
        self
    }
}

#[derive(Debug, Default)]
pub struct StateMachine {
    states: Vec<MissionState>,
    active: Option<MissionState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate names are not checked here; the mission loader rejects them.
    pub fn append_state(&mut self, state: MissionState) {
        self.states.push(state);
    }

    /// Activates the first `initial` state, else the first appended one.
    pub fn initialize(&mut self) -> Result<()> {
        let selected = self
            .states
            .iter()
            .find(|s| s.initial)
            .or_else(|| self.states.first())
            .cloned()
            .ok_or(HelmError::NoStates)?;

        info!(state = %selected.name, mode = %selected.mode, "state machine initialized");
        self.active = Some(selected);
        Ok(())
    }

    /// Snapshot of the active state. Before `initialize` this is an empty
    /// state with no mode, which no control mode will match.
    pub fn active_state(&self) -> MissionState {
        self.active.clone().unwrap_or_default()
    }

    pub fn translate_to(&mut self, target: &str) -> bool {
        let Some(active) = &self.active else {
            return false;
        };

        if !active.transitions.contains(target) {
            return false;
        }

        match self.states.iter().find(|s| s.name == target) {
            Some(state) => {
                self.active = Some(state.clone());
                true
            }
            None => false,
        }
    }

    pub fn state(&self, name: &str) -> Option<MissionState> {
        self.states.iter().find(|s| s.name == name).cloned()
    }

    pub fn states(&self) -> &[MissionState] {
        &self.states
    }
}

/// Shared handle to the state machine, used by the helm loop and by the
/// external mission-state control surface.
///
/// Every operation takes the lock for its whole duration, so a transition
/// lands either before or after a cycle's read of the active state.
#[derive(Clone, Default)]
pub struct StateControl {
    inner: Arc<Mutex<StateMachine>>,
}

impl StateControl {
    pub fn new(machine: StateMachine) -> Self {
        Self { inner: Arc::new(Mutex::new(machine)) }
    }

    fn lock(&self) -> MutexGuard<'_, StateMachine> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_state(&self) -> MissionState {
        self.lock().active_state()
    }

    pub fn state(&self, name: &str) -> Option<MissionState> {
        self.lock().state(name)
    }

    pub fn states(&self) -> Vec<MissionState> {
        self.lock().states().to_vec()
    }

    pub fn change_state(&self, name: &str) -> bool {
        let mut machine = self.lock();
        let from = machine.active_state().name;

        if machine.translate_to(name) {
            info!(from = %from, to = %name, "mission state changed");
            true
        } else {
            warn!(from = %from, to = %name, "rejected mission state transition");
            false
        }
    }
}
