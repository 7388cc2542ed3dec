/**
 * Helm
 *
 * Runs the arbitration cycle at a fixed rate:
 * 1. Reads the latest vehicle state and the active mission state
 * 2. Resolves the control mode bound to that state
 * 3. Drives every behavior and merges their proposals DOF by DOF
 * 4. Publishes one set point to the low level controller
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::behavior::{BehaviorFactory, BehaviorRegistration};
use crate::catalog::{ControlModeCatalog, ControlModeSource};
use crate::dof::{now_stamp, ControlCommand, DofSet, VehicleState, DOF_COUNT};
use crate::error::{HelmError, Result};
use crate::logging::Throttle;
use crate::mission::Mission;
use crate::pubsub::{Latest, Publisher, Subscriber, TopicRegistry};
use crate::shutdown::Shutdown;
use crate::state_machine::{StateControl, StateMachine};

pub const TOPIC_PROCESS_VALUES: &str = "/controller/process_values";
pub const TOPIC_SET_POINT: &str = "/controller/set_point";
pub const SET_POINT_QUEUE: usize = 100;

const SKIP_LOG_PERIOD: Duration = Duration::from_secs(10);

/// Per-DOF winner table for one cycle.
///
/// A proposal replaces the current value of a DOF only with a strictly
/// higher priority, so on ties the earlier offer stays.
#[derive(Debug, Clone)]
pub struct DofArbiter {
    values: [f64; DOF_COUNT],
    priorities: [i32; DOF_COUNT],
}

impl DofArbiter {
    pub fn new() -> Self {
        Self {
            values: [0.0; DOF_COUNT],
            priorities: [i32::MIN; DOF_COUNT],
        }
    }

    pub fn offer(&mut self, priority: i32, dofs: &DofSet, proposal: &ControlCommand) {
        let values = proposal.to_dof_array();
        for dof in dofs {
            let i = dof.index();
            if priority > self.priorities[i] {
                self.values[i] = values[i];
                self.priorities[i] = priority;
            }
        }
    }

    pub fn into_command(self) -> ControlCommand {
        ControlCommand::from_dof_array(&self.values)
    }
}

impl Default for DofArbiter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Helm {
    frequency: f64,
    period: Duration,
    states: StateControl,
    behaviors: Vec<BehaviorRegistration>,
    catalog: ControlModeCatalog,
    process_values: Arc<Latest<VehicleState>>,
    set_point: Publisher<ControlCommand>,
    no_state_log: Throttle,
    unknown_mode_log: Throttle,
}

impl Helm {
    /// Builds the state machine and every behavior from a mission.
    ///
    /// Fails on the first configuration error: no states, an unknown
    /// behavior type or a behavior that refuses to initialize.
    pub fn from_mission(mission: &Mission, factory: &BehaviorFactory, bus: &TopicRegistry) -> Result<Self> {
        let mut machine = StateMachine::new();
        for state in mission.mission_states() {
            machine.append_state(state);
        }
        machine.initialize()?;

        let mut helm = Self::new(mission.helm.frequency, StateControl::new(machine), Vec::new(), bus)?;

        for descriptor in &mission.behaviors {
            let behavior = factory.create(&descriptor.type_id)?;
            let mut registration = BehaviorRegistration::new(&descriptor.name, descriptor.config(), behavior);
            registration.initialize(&descriptor.params, bus, helm.frequency)?;
            helm.behaviors.push(registration);
        }

        info!(frequency = helm.frequency, behaviors = helm.behaviors.len(), "helm configured");
        Ok(helm)
    }

    /// Assembles a helm from parts that are already initialized. The
    /// frequency must be finite and positive.
    pub fn new(
        frequency: f64,
        states: StateControl,
        behaviors: Vec<BehaviorRegistration>,
        bus: &TopicRegistry,
    ) -> Result<Self> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(HelmError::InvalidFrequency(frequency));
        }
        // subnormal rates overflow the period
        let period = Duration::try_from_secs_f64(1.0 / frequency)
            .map_err(|_| HelmError::InvalidFrequency(frequency))?;

        Ok(Self {
            frequency,
            period,
            states,
            behaviors,
            catalog: ControlModeCatalog::default(),
            process_values: bus.get_or_create_latest(TOPIC_PROCESS_VALUES),
            set_point: Publisher::new(bus.get_or_create(TOPIC_SET_POINT, SET_POINT_QUEUE)),
            no_state_log: Throttle::new(SKIP_LOG_PERIOD),
            unknown_mode_log: Throttle::new(SKIP_LOG_PERIOD),
        })
    }

    /// Blocks until `source` reports its control modes or shutdown.
    pub fn fetch_control_modes<S>(&mut self, source: &mut S, retry_interval: Duration, shutdown: &Shutdown) -> Result<()>
    where
        S: ControlModeSource + ?Sized,
    {
        self.catalog = ControlModeCatalog::fetch(source, retry_interval, shutdown)?;
        Ok(())
    }

    pub fn set_catalog(&mut self, catalog: ControlModeCatalog) {
        self.catalog = catalog;
    }

    pub fn state_control(&self) -> StateControl {
        self.states.clone()
    }

    pub fn behaviors(&self) -> &[BehaviorRegistration] {
        &self.behaviors
    }

    /// Handle to the cell the transport writes vehicle state into.
    pub fn process_values(&self) -> Arc<Latest<VehicleState>> {
        Arc::clone(&self.process_values)
    }

    /// One cycle. Returns the published command, or `None` when the cycle
    /// was skipped.
    pub fn iterate(&mut self) -> Option<ControlCommand> {
        let Some(process_values) = self.process_values.load() else {
            if self.no_state_log.ready() {
                debug!("no vehicle state received yet, helm is idle");
            }
            return None;
        };

        let active_state = self.states.active_state();

        let Some(mode) = self.catalog.lookup(&active_state.mode) else {
            if self.unknown_mode_log.ready() {
                warn!(
                    state = %active_state.name,
                    mode = %active_state.mode,
                    "active mode can not be found in low level controller configuration, helm is skipping"
                );
            }
            return None;
        };

        let mut arbiter = DofArbiter::new();

        for registration in &mut self.behaviors {
            let behavior = registration.behavior_mut();
            behavior.set_active_dofs(&mode.dofs);
            behavior.register_process_values(&process_values);

            let mut proposal = ControlCommand::default();
            if !behavior.request_set_point(&mut proposal) {
                trace!(behavior = %registration.name(), "no set point this cycle");
                continue;
            }

            let Some(priority) = registration.config().priority(&active_state.name) else {
                continue;
            };

            // observers: they act through request_set_point side effects only
            let dofs = registration.behavior().dofs();
            if dofs.is_empty() {
                continue;
            }

            arbiter.offer(priority, dofs, &proposal);
        }

        let mut command = arbiter.into_command();
        command.control_mode = active_state.mode;
        command.stamp = now_stamp();

        self.set_point.publish(command.clone());
        Some(command)
    }

    /// Runs `iterate` at the configured rate until shutdown. A cycle that
    /// has started always completes.
    pub fn run(&mut self, shutdown: &Shutdown) {
        let period = self.period;
        let mut next = Instant::now();

        info!(frequency = self.frequency, "helm loop started");

        while !shutdown.is_triggered() {
            self.iterate();

            next += period;
            let now = Instant::now();
            if next <= now {
                // overran, realign instead of bursting to catch up
                debug!(overrun_ms = (now - next).as_secs_f64() * 1e3, "helm cycle overran");
                next = now;
                continue;
            }
            if shutdown.wait_timeout(next - now) {
                break;
            }
        }

        info!("helm loop stopped");
    }

    /// Subscribes to the set point stream this helm publishes on.
    pub fn subscribe_set_points(bus: &TopicRegistry) -> Subscriber<ControlCommand> {
        Subscriber::new(bus.get_or_create(TOPIC_SET_POINT, SET_POINT_QUEUE))
    }
}
