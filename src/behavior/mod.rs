/**
 * Behavior plugins
 *
 * A behavior proposes set points for the DOFs it claims. The helm drives
 * every registered behavior once per cycle and merges their proposals by
 * the priority each one carries in the active mission state.
 */

pub mod depth_tracking;
pub mod factory;

pub use depth_tracking::DepthTracking;
pub use factory::BehaviorFactory;

use std::collections::BTreeMap;

use tracing::info;

use crate::dof::{ControlCommand, DofSet, VehicleState};
use crate::error::{HelmError, Result};
use crate::pubsub::TopicRegistry;

/// Capability set every behavior implements.
///
/// Calls are synchronous and must not block: a stalled behavior stalls the
/// whole control output.
pub trait Behavior: Send {
    /// One-time setup. An error aborts startup.
    fn initialize(&mut self, ctx: &BehaviorContext<'_>) -> Result<()>;

    fn set_cycle_frequency(&mut self, _hz: f64) {}

    /// DOFs the bound control mode accepts this cycle. Advisory: the helm
    /// merges on `dofs()` regardless, so honoring this is up to the behavior.
    fn set_active_dofs(&mut self, _dofs: &DofSet) {}

    fn register_process_values(&mut self, values: &VehicleState);

    /// Writes a proposal into `set_point`. `false` means no valid proposal
    /// this cycle; the behavior is skipped, not removed.
    fn request_set_point(&mut self, set_point: &mut ControlCommand) -> bool;

    /// DOFs this behavior can control. Empty for behaviors that only
    /// observe or act on side channels.
    fn dofs(&self) -> &DofSet;
}

/// What a behavior sees while initializing.
pub struct BehaviorContext<'a> {
    pub name: &'a str,
    pub params: &'a toml::Table,
    pub bus: &'a TopicRegistry,
}

impl<'a> BehaviorContext<'a> {
    /// Numeric parameter with a default. Integers are accepted; any other
    /// type is a configuration error.
    pub fn param_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(toml::Value::Float(v)) => Ok(*v),
            Some(toml::Value::Integer(v)) => Ok(*v as f64),
            Some(other) => Err(HelmError::behavior_init(
                self.name,
                format!("parameter '{key}' must be a number, got {}", other.type_str()),
            )),
        }
    }

    /// Bus name scoped to this behavior, e.g. `/helm/depth/desired_depth`.
    pub fn topic_name(&self, suffix: &str) -> String {
        format!("/helm/{}/{}", self.name, suffix)
    }
}

/// Priority of a behavior per mission state. A behavior is eligible only
/// in states listed here; higher priority wins a DOF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorConfig {
    pub state_priority: BTreeMap<String, i32>,
}

impl BehaviorConfig {
    pub fn priority(&self, state: &str) -> Option<i32> {
        self.state_priority.get(state).copied()
    }

    pub fn with_priority(mut self, state: &str, priority: i32) -> Self {
        self.state_priority.insert(state.to_string(), priority);
        self
    }
}

/// A loaded behavior together with its per-state priorities.
pub struct BehaviorRegistration {
    name: String,
    config: BehaviorConfig,
    behavior: Box<dyn Behavior>,
}

impl BehaviorRegistration {
    pub fn new(name: &str, config: BehaviorConfig, behavior: Box<dyn Behavior>) -> Self {
        Self {
            name: name.to_string(),
            config,
            behavior,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }

    pub fn behavior_mut(&mut self) -> &mut dyn Behavior {
        self.behavior.as_mut()
    }

    pub fn initialize(&mut self, params: &toml::Table, bus: &TopicRegistry, frequency: f64) -> Result<()> {
        let ctx = BehaviorContext {
            name: &self.name,
            params,
            bus,
        };
        self.behavior.initialize(&ctx)?;
        self.behavior.set_cycle_frequency(frequency);

        info!(
            behavior = %self.name,
            dofs = ?self.behavior.dofs(),
            states = ?self.config.state_priority,
            "behavior initialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::Dof;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        dofs: DofSet,
        frequency: Arc<Mutex<Option<f64>>>,
        fail_init: bool,
    }

    impl Behavior for Recorder {
        fn initialize(&mut self, ctx: &BehaviorContext<'_>) -> Result<()> {
            if self.fail_init {
                return Err(HelmError::behavior_init(ctx.name, "refused"));
            }
            Ok(())
        }

        fn set_cycle_frequency(&mut self, hz: f64) {
            *self.frequency.lock().unwrap() = Some(hz);
        }

        fn register_process_values(&mut self, _values: &VehicleState) {}

        fn request_set_point(&mut self, _set_point: &mut ControlCommand) -> bool {
            true
        }

        fn dofs(&self) -> &DofSet {
            &self.dofs
        }
    }

    fn recorder(fail_init: bool, frequency: &Arc<Mutex<Option<f64>>>) -> Box<Recorder> {
        Box::new(Recorder {
            dofs: [Dof::Yaw].into_iter().collect(),
            frequency: Arc::clone(frequency),
            fail_init,
        })
    }

    #[test]
    fn test_initialize_passes_frequency() {
        let bus = TopicRegistry::new();
        let frequency = Arc::new(Mutex::new(None));
        let mut registration =
            BehaviorRegistration::new("recorder", BehaviorConfig::default(), recorder(false, &frequency));
        registration.initialize(&toml::Table::new(), &bus, 20.0).unwrap();

        assert_eq!(*frequency.lock().unwrap(), Some(20.0));
        assert!(registration.behavior().dofs().contains(&Dof::Yaw));
    }

    #[test]
    fn test_initialize_failure_is_fatal() {
        let bus = TopicRegistry::new();
        let frequency = Arc::new(Mutex::new(None));
        let mut registration =
            BehaviorRegistration::new("recorder", BehaviorConfig::default(), recorder(true, &frequency));
        let err = registration.initialize(&toml::Table::new(), &bus, 20.0).unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(*frequency.lock().unwrap(), None);
    }

    #[test]
    fn test_priority_lookup() {
        let config = BehaviorConfig::default().with_priority("survey", 3);
        assert_eq!(config.priority("survey"), Some(3));
        assert_eq!(config.priority("start"), None);
    }

    #[test]
    fn test_param_f64() {
        let params: toml::Table = toml::from_str("a = 2.5\nb = 3\nc = \"x\"").unwrap();
        let bus = TopicRegistry::new();
        let ctx = BehaviorContext { name: "depth", params: &params, bus: &bus };

        assert_eq!(ctx.param_f64("a", 0.0).unwrap(), 2.5);
        assert_eq!(ctx.param_f64("b", 0.0).unwrap(), 3.0);
        assert_eq!(ctx.param_f64("missing", 7.0).unwrap(), 7.0);
        assert!(ctx.param_f64("c", 0.0).is_err());
        assert_eq!(ctx.topic_name("desired_depth"), "/helm/depth/desired_depth");
    }
}
