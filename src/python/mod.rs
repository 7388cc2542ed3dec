use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::behavior::BehaviorFactory;
use crate::catalog::{ControlMode, ControlModeCatalog};
use crate::dof::{ControlCommand, Dof, Vector3, VehicleState};
use crate::error::HelmError;
use crate::helm::Helm;
use crate::mission::Mission;
use crate::pubsub::{Latest, Subscriber, TopicRegistry};
use crate::shutdown::Shutdown;
use crate::state_machine::StateControl;

type Triple = (f64, f64, f64);

fn vector(v: Triple) -> Vector3 {
    Vector3::new(v.0, v.1, v.2)
}

fn triple(v: &Vector3) -> Triple {
    (v.x, v.y, v.z)
}

fn to_py_err(e: HelmError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

fn not_started() -> PyErr {
    PyRuntimeError::new_err("helm already started")
}

/// Helm driven from a task script: the script feeds vehicle state, reads
/// set points and steers the mission state machine.
#[pyclass]
pub struct PyHelm {
    helm: Option<Helm>,
    bus: Arc<TopicRegistry>,
    states: StateControl,
    process_values: Arc<Latest<VehicleState>>,
    set_points: Subscriber<ControlCommand>,
    shutdown: Shutdown,
    handle: Option<JoinHandle<()>>,
}

impl PyHelm {
    fn from_mission(mission: &Mission) -> Result<Self, HelmError> {
        let bus = Arc::new(TopicRegistry::new());
        let helm = Helm::from_mission(mission, &BehaviorFactory::with_builtins(), &bus)?;

        Ok(Self {
            states: helm.state_control(),
            process_values: helm.process_values(),
            set_points: Helm::subscribe_set_points(&bus),
            helm: Some(helm),
            bus,
            shutdown: Shutdown::new(),
            handle: None,
        })
    }
}

#[pymethods]
impl PyHelm {
    #[new]
    fn new(mission_path: &str) -> PyResult<Self> {
        let mission = Mission::load(mission_path).map_err(to_py_err)?;
        Self::from_mission(&mission).map_err(to_py_err)
    }

    /// Control modes as (name, [dof index]) pairs. Must be set before start.
    fn set_control_modes(&mut self, modes: Vec<(String, Vec<u8>)>) -> PyResult<()> {
        let helm = self.helm.as_mut().ok_or_else(not_started)?;

        let mut catalog = Vec::with_capacity(modes.len());
        for (name, indices) in modes {
            let dofs = indices
                .into_iter()
                .map(|i| Dof::from_index(i).ok_or_else(|| PyValueError::new_err(format!("unknown dof index {i}"))))
                .collect::<PyResult<Vec<_>>>()?;
            catalog.push(ControlMode::new(&name, dofs));
        }
        helm.set_catalog(ControlModeCatalog::new(catalog));
        Ok(())
    }

    fn start(&mut self) -> PyResult<()> {
        let mut helm = self.helm.take().ok_or_else(not_started)?;
        let shutdown = self.shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("helm-loop".into())
            .spawn(move || helm.run(&shutdown))
            .map_err(|e| to_py_err(e.into()))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Runs a single cycle without the timer. Only before start.
    fn step(&mut self) -> PyResult<bool> {
        let helm = self.helm.as_mut().ok_or_else(not_started)?;
        Ok(helm.iterate().is_some())
    }

    fn push_process_values(&self, position: Triple, orientation: Triple, velocity: Triple, angular_rate: Triple) {
        self.process_values.store(VehicleState {
            position: vector(position),
            orientation: vector(orientation),
            velocity: vector(velocity),
            angular_rate: vector(angular_rate),
            stamp: crate::dof::now_stamp(),
        });
    }

    /// Writes a scalar behavior input, e.g. "/helm/depth/desired_depth".
    fn set_value(&self, topic: &str, value: f64) {
        self.bus.get_or_create_latest::<f64>(topic).store(value);
    }

    /// Most recent set point as (mode, position, orientation, velocity, angular_rate).
    fn latest_set_point(&self) -> Option<(String, Triple, Triple, Triple, Triple)> {
        std::iter::from_fn(|| self.set_points.try_recv()).last().map(|c| {
            (
                c.control_mode.clone(),
                triple(&c.position),
                triple(&c.orientation),
                triple(&c.velocity),
                triple(&c.angular_rate),
            )
        })
    }

    fn active_state(&self) -> (String, String) {
        let state = self.states.active_state();
        (state.name, state.mode)
    }

    fn states(&self) -> Vec<String> {
        self.states.states().into_iter().map(|s| s.name).collect()
    }

    fn change_state(&self, name: &str) -> bool {
        self.states.change_state(name)
    }

    fn shutdown(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[pymodule]
fn auv_helm(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyHelm>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const MISSION: &str = r#"
[helm]
frequency = 20.0

[[state]]
name = "start"
initial = true
mode = "flight"
transitions = ["surface"]

[[state]]
name = "surface"
mode = "idle"

[[behavior]]
name = "depth"
type = "depth_tracking"
states = { start = 1 }
"#;

    fn py_helm() -> PyHelm {
        PyHelm::from_mission(&Mission::from_toml_str(MISSION).unwrap()).unwrap()
    }

    #[test]
    fn test_py_step_and_read_set_point() {
        let mut helm = py_helm();
        helm.set_control_modes(vec![("flight".into(), vec![2, 4])]).unwrap();

        assert!(!helm.step().unwrap());
        helm.push_process_values((0.0, 0.0, 3.0), (0.0, 0.0, 0.0), (0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
        helm.set_value("/helm/depth/desired_depth", 0.0);
        assert!(helm.step().unwrap());

        let (mode, _, orientation, _, _) = helm.latest_set_point().unwrap();
        assert_eq!(mode, "flight");
        assert!((orientation.1 - 1.0f64.atan()).abs() < 1e-12);
    }

    #[test]
    fn test_py_state_control() {
        let helm = py_helm();
        assert_eq!(helm.active_state(), ("start".to_string(), "flight".to_string()));
        assert_eq!(helm.states(), vec!["start".to_string(), "surface".to_string()]);
        assert!(helm.change_state("surface"));
        assert!(!helm.change_state("start"));
    }

    #[test]
    fn test_py_helms_build_concurrently() {
        let workers: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..20).all(|_| py_helm().states().len() == 2)))
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }
    }
}
