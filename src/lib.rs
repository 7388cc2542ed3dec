pub mod error;
pub mod dof;
pub mod ring_buffer;
pub mod pubsub;
pub mod shutdown;
pub mod logging;
pub mod state_machine;
pub mod behavior;
pub mod catalog;
pub mod mission;
pub mod helm;
pub mod link;

#[cfg(feature = "python")]
pub mod python;

pub use error::{HelmError, Result};
pub use dof::{ControlCommand, Dof, DofSet, Vector3, VehicleState, DOF_COUNT};
pub use ring_buffer::RingBuffer;
pub use pubsub::{Latest, Message, Publisher, Subscriber, Topic, TopicRegistry};
pub use shutdown::Shutdown;
pub use state_machine::{MissionState, StateControl, StateMachine};
pub use behavior::{Behavior, BehaviorConfig, BehaviorContext, BehaviorFactory, BehaviorRegistration};
pub use catalog::{ControlMode, ControlModeCatalog, ControlModeSource, StaticControlModes};
pub use mission::Mission;
pub use helm::{DofArbiter, Helm};
pub use link::SerialLink;
