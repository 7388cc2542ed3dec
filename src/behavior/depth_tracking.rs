/**
 * Depth Tracking
 *
 * Holds a requested depth by commanding pitch: the depth error over a
 * look-ahead distance gives a glide angle, and when the vehicle is moving
 * forward the current flight path angle is added on top.
 */

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::dof::{ControlCommand, Dof, DofSet, VehicleState};
use crate::error::{HelmError, Result};
use crate::pubsub::Latest;

use super::{Behavior, BehaviorContext};

pub struct DepthTracking {
    dofs: DofSet,
    process_values: VehicleState,
    requested_depth: f64,
    max_pitch: f64,
    fwd_distance: f64,
    desired_depth: Option<Arc<Latest<f64>>>,
}

impl DepthTracking {
    pub fn new() -> Self {
        Self {
            // Z is claimed but never written, so a winning proposal holds Z at 0.
            dofs: [Dof::Pitch, Dof::Z].into_iter().collect(),
            process_values: VehicleState::default(),
            requested_depth: 0.0,
            max_pitch: FRAC_PI_2,
            fwd_distance: 3.0,
            desired_depth: None,
        }
    }

    fn pitch(&self) -> f64 {
        let state = &self.process_values;
        let error = state.position.z - self.requested_depth;

        let mut pitch = (error / self.fwd_distance).atan();
        if state.velocity.x != 0.0 {
            pitch += (state.velocity.z / state.velocity.x).atan();
        }

        if pitch.abs() > self.max_pitch {
            self.max_pitch.copysign(pitch)
        } else {
            pitch
        }
    }
}

impl Default for DepthTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl Behavior for DepthTracking {
    fn initialize(&mut self, ctx: &BehaviorContext<'_>) -> Result<()> {
        self.requested_depth = ctx.param_f64("initialize_depth", 0.0)?;
        self.max_pitch = ctx.param_f64("max_pitch", FRAC_PI_2)?;
        self.fwd_distance = ctx.param_f64("fwd_distance", 3.0)?;

        if self.fwd_distance <= 0.0 {
            return Err(HelmError::behavior_init(ctx.name, "fwd_distance must be positive"));
        }
        if self.max_pitch < 0.0 {
            return Err(HelmError::behavior_init(ctx.name, "max_pitch must not be negative"));
        }

        self.desired_depth = Some(ctx.bus.get_or_create_latest(&ctx.topic_name("desired_depth")));
        Ok(())
    }

    fn register_process_values(&mut self, values: &VehicleState) {
        self.process_values = values.clone();
    }

    fn request_set_point(&mut self, set_point: &mut ControlCommand) -> bool {
        if let Some(depth) = self.desired_depth.as_ref().and_then(|cell| cell.load()) {
            self.requested_depth = depth;
        }

        set_point.set(Dof::Pitch, self.pitch());
        true
    }

    fn dofs(&self) -> &DofSet {
        &self.dofs
    }
}
