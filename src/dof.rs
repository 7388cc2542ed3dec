/**
 * Degrees of freedom and the messages exchanged with the low level controller.
 *
 * A ControlCommand holds one scalar per controllable DOF plus the control
 * mode it was computed for. Behaviors fill only the DOFs they claim; the
 * helm's merged output is a dense array indexed by DOF.
 */

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DOF_COUNT: usize = 12;

/// One controllable axis. Discriminants are the wire/array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Dof {
    X = 0,
    Y = 1,
    Z = 2,
    Roll = 3,
    Pitch = 4,
    Yaw = 5,
    Surge = 6,
    Sway = 7,
    Heave = 8,
    RollRate = 9,
    PitchRate = 10,
    YawRate = 11,
}

pub type DofSet = BTreeSet<Dof>;

impl Dof {
    pub const ALL: [Dof; DOF_COUNT] = [
        Dof::X,
        Dof::Y,
        Dof::Z,
        Dof::Roll,
        Dof::Pitch,
        Dof::Yaw,
        Dof::Surge,
        Dof::Sway,
        Dof::Heave,
        Dof::RollRate,
        Dof::PitchRate,
        Dof::YawRate,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dof::X => "x",
            Dof::Y => "y",
            Dof::Z => "z",
            Dof::Roll => "roll",
            Dof::Pitch => "pitch",
            Dof::Yaw => "yaw",
            Dof::Surge => "surge",
            Dof::Sway => "sway",
            Dof::Heave => "heave",
            Dof::RollRate => "roll_rate",
            Dof::PitchRate => "pitch_rate",
            Dof::YawRate => "yaw_rate",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Set point for the low level controller.
///
/// Orientation is (roll, pitch, yaw) in x/y/z; velocity is
/// (surge, sway, heave); angular rate is (roll, pitch, yaw) rate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlCommand {
    pub position: Vector3,
    pub orientation: Vector3,
    pub velocity: Vector3,
    pub angular_rate: Vector3,
    pub control_mode: String,
    /// Seconds since the unix epoch.
    pub stamp: f64,
}

impl ControlCommand {
    pub fn get(&self, dof: Dof) -> f64 {
        match dof {
            Dof::X => self.position.x,
            Dof::Y => self.position.y,
            Dof::Z => self.position.z,
            Dof::Roll => self.orientation.x,
            Dof::Pitch => self.orientation.y,
            Dof::Yaw => self.orientation.z,
            Dof::Surge => self.velocity.x,
            Dof::Sway => self.velocity.y,
            Dof::Heave => self.velocity.z,
            Dof::RollRate => self.angular_rate.x,
            Dof::PitchRate => self.angular_rate.y,
            Dof::YawRate => self.angular_rate.z,
        }
    }

    pub fn set(&mut self, dof: Dof, value: f64) {
        let slot = match dof {
            Dof::X => &mut self.position.x,
            Dof::Y => &mut self.position.y,
            Dof::Z => &mut self.position.z,
            Dof::Roll => &mut self.orientation.x,
            Dof::Pitch => &mut self.orientation.y,
            Dof::Yaw => &mut self.orientation.z,
            Dof::Surge => &mut self.velocity.x,
            Dof::Sway => &mut self.velocity.y,
            Dof::Heave => &mut self.velocity.z,
            Dof::RollRate => &mut self.angular_rate.x,
            Dof::PitchRate => &mut self.angular_rate.y,
            Dof::YawRate => &mut self.angular_rate.z,
        };
        *slot = value;
    }

    pub fn to_dof_array(&self) -> [f64; DOF_COUNT] {
        let mut values = [0.0; DOF_COUNT];
        for dof in Dof::ALL {
            values[dof.index()] = self.get(dof);
        }
        values
    }

    /// Builds a command from a dense array. Mode and stamp are left empty.
    pub fn from_dof_array(values: &[f64; DOF_COUNT]) -> Self {
        let mut command = ControlCommand::default();
        for dof in Dof::ALL {
            command.set(dof, values[dof.index()]);
        }
        command
    }
}

/// Latest known state of the vehicle as reported by the low level controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleState {
    pub position: Vector3,
    pub orientation: Vector3,
    pub velocity: Vector3,
    pub angular_rate: Vector3,
    pub stamp: f64,
}

pub fn now_stamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
