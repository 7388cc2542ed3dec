use thiserror::Error;

pub type Result<T> = std::result::Result<T, HelmError>;

/// Errors that cross module boundaries.
///
/// Per-cycle soft failures (no vehicle state yet, unknown control mode,
/// a behavior without a proposal) are not represented here: the loop
/// skips the affected unit of work and logs.
#[derive(Debug, Error)]
pub enum HelmError {
    #[error("state machine has no states")]
    NoStates,

    #[error("invalid mission: {0}")]
    InvalidMission(String),

    #[error("failed to parse mission: {0}")]
    MissionParse(#[from] toml::de::Error),

    #[error("unknown behavior type '{0}'")]
    UnknownBehaviorType(String),

    #[error("behavior '{name}' failed to initialize: {reason}")]
    BehaviorInit { name: String, reason: String },

    #[error("invalid helm frequency {0} Hz")]
    InvalidFrequency(f64),

    #[error("low level controller unavailable: {0}")]
    ControllerUnavailable(String),

    #[error("link protocol error: {0}")]
    Protocol(String),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown requested")]
    Shutdown,
}

impl HelmError {
    pub fn behavior_init(name: &str, reason: impl Into<String>) -> Self {
        HelmError::BehaviorInit { name: name.to_string(), reason: reason.into() }
    }

    /// True for failures that abort startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HelmError::NoStates
                | HelmError::InvalidMission(_)
                | HelmError::MissionParse(_)
                | HelmError::UnknownBehaviorType(_)
                | HelmError::BehaviorInit { .. }
                | HelmError::InvalidFrequency(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_init_message() {
        let err = HelmError::behavior_init("depth", "missing fwd_distance");
        assert_eq!(err.to_string(), "behavior 'depth' failed to initialize: missing fwd_distance");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transient_errors_are_not_configuration() {
        assert!(!HelmError::ControllerUnavailable("no reply".into()).is_configuration());
        assert!(!HelmError::Shutdown.is_configuration());
    }

    #[test]
    fn test_thread_spawn_failure_is_io() {
        let spawn = std::io::Error::new(std::io::ErrorKind::WouldBlock, "cannot spawn helm-console");
        let err = HelmError::from(spawn);
        assert!(matches!(err, HelmError::Io(_)));
        assert!(!err.is_configuration());
    }
}
