/**
 * Control Mode Catalog
 *
 * Control modes are defined by the low level controller. The helm asks for
 * them once at startup, retrying until the controller answers, and keeps
 * the answer for the rest of the process.
 */

use std::time::Duration;

use tracing::{info, warn};

use crate::dof::DofSet;
use crate::error::{HelmError, Result};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMode {
    pub name: String,
    pub dofs: DofSet,
}

impl ControlMode {
    pub fn new(name: &str, dofs: impl IntoIterator<Item = crate::dof::Dof>) -> Self {
        Self {
            name: name.to_string(),
            dofs: dofs.into_iter().collect(),
        }
    }
}

/// Anything that can answer the control mode query.
pub trait ControlModeSource {
    /// One attempt. `ControllerUnavailable` means try again later.
    fn control_modes(&mut self) -> Result<Vec<ControlMode>>;
}

/// Fixed answer, for tests and for hosts that configure modes directly.
#[derive(Debug, Clone, Default)]
pub struct StaticControlModes(pub Vec<ControlMode>);

impl ControlModeSource for StaticControlModes {
    fn control_modes(&mut self) -> Result<Vec<ControlMode>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControlModeCatalog {
    modes: Vec<ControlMode>,
}

impl ControlModeCatalog {
    pub fn new(modes: Vec<ControlMode>) -> Self {
        Self { modes }
    }

    /// Queries `source` until it answers. Every failed attempt is logged and
    /// followed by a wait of `retry_interval` that a shutdown cuts short.
    pub fn fetch<S>(source: &mut S, retry_interval: Duration, shutdown: &Shutdown) -> Result<Self>
    where
        S: ControlModeSource + ?Sized,
    {
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_triggered() {
                return Err(HelmError::Shutdown);
            }

            attempt += 1;
            match source.control_modes() {
                Ok(modes) => {
                    info!(
                        count = modes.len(),
                        modes = ?modes.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                        "control modes loaded"
                    );
                    return Ok(Self::new(modes));
                }
                Err(HelmError::Shutdown) => return Err(HelmError::Shutdown),
                Err(e) => {
                    warn!(attempt, error = %e, "waiting for low level controller control modes");
                }
            }

            if shutdown.wait_timeout(retry_interval) {
                return Err(HelmError::Shutdown);
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ControlMode> {
        self.modes.iter().find(|m| m.name == name)
    }
}
