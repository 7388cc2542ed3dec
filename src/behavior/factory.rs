use std::collections::HashMap;

use crate::error::{HelmError, Result};

use super::{Behavior, DepthTracking};

pub type BehaviorConstructor = fn() -> Box<dyn Behavior>;

fn depth_tracking() -> Box<dyn Behavior> {
    Box::new(DepthTracking::new())
}

/// Maps the `type` of a mission behavior entry to a constructor.
#[derive(Default)]
pub struct BehaviorFactory {
    constructors: HashMap<String, BehaviorConstructor>,
}

impl BehaviorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory preloaded with the behaviors shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register("depth_tracking", depth_tracking);
        factory.register("helm::DepthTracking", depth_tracking);
        factory
    }

    /// Registers a constructor, replacing any previous one for `type_id`.
    pub fn register(&mut self, type_id: &str, constructor: BehaviorConstructor) {
        self.constructors.insert(type_id.to_string(), constructor);
    }

    pub fn create(&self, type_id: &str) -> Result<Box<dyn Behavior>> {
        self.constructors
            .get(type_id)
            .map(|construct| construct())
            .ok_or_else(|| HelmError::UnknownBehaviorType(type_id.to_string()))
    }
}
