use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use super::latest::Latest;
use super::message::Message;
use super::topic::Topic;

type Entry = Arc<dyn Any + Send + Sync>;

/// Named set point streams and latest-value cells shared between the helm,
/// its behaviors and the transport. Streams and cells live in separate
/// namespaces.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Entry>>,
    cells: RwLock<HashMap<String, Entry>>,
}

/// Returns the entry under `name`, creating it when absent. A name reused
/// with another message type gets a fresh entry.
fn get_or_insert<V: Any + Send + Sync>(
    map: &RwLock<HashMap<String, Entry>>,
    name: &str,
    create: impl FnOnce() -> V,
) -> Arc<V> {
    let mut entries = map.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = entries.get(name) {
        match Arc::clone(existing).downcast::<V>() {
            Ok(entry) => return entry,
            Err(_) => warn!(topic = name, "bus entry reused with a different message type, replacing it"),
        }
    }

    let entry = Arc::new(create());
    entries.insert(name.to_string(), Arc::clone(&entry) as Entry);
    entry
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create<T: Message>(&self, name: &str, capacity: usize) -> Arc<Topic<T>> {
        get_or_insert(&self.topics, name, || Topic::<T>::new(name, capacity))
    }

    pub fn get_or_create_latest<T: Message>(&self, name: &str) -> Arc<Latest<T>> {
        get_or_insert(&self.cells, name, Latest::<T>::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::{ControlCommand, VehicleState};
    use crate::pubsub::{Publisher, Subscriber};

    #[test]
    fn test_same_name_shares_the_stream() {
        let registry = TopicRegistry::new();
        let tx = Publisher::new(registry.get_or_create::<ControlCommand>("/controller/set_point", 8));
        let rx = Subscriber::new(registry.get_or_create::<ControlCommand>("/controller/set_point", 8));

        tx.publish(ControlCommand {
            control_mode: "flight".into(),
            ..Default::default()
        });
        assert_eq!(rx.try_recv().unwrap().control_mode, "flight");
    }

    #[test]
    fn test_latest_cells_are_shared() {
        let registry = TopicRegistry::new();
        let writer = registry.get_or_create_latest::<VehicleState>("/controller/process_values");
        let reader = registry.get_or_create_latest::<VehicleState>("/controller/process_values");

        writer.store(VehicleState {
            stamp: 3.0,
            ..Default::default()
        });
        assert_eq!(reader.load().unwrap().stamp, 3.0);
    }

    #[test]
    fn test_streams_and_cells_do_not_collide() {
        let registry = TopicRegistry::new();
        let cell = registry.get_or_create_latest::<f64>("/x");
        cell.store(1.0);

        let tx = Publisher::new(registry.get_or_create::<f64>("/x", 4));
        tx.publish(2.0);
        assert_eq!(registry.get_or_create_latest::<f64>("/x").load(), Some(1.0));
    }

    #[test]
    fn test_type_mismatch_replaces_entry() {
        let registry = TopicRegistry::new();
        registry.get_or_create_latest::<f64>("/x").store(1.0);

        let other = registry.get_or_create_latest::<i32>("/x");
        assert!(other.load().is_none());
        other.store(7);
        assert_eq!(registry.get_or_create_latest::<i32>("/x").load(), Some(7));
    }
}
