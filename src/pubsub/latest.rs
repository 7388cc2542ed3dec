use std::sync::{PoisonError, RwLock};

use super::message::Message;

/// Single-slot cell holding only the most recent value.
///
/// Writers replace the whole value under the lock, so a reader never sees
/// a partially written one. Nothing is queued.
pub struct Latest<T: Message> {
    slot: RwLock<Option<T>>,
}

impl<T: Message> Latest<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn store(&self, value: T) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Copy of the latest value, `None` until the first store.
    pub fn load(&self) -> Option<T> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T: Message> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::{Vector3, VehicleState};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_until_first_store() {
        let cell: Latest<VehicleState> = Latest::new();
        assert!(cell.load().is_none());

        let state = VehicleState {
            position: Vector3::new(0.0, 0.0, 4.0),
            ..Default::default()
        };
        cell.store(state.clone());
        assert_eq!(cell.load(), Some(state));
    }

    #[test]
    fn test_store_replaces() {
        let cell: Latest<f64> = Latest::new();
        cell.store(1.0);
        cell.store(2.0);
        assert_eq!(cell.load(), Some(2.0));
    }

    #[test]
    fn test_reader_never_sees_torn_state() {
        let cell = Arc::new(Latest::<VehicleState>::new());
        let writer_cell = Arc::clone(&cell);

        let writer = thread::spawn(move || {
            for i in 0..2000 {
                let v = i as f64;
                writer_cell.store(VehicleState {
                    position: Vector3::new(v, v, v),
                    velocity: Vector3::new(v, v, v),
                    ..Default::default()
                });
            }
        });

        for _ in 0..2000 {
            if let Some(state) = cell.load() {
                assert_eq!(state.position.x, state.velocity.z);
                assert_eq!(state.position.y, state.position.z);
            }
        }
        writer.join().unwrap();
        assert_eq!(cell.load().unwrap().position.x, 1999.0);
    }
}
