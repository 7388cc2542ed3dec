//! In-process bus between the helm, its behaviors and the serial link.
//!
//! Two kinds of channel:
//! - set point streams (`Topic`), bounded queues drained by one consumer;
//! - latest-value cells (`Latest`), where only the newest sample matters.

pub mod latest;
pub mod message;
pub mod registry;
pub mod topic;

pub use latest::Latest;
pub use message::Message;
pub use registry::TopicRegistry;
pub use topic::{Publisher, Subscriber, Topic};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::{ControlCommand, Dof};
    use std::thread;

    #[test]
    fn test_set_points_cross_threads_in_order() {
        let registry = TopicRegistry::new();
        let tx = Publisher::new(registry.get_or_create::<ControlCommand>("/controller/set_point", 2048));
        let rx = Subscriber::new(registry.get_or_create::<ControlCommand>("/controller/set_point", 2048));

        let producer = thread::spawn(move || {
            for i in 0..1000 {
                let mut cmd = ControlCommand::default();
                cmd.set(Dof::Surge, i as f64);
                tx.publish(cmd);
            }
        });
        producer.join().unwrap();

        let received: Vec<f64> = std::iter::from_fn(|| rx.try_recv()).map(|c| c.get(Dof::Surge)).collect();
        assert_eq!(received.len(), 1000);
        assert!(received.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(rx.missed(), 0);
    }
}
