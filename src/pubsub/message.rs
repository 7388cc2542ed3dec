/// Anything that can travel on the bus: helm commands, vehicle state and
/// scalar behavior inputs.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}
