// Signal bus: receivers keyed by lifecycle signal and sender model type

pub mod bus;

pub use bus::{Receiver, Reference, SignalBus};
