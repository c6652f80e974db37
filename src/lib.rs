pub mod config;
pub mod database;
pub mod i18n;
pub mod logging;
pub mod observer;
pub mod signals;
pub mod types;

pub use database::{InMemoryStore, Model, ModelManager, ModelMeta, ModelStore, FieldDescriptor};
pub use observer::{Event, HandlerTable, HookFuture, ModelObserver, ObserverError, PriorState, SignalMap};
pub use signals::SignalBus;
pub use types::SignalKind;
