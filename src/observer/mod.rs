// Observer system: declarative lifecycle hooks for models

pub mod context;
pub mod error;
pub mod pipeline;
pub mod prior_state;
pub mod registry;
pub mod traits;

// Re-export core types
pub use context::{Event, EventDetail};
pub use error::{ConfigError, ObserverError};
pub use pipeline::{dispatch_uid, register_observer, ObserverHandle};
pub use prior_state::{changed_fields, FieldChange, PriorState};
pub use registry::{
    HandlerTable, SignalMap, CHANGED_SUFFIX, DEFAULT_SIGNALS, ON_CREATE, ON_DELETE, ON_UPDATE,
    POST_SAVING, PRE_SAVING,
};
pub use traits::{Hook, HookFuture, ModelObserver};
