pub mod error;
pub mod manager;
pub mod model;
pub mod postgres;
pub mod repository;

pub use error::StoreError;
pub use manager::{ModelManager, SaveOptions};
pub use model::{field_values, FieldDescriptor, FieldKind, Model, ModelMeta};
pub use postgres::PgStore;
pub use repository::{InMemoryStore, ModelStore};
