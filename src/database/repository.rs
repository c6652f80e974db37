use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::StoreError;
use crate::database::model::{field_values, Model};

/// Persistence operations the observer layer relies on
#[async_trait]
pub trait ModelStore<M: Model>: Send + Sync {
    /// Point lookup by identity key; `None` when the row does not exist
    async fn get(&self, id: Uuid) -> Result<Option<M>, StoreError>;

    /// Insert a new row, assigning a key when the instance has none
    async fn insert(&self, instance: &mut M) -> Result<(), StoreError>;

    /// Update an existing row; returns false when no row matched.
    /// With `update_fields`, only those concrete fields are written.
    async fn update(&self, instance: &M, update_fields: Option<&[String]>) -> Result<bool, StoreError>;

    /// Delete by key; returns false when no row matched
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }
}

/// Store backed by a map, for tests and embedded use
pub struct InMemoryStore<M> {
    rows: RwLock<HashMap<Uuid, M>>,
}

impl<M: Model> InMemoryStore<M> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<M> {
        self.rows.read().await.values().cloned().collect()
    }

    /// Drop a row behind the manager's back, as a concurrent writer would
    pub async fn remove_silently(&self, id: Uuid) -> bool {
        self.rows.write().await.remove(&id).is_some()
    }
}

impl<M: Model> Default for InMemoryStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows are stored without transient prior state
fn detached<M: Model>(instance: &M) -> M {
    let mut row = instance.clone();
    row.prior_state_mut().clear();
    row
}

/// Copy only `fields` from `instance` onto the stored row
fn merge_fields<M>(stored: &M, instance: &M, fields: &[String]) -> Result<M, StoreError>
where
    M: Model + DeserializeOwned,
{
    let mut merged = field_values(stored)?;
    let values = field_values(instance)?;

    for field in fields {
        let value = match values.get(field.as_str()) {
            Some(value) if M::meta().has_concrete_field(field) => value.clone(),
            _ => return Err(StoreError::unknown_field(M::meta().name, field)),
        };
        merged.insert(field.clone(), value);
    }

    Ok(serde_json::from_value(Value::Object(merged))?)
}

#[async_trait]
impl<M> ModelStore<M> for InMemoryStore<M>
where
    M: Model + DeserializeOwned,
{
    async fn get(&self, id: Uuid) -> Result<Option<M>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn insert(&self, instance: &mut M) -> Result<(), StoreError> {
        let id = match instance.pk() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                instance.set_pk(id);
                id
            }
        };

        self.rows.write().await.insert(id, detached(instance));
        tracing::trace!("Inserted {} {}", M::meta().name, id);
        Ok(())
    }

    async fn update(&self, instance: &M, update_fields: Option<&[String]>) -> Result<bool, StoreError> {
        let id = instance
            .pk()
            .ok_or_else(|| StoreError::MissingKey(format!("update of {} requires a key", M::meta().name)))?;

        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(false);
        };

        *row = match update_fields {
            Some(fields) => merge_fields(&*row, instance, fields)?,
            None => detached(instance),
        };
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::model::{FieldDescriptor, ModelMeta};
    use crate::observer::prior_state::PriorState;
    use serde::{Deserialize, Serialize};

    static FIELDS: [FieldDescriptor; 3] = [
        FieldDescriptor::concrete("id"),
        FieldDescriptor::concrete("name"),
        FieldDescriptor::concrete("level"),
    ];
    static META: ModelMeta = ModelMeta::new("Gauge", "gauges", &FIELDS);

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Gauge {
        id: Option<Uuid>,
        name: String,
        level: i64,
        #[serde(skip)]
        prior: PriorState<Gauge>,
    }

    impl Model for Gauge {
        fn meta() -> &'static ModelMeta { &META }
        fn pk(&self) -> Option<Uuid> { self.id }
        fn set_pk(&mut self, id: Uuid) { self.id = Some(id); }
        fn prior_state(&self) -> &PriorState<Self> { &self.prior }
        fn prior_state_mut(&mut self) -> &mut PriorState<Self> { &mut self.prior }
    }

    fn gauge(name: &str, level: i64) -> Gauge {
        Gauge { id: None, name: name.to_string(), level, prior: PriorState::new() }
    }

    #[tokio::test]
    async fn update_fields_limits_the_write() {
        let store = InMemoryStore::<Gauge>::new();
        let mut row = gauge("boiler", 1);
        store.insert(&mut row).await.unwrap();

        row.name = "furnace".to_string();
        row.level = 7;
        let fields = vec!["level".to_string()];
        assert!(store.update(&row, Some(fields.as_slice())).await.unwrap());

        let stored = store.get(row.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.name, "boiler");
        assert_eq!(stored.level, 7);
    }

    #[tokio::test]
    async fn update_fields_rejects_unknown_names() {
        let store = InMemoryStore::<Gauge>::new();
        let mut row = gauge("boiler", 1);
        store.insert(&mut row).await.unwrap();

        let fields = vec!["pressure".to_string()];
        let result = store.update(&row, Some(fields.as_slice())).await;
        assert!(matches!(result, Err(StoreError::UnknownField { .. })));
    }

    #[tokio::test]
    async fn update_of_missing_row_reports_false() {
        let store = InMemoryStore::<Gauge>::new();
        let mut row = gauge("boiler", 1);
        store.insert(&mut row).await.unwrap();
        assert!(store.remove_silently(row.id.unwrap()).await);

        assert!(!store.update(&row, None).await.unwrap());
        assert!(store.is_empty().await);
    }
}
