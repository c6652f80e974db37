use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::database::error::StoreError;
use crate::database::model::Model;
use crate::database::repository::ModelStore;
use crate::observer::context::{Event, EventDetail};
use crate::observer::error::{ConfigError, ObserverError};
use crate::observer::pipeline::{register_observer, ObserverHandle};
use crate::observer::traits::ModelObserver;
use crate::signals::SignalBus;
use crate::types::{M2mAction, SignalKind};

/// Options for a single save
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// The instance is being loaded as-is (fixtures), not edited
    pub raw: bool,
    /// Restrict the save to these fields
    pub update_fields: Option<Vec<String>>,
}

/// Entry point for writing models: wraps a store and sends lifecycle
/// signals around every write.
pub struct ModelManager<M: Model> {
    store: Arc<dyn ModelStore<M>>,
    bus: SignalBus,
}

impl<M: Model> Clone for ModelManager<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
        }
    }
}

impl<M: Model> ModelManager<M> {
    pub fn new(store: Arc<dyn ModelStore<M>>, bus: SignalBus) -> Self {
        Self { store, bus }
    }

    /// Manager sending on the process-wide bus
    pub fn with_global_bus(store: Arc<dyn ModelStore<M>>) -> Self {
        Self::new(store, SignalBus::global().clone())
    }

    pub fn store(&self) -> &Arc<dyn ModelStore<M>> {
        &self.store
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Register an observer against this manager's store and bus
    pub async fn observe<O>(&self, observer: Arc<O>) -> Result<ObserverHandle<M>, ConfigError>
    where
        O: ModelObserver<M>,
    {
        register_observer(observer, Arc::clone(&self.store), &self.bus).await
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Option<M>, StoreError> {
        self.store.get(id).await
    }

    /// Build an instance from keyword arguments, sending `pre_init` and `post_init`.
    /// `pre_init` receivers may rewrite the arguments before deserialization.
    pub async fn init(&self, kwargs: Map<String, Value>) -> Result<M, ObserverError>
    where
        M: DeserializeOwned,
    {
        let mut event = Event::<M>::new(SignalKind::PreInit, None, EventDetail::Init { kwargs });
        self.bus.send(&mut event).await?;

        let EventDetail::Init { kwargs } = event.detail else {
            return Err(ObserverError::DetailReplaced { signal: SignalKind::PreInit });
        };
        let instance: M = serde_json::from_value(Value::Object(kwargs.clone()))?;

        let mut event = Event::new(SignalKind::PostInit, Some(instance), EventDetail::Init { kwargs });
        self.bus.send(&mut event).await?;
        take_instance(event)
    }

    pub async fn save(&self, instance: M) -> Result<M, ObserverError> {
        self.save_with(instance, SaveOptions::default()).await
    }

    /// Save an instance: `pre_save`, then insert or update, then `post_save`.
    ///
    /// An instance with a key whose row no longer exists is inserted again
    /// and reported as created. With `update_fields` only the named non-key
    /// concrete fields are written, the row must already exist, and an empty
    /// list skips the save and its signals entirely.
    pub async fn save_with(&self, instance: M, options: SaveOptions) -> Result<M, ObserverError> {
        let SaveOptions { raw, update_fields } = options;

        if let Some(fields) = &update_fields {
            if fields.is_empty() {
                tracing::debug!("Skipped save of {}: empty update_fields", M::meta().name);
                return Ok(instance);
            }
            check_update_fields::<M>(fields)?;
        }

        let mut event = Event::pre_save(instance, raw, update_fields.clone());
        self.bus.send(&mut event).await?;
        let mut instance = take_instance(event)?;

        let updated = match instance.pk() {
            Some(_) => self.store.update(&instance, update_fields.as_deref()).await?,
            None => false,
        };
        if !updated && update_fields.is_some() {
            return Err(StoreError::NotFound(format!(
                "save of {} {:?} with update_fields matched no row",
                M::meta().name,
                instance.pk()
            ))
            .into());
        }
        let created = !updated;
        if created {
            self.store.insert(&mut instance).await?;
        }

        tracing::debug!(
            "Saved {} {:?} ({})",
            M::meta().name,
            instance.pk(),
            if created { "created" } else { "updated" }
        );

        let mut event = Event::post_save(instance, created, raw, update_fields);
        self.bus.send(&mut event).await?;
        take_instance(event)
    }

    /// Delete a persisted instance: `pre_delete`, delete, `post_delete`
    pub async fn delete(&self, instance: M) -> Result<M, ObserverError> {
        let id = instance
            .pk()
            .ok_or_else(|| StoreError::MissingKey(format!("delete of {} requires a key", M::meta().name)))?;

        let mut event = Event::pre_delete(instance);
        self.bus.send(&mut event).await?;
        let instance = take_instance(event)?;

        if !self.store.delete(id).await? {
            tracing::debug!("{} {} was already gone", M::meta().name, id);
        }

        let mut event = Event::post_delete(instance);
        self.bus.send(&mut event).await?;
        take_instance(event)
    }

    /// Announce a change to one of the instance's many-to-many relations
    pub async fn m2m_changed(
        &self,
        instance: M,
        action: M2mAction,
        reverse: bool,
        related: &'static str,
        pk_set: Vec<Value>,
    ) -> Result<M, ObserverError> {
        let detail = EventDetail::M2mChanged { action, reverse, related, pk_set };
        let mut event = Event::new(SignalKind::M2mChanged, Some(instance), detail);
        self.bus.send(&mut event).await?;
        take_instance(event)
    }

    pub async fn pre_migrate(&self, app_label: &str, plan: Vec<String>) -> Result<(), ObserverError> {
        self.send_migrate(SignalKind::PreMigrate, app_label, plan).await
    }

    pub async fn post_migrate(&self, app_label: &str, plan: Vec<String>) -> Result<(), ObserverError> {
        self.send_migrate(SignalKind::PostMigrate, app_label, plan).await
    }

    async fn send_migrate(&self, signal: SignalKind, app_label: &str, plan: Vec<String>) -> Result<(), ObserverError> {
        let detail = EventDetail::Migrate {
            app_label: app_label.to_string(),
            plan,
        };
        let mut event = Event::<M>::new(signal, None, detail);
        self.bus.send(&mut event).await
    }
}

/// Every name must be a non-key concrete field of `M`
fn check_update_fields<M: Model>(fields: &[String]) -> Result<(), StoreError> {
    let meta = M::meta();
    match fields
        .iter()
        .find(|field| field.as_str() == "id" || !meta.has_concrete_field(field))
    {
        Some(unknown) => Err(StoreError::unknown_field(meta.name, unknown)),
        None => Ok(()),
    }
}

fn take_instance<M>(event: Event<M>) -> Result<M, ObserverError> {
    let signal = event.signal;
    event
        .into_instance()
        .ok_or(ObserverError::MissingInstance { signal })
}
