// Observer registration and the built-in save handlers

use async_trait::async_trait;
use std::sync::{Arc, Weak};

use crate::config::config;
use crate::database::model::Model;
use crate::database::repository::ModelStore;
use crate::observer::context::Event;
use crate::observer::error::{ConfigError, ObserverError};
use crate::observer::prior_state::changed_fields;
use crate::observer::registry::{resolve, ChangeHook, HandlerRef};
use crate::observer::traits::ModelObserver;
use crate::signals::{Receiver, Reference, SignalBus};
use crate::types::SignalKind;

/// State shared by every receiver of one registered observer
struct ObserverCore<O, M: Model> {
    observer: Arc<O>,
    store: Arc<dyn ModelStore<M>>,
    change_hooks: Vec<ChangeHook<O, M>>,
}

impl<O, M> ObserverCore<O, M>
where
    O: ModelObserver<M>,
    M: Model,
{
    /// Load the persisted row, attach it as prior state and fire change hooks
    async fn pre_saving(&self, event: &mut Event<M>) -> Result<(), ObserverError> {
        let changes = {
            let instance = event.instance_mut()?;

            let Some(id) = instance.pk() else {
                tracing::trace!("{}: new {} has no key, skipping change detection", self.observer.name(), event_sender::<M>());
                return Ok(());
            };

            let previous = match self.store.get(id).await? {
                Some(previous) => previous,
                None => {
                    tracing::debug!("{} {} not found in store, using instance as prior state", event_sender::<M>(), id);
                    let mut own = instance.clone();
                    own.prior_state_mut().clear();
                    own
                }
            };

            let previous = Arc::new(previous);
            instance.prior_state_mut().attach(Arc::clone(&previous));

            changed_fields(&*instance, &*previous)?
        };

        if changes.is_empty() {
            return Ok(());
        }

        if config().logging.log_changes {
            let fields: Vec<_> = changes.iter().map(|change| change.field).collect();
            tracing::info!("{} changed fields on {}: {:?}", self.observer.name(), event_sender::<M>(), fields);
        }

        for change in &changes {
            let Some(change_hook) = self.change_hooks.iter().find(|hook| hook.field == change.field) else {
                continue;
            };

            tracing::debug!("{}: invoking {}", self.observer.name(), change_hook.hook_name);
            (change_hook.hook)(self.observer.as_ref(), event).await?;
        }

        Ok(())
    }

    /// Route to `on_create` or `on_update`
    async fn post_saving(&self, event: &mut Event<M>) -> Result<(), ObserverError> {
        if event.created() {
            self.observer.on_create(event).await
        } else {
            self.observer.on_update(event).await
        }
    }
}

fn event_sender<M: Model>() -> &'static str {
    M::meta().name
}

/// One (signal, handler) pair of a registered observer, as seen by the bus
struct BoundReceiver<O, M: Model> {
    name: String,
    core: Arc<ObserverCore<O, M>>,
    handler: HandlerRef<O, M>,
}

#[async_trait]
impl<O, M> Receiver<M> for BoundReceiver<O, M>
where
    O: ModelObserver<M>,
    M: Model,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, event: &mut Event<M>) -> Result<(), ObserverError> {
        if config().logging.log_dispatch {
            tracing::debug!("Dispatching {} to {}", event.signal, self.name);
        }

        let core = &self.core;
        match &self.handler {
            HandlerRef::PreSaving => core.pre_saving(event).await,
            HandlerRef::PostSaving => core.post_saving(event).await,
            HandlerRef::OnCreate => core.observer.on_create(event).await,
            HandlerRef::OnUpdate => core.observer.on_update(event).await,
            HandlerRef::OnDelete => core.observer.on_delete(event).await,
            HandlerRef::Custom(hook) => (*hook)(core.observer.as_ref(), event).await,
        }
    }
}

/// Dispatch uid for an observer's binding to a signal
pub fn dispatch_uid(observer: &str, signal: SignalKind) -> String {
    format!("{}_{}", observer, signal.as_str())
}

/// Register an observer's handlers with the bus, scoped to model `M`.
///
/// The merged signal map is validated in full before anything is connected,
/// so a configuration error leaves the bus untouched. Receivers are held
/// strongly: dropping the returned handle keeps them connected.
pub async fn register_observer<O, M>(
    observer: Arc<O>,
    store: Arc<dyn ModelStore<M>>,
    bus: &SignalBus,
) -> Result<ObserverHandle<M>, ConfigError>
where
    O: ModelObserver<M>,
    M: Model,
{
    let name = observer.name();
    let resolved = resolve::<O, M>(observer.as_ref())?;

    let core = Arc::new(ObserverCore {
        observer,
        store,
        change_hooks: resolved.change_hooks,
    });

    let mut bindings = Vec::with_capacity(resolved.bindings.len());
    for binding in resolved.bindings {
        let uid = dispatch_uid(name, binding.signal);
        let receiver: Arc<dyn Receiver<M>> = Arc::new(BoundReceiver {
            name: format!("{}.{}", name, binding.handler_name),
            core: Arc::clone(&core),
            handler: binding.handler,
        });

        let weak = Arc::downgrade(&receiver);
        bus.connect::<M>(binding.signal, receiver, Some(uid.clone()), Reference::Strong)
            .await;
        bindings.push(HandleBinding {
            signal: binding.signal,
            uid,
            receiver: weak,
        });
    }

    tracing::info!(
        "Registered observer '{}' for {} on {:?}",
        name,
        M::meta().name,
        bindings.iter().map(|binding| binding.signal.as_str()).collect::<Vec<_>>()
    );

    Ok(ObserverHandle {
        bus: bus.clone(),
        observer: name,
        bindings,
    })
}

struct HandleBinding<M: Model> {
    signal: SignalKind,
    uid: String,
    receiver: Weak<dyn Receiver<M>>,
}

/// Token for a registered observer. Revoking disconnects every binding
/// that still belongs to this registration; receivers connected by a later
/// registration under the same dispatch uid are left in place.
pub struct ObserverHandle<M: Model> {
    bus: SignalBus,
    observer: &'static str,
    bindings: Vec<HandleBinding<M>>,
}

impl<M: Model> ObserverHandle<M> {
    pub fn observer(&self) -> &'static str {
        self.observer
    }

    /// Signals this observer is connected to, in registration order
    pub fn signals(&self) -> Vec<SignalKind> {
        self.bindings.iter().map(|binding| binding.signal).collect()
    }

    pub fn dispatch_uids(&self) -> Vec<&str> {
        self.bindings.iter().map(|binding| binding.uid.as_str()).collect()
    }

    /// Disconnect every binding; returns how many were still connected
    pub async fn revoke(self) -> usize {
        let mut removed = 0;
        for binding in &self.bindings {
            if self
                .bus
                .disconnect_receiver::<M>(binding.signal, &binding.uid, &binding.receiver)
                .await
            {
                removed += 1;
            }
        }

        tracing::info!("Revoked observer '{}' ({} bindings)", self.observer, removed);
        removed
    }
}
