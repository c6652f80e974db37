use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::database::model::Model;
use crate::observer::context::Event;
use crate::observer::error::ObserverError;
use crate::types::SignalKind;

/// Something that can be connected to a signal
#[async_trait]
pub trait Receiver<M: Model>: Send + Sync {
    /// Receiver name for logging and debugging
    fn name(&self) -> &str;

    async fn receive(&self, event: &mut Event<M>) -> Result<(), ObserverError>;
}

/// How the bus holds on to a connected receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// The bus keeps the receiver alive
    Strong,
    /// The receiver is dropped from the bus once its last `Arc` goes away
    Weak,
}

enum ReceiverRef<M: Model> {
    Strong(Arc<dyn Receiver<M>>),
    Weak(Weak<dyn Receiver<M>>),
}

impl<M: Model> ReceiverRef<M> {
    fn upgrade(&self) -> Option<Arc<dyn Receiver<M>>> {
        match self {
            ReceiverRef::Strong(receiver) => Some(Arc::clone(receiver)),
            ReceiverRef::Weak(receiver) => receiver.upgrade(),
        }
    }

    fn points_to(&self, other: &Weak<dyn Receiver<M>>) -> bool {
        match self {
            ReceiverRef::Strong(receiver) => Arc::downgrade(receiver).ptr_eq(other),
            ReceiverRef::Weak(receiver) => receiver.ptr_eq(other),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            ReceiverRef::Strong(_) => true,
            ReceiverRef::Weak(receiver) => receiver.strong_count() > 0,
        }
    }
}

struct ReceiverEntry<M: Model> {
    dispatch_uid: Option<String>,
    receiver: ReceiverRef<M>,
}

/// Receivers for one (signal, model type) pair, in connection order
struct Channel<M: Model> {
    entries: Vec<ReceiverEntry<M>>,
}

impl<M: Model> Channel<M> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }
}

type ChannelKey = (SignalKind, TypeId);

static GLOBAL: Lazy<SignalBus> = Lazy::new(SignalBus::new);

/// Registry of lifecycle receivers, keyed by signal and sender model type.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct SignalBus {
    channels: Arc<RwLock<HashMap<ChannelKey, Box<dyn Any + Send + Sync>>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide bus
    pub fn global() -> &'static SignalBus {
        &GLOBAL
    }

    /// Connect a receiver for signals sent by model `M`.
    ///
    /// A receiver already connected under the same `dispatch_uid` is replaced
    /// in place, so connecting twice never produces a duplicate.
    pub async fn connect<M: Model>(
        &self,
        signal: SignalKind,
        receiver: Arc<dyn Receiver<M>>,
        dispatch_uid: Option<String>,
        reference: Reference,
    ) {
        let name = receiver.name().to_string();
        let receiver = match reference {
            Reference::Strong => ReceiverRef::Strong(receiver),
            Reference::Weak => ReceiverRef::Weak(Arc::downgrade(&receiver)),
        };

        let mut channels = self.channels.write().await;
        let slot = channels
            .entry((signal, TypeId::of::<M>()))
            .or_insert_with(|| Box::new(Channel::<M>::new()));
        let channel = match slot.downcast_mut::<Channel<M>>() {
            Some(channel) => channel,
            None => unreachable!("channels are keyed by model TypeId"),
        };

        let existing = dispatch_uid.as_ref().and_then(|uid| {
            channel
                .entries
                .iter()
                .position(|entry| entry.dispatch_uid.as_ref() == Some(uid))
        });

        let entry = ReceiverEntry { dispatch_uid, receiver };
        match existing {
            Some(index) => {
                tracing::debug!("Replaced receiver '{}' on {} for {}", name, signal, M::meta().name);
                channel.entries[index] = entry;
            }
            None => {
                tracing::debug!("Connected receiver '{}' to {} for {}", name, signal, M::meta().name);
                channel.entries.push(entry);
            }
        }
    }

    /// Disconnect the receiver registered under `dispatch_uid`. Returns whether one was removed.
    pub async fn disconnect<M: Model>(&self, signal: SignalKind, dispatch_uid: &str) -> bool {
        self.disconnect_where::<M>(signal, dispatch_uid, |_| true).await
    }

    /// Disconnect `dispatch_uid` only while it still refers to `receiver`.
    /// A receiver that has since replaced it under the same uid stays connected.
    pub async fn disconnect_receiver<M: Model>(
        &self,
        signal: SignalKind,
        dispatch_uid: &str,
        receiver: &Weak<dyn Receiver<M>>,
    ) -> bool {
        self.disconnect_where::<M>(signal, dispatch_uid, |entry| entry.points_to(receiver))
            .await
    }

    async fn disconnect_where<M: Model>(
        &self,
        signal: SignalKind,
        dispatch_uid: &str,
        predicate: impl Fn(&ReceiverRef<M>) -> bool,
    ) -> bool {
        let mut channels = self.channels.write().await;
        let Some(channel) = channels
            .get_mut(&(signal, TypeId::of::<M>()))
            .and_then(|slot| slot.downcast_mut::<Channel<M>>())
        else {
            return false;
        };

        let before = channel.entries.len();
        channel.entries.retain(|entry| {
            entry.dispatch_uid.as_deref() != Some(dispatch_uid) || !predicate(&entry.receiver)
        });
        let removed = channel.entries.len() != before;

        if removed {
            tracing::debug!("Disconnected '{}' from {} for {}", dispatch_uid, signal, M::meta().name);
        }
        removed
    }

    /// Number of live receivers for a signal sent by `M`
    pub async fn receiver_count<M: Model>(&self, signal: SignalKind) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(&(signal, TypeId::of::<M>()))
            .and_then(|slot| slot.downcast_ref::<Channel<M>>())
            .map(|channel| channel.entries.iter().filter(|e| e.receiver.is_alive()).count())
            .unwrap_or(0)
    }

    pub async fn has_listeners<M: Model>(&self, signal: SignalKind) -> bool {
        self.receiver_count::<M>(signal).await > 0
    }

    /// Dispatch an event to every receiver in connection order.
    ///
    /// The first receiver error stops dispatch and is returned to the caller.
    pub async fn send<M: Model>(&self, event: &mut Event<M>) -> Result<(), ObserverError> {
        let receivers = self.live_receivers::<M>(event.signal).await;
        if receivers.is_empty() {
            tracing::trace!("No receivers for {} from {}", event.signal, event.sender);
            return Ok(());
        }

        tracing::debug!(
            "Sending {} from {} to {} receivers",
            event.signal,
            event.sender,
            receivers.len()
        );

        for receiver in receivers {
            if let Err(error) = receiver.receive(event).await {
                tracing::warn!(
                    "Receiver '{}' failed on {} from {}: {}",
                    receiver.name(),
                    event.signal,
                    event.sender,
                    error
                );
                return Err(error);
            }
        }

        Ok(())
    }

    /// Dispatch to every receiver even if some fail, collecting each outcome
    pub async fn send_robust<M: Model>(
        &self,
        event: &mut Event<M>,
    ) -> Vec<(String, Result<(), ObserverError>)> {
        let receivers = self.live_receivers::<M>(event.signal).await;
        let mut outcomes = Vec::with_capacity(receivers.len());

        for receiver in receivers {
            let result = receiver.receive(event).await;
            if let Err(error) = &result {
                tracing::warn!("Receiver '{}' failed on {}: {}", receiver.name(), event.signal, error);
            }
            outcomes.push((receiver.name().to_string(), result));
        }

        outcomes
    }

    /// Snapshot the live receivers so no lock is held while they run
    async fn live_receivers<M: Model>(&self, signal: SignalKind) -> Vec<Arc<dyn Receiver<M>>> {
        let key = (signal, TypeId::of::<M>());
        let (receivers, has_dead) = {
            let channels = self.channels.read().await;
            match channels.get(&key).and_then(|slot| slot.downcast_ref::<Channel<M>>()) {
                Some(channel) => {
                    let receivers: Vec<_> = channel
                        .entries
                        .iter()
                        .filter_map(|entry| entry.receiver.upgrade())
                        .collect();
                    let has_dead = receivers.len() != channel.entries.len();
                    (receivers, has_dead)
                }
                None => (Vec::new(), false),
            }
        };

        if has_dead {
            let mut channels = self.channels.write().await;
            if let Some(channel) = channels
                .get_mut(&key)
                .and_then(|slot| slot.downcast_mut::<Channel<M>>())
            {
                channel.entries.retain(|entry| entry.receiver.is_alive());
                tracing::debug!("Pruned dead weak receivers on {} for {}", signal, M::meta().name);
            }
        }

        receivers
    }
}
