use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::database::model::Model;
use crate::observer::error::ObserverError;
use crate::types::{M2mAction, SignalKind};

/// Signal-specific arguments
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    /// `pre_init` / `post_init`: the keyword arguments the instance was built from
    Init { kwargs: Map<String, Value> },
    /// `pre_save` / `post_save`
    Save {
        created: bool,
        raw: bool,
        update_fields: Option<Vec<String>>,
    },
    /// `pre_delete` / `post_delete`
    Delete,
    /// `m2m_changed`
    M2mChanged {
        action: M2mAction,
        reverse: bool,
        related: &'static str,
        pk_set: Vec<Value>,
    },
    /// `pre_migrate` / `post_migrate`
    Migrate { app_label: String, plan: Vec<String> },
}

/// Payload that flows from the model manager through the signal bus to every receiver
#[derive(Debug, Clone)]
pub struct Event<M> {
    pub signal: SignalKind,
    /// Name of the model type that sent the signal
    pub sender: &'static str,
    pub instance: Option<M>,
    pub detail: EventDetail,
    pub sent_at: DateTime<Utc>,
}

impl<M: Model> Event<M> {
    pub fn new(signal: SignalKind, instance: Option<M>, detail: EventDetail) -> Self {
        Self {
            signal,
            sender: M::meta().name,
            instance,
            detail,
            sent_at: Utc::now(),
        }
    }

    pub fn pre_save(instance: M, raw: bool, update_fields: Option<Vec<String>>) -> Self {
        Self::new(
            SignalKind::PreSave,
            Some(instance),
            EventDetail::Save { created: false, raw, update_fields },
        )
    }

    pub fn post_save(instance: M, created: bool, raw: bool, update_fields: Option<Vec<String>>) -> Self {
        Self::new(
            SignalKind::PostSave,
            Some(instance),
            EventDetail::Save { created, raw, update_fields },
        )
    }

    pub fn pre_delete(instance: M) -> Self {
        Self::new(SignalKind::PreDelete, Some(instance), EventDetail::Delete)
    }

    pub fn post_delete(instance: M) -> Self {
        Self::new(SignalKind::PostDelete, Some(instance), EventDetail::Delete)
    }
}

impl<M> Event<M> {
    /// Whether a save inserted a new row. False for every other signal.
    pub fn created(&self) -> bool {
        matches!(self.detail, EventDetail::Save { created: true, .. })
    }

    pub fn instance(&self) -> Result<&M, ObserverError> {
        self.instance
            .as_ref()
            .ok_or(ObserverError::MissingInstance { signal: self.signal })
    }

    pub fn instance_mut(&mut self) -> Result<&mut M, ObserverError> {
        let signal = self.signal;
        self.instance
            .as_mut()
            .ok_or(ObserverError::MissingInstance { signal })
    }

    /// Take the instance back out once dispatch is over
    pub fn into_instance(self) -> Option<M> {
        self.instance
    }
}
