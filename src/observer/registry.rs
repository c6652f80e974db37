// Signal maps, handler tables and their eager validation

use crate::database::model::Model;
use crate::observer::error::ConfigError;
use crate::observer::traits::{Hook, ModelObserver};
use crate::types::SignalKind;

/// Built-in handler: loads the prior row and fires `<field>_changed` hooks
pub const PRE_SAVING: &str = "pre_saving";
/// Built-in handler: routes to `on_create` or `on_update`
pub const POST_SAVING: &str = "post_saving";
pub const ON_CREATE: &str = "on_create";
pub const ON_UPDATE: &str = "on_update";
pub const ON_DELETE: &str = "on_delete";

/// Suffix of per-field change hooks
pub const CHANGED_SUFFIX: &str = "_changed";

/// Signals every observer listens to. Not meant to be overridden per observer;
/// extend through [`ModelObserver::signals`] instead.
pub const DEFAULT_SIGNALS: [(&str, &str); 3] = [
    ("pre_save", PRE_SAVING),
    ("post_save", POST_SAVING),
    ("post_delete", ON_DELETE),
];

/// Ordered `signal name -> handler name` mapping.
///
/// Recognized signal names are stored in canonical form, so `before_save`
/// and `pre_save` address the same entry. Unrecognized names are kept as
/// written and rejected at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalMap {
    entries: Vec<(String, String)>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed default map
    pub fn defaults() -> Self {
        DEFAULT_SIGNALS
            .iter()
            .fold(Self::new(), |map, (signal, handler)| map.on(signal, *handler))
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn on(mut self, signal: impl AsRef<str>, handler: impl Into<String>) -> Self {
        self.insert(signal, handler);
        self
    }

    /// Map a signal to a handler. An existing entry keeps its position.
    pub fn insert(&mut self, signal: impl AsRef<str>, handler: impl Into<String>) {
        let signal = normalize(signal.as_ref());
        let handler = handler.into();
        match self.entries.iter_mut().find(|(key, _)| *key == signal) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((signal, handler)),
        }
    }

    /// Overlay `other` on top of this map; `other` wins on collisions
    pub fn merge(mut self, other: &SignalMap) -> Self {
        for (signal, handler) in &other.entries {
            self.insert(signal, handler.clone());
        }
        self
    }

    pub fn get(&self, signal: &str) -> Option<&str> {
        let signal = normalize(signal);
        self.entries
            .iter()
            .find(|(key, _)| *key == signal)
            .map(|(_, handler)| handler.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, h)| (s.as_str(), h.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(signal: &str) -> String {
    SignalKind::parse(signal)
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_else(|| signal.to_string())
}

/// Custom hooks an observer exposes by name
pub struct HandlerTable<O, M> {
    hooks: Vec<(&'static str, Hook<O, M>)>,
}

impl<O, M> HandlerTable<O, M> {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook; a later hook with the same name replaces the earlier one
    pub fn with(mut self, name: &'static str, hook: Hook<O, M>) -> Self {
        match self.hooks.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = hook,
            None => self.hooks.push((name, hook)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Hook<O, M>> {
        self.hooks
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, hook)| *hook)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.hooks.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<O, M> Default for HandlerTable<O, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// A handler name resolved against the built-ins and the observer's table
pub(crate) enum HandlerRef<O, M> {
    PreSaving,
    PostSaving,
    OnCreate,
    OnUpdate,
    OnDelete,
    Custom(Hook<O, M>),
}

impl<O, M> HandlerRef<O, M> {
    fn resolve(name: &str, table: &HandlerTable<O, M>) -> Option<Self> {
        let handler = match name {
            PRE_SAVING => HandlerRef::PreSaving,
            POST_SAVING => HandlerRef::PostSaving,
            ON_CREATE => HandlerRef::OnCreate,
            ON_UPDATE => HandlerRef::OnUpdate,
            ON_DELETE => HandlerRef::OnDelete,
            _ => HandlerRef::Custom(table.get(name)?),
        };
        Some(handler)
    }
}

/// One validated `signal -> handler` entry
pub(crate) struct Binding<O, M> {
    pub signal: SignalKind,
    pub handler_name: String,
    pub handler: HandlerRef<O, M>,
}

/// Change hook for one concrete field
pub(crate) struct ChangeHook<O, M> {
    pub field: &'static str,
    pub hook_name: String,
    pub hook: Hook<O, M>,
}

/// Everything registration needs, validated up front
pub(crate) struct ResolvedObserver<O, M> {
    pub bindings: Vec<Binding<O, M>>,
    pub change_hooks: Vec<ChangeHook<O, M>>,
}

/// Merge the observer's signal map over the defaults and validate every entry.
///
/// Nothing is connected here; an error means the whole observer is rejected.
pub(crate) fn resolve<O, M>(observer: &O) -> Result<ResolvedObserver<O, M>, ConfigError>
where
    O: ModelObserver<M>,
    M: Model,
{
    let table = observer.handlers();
    let merged = SignalMap::defaults().merge(&observer.signals());

    let mut bindings = Vec::with_capacity(merged.len());
    for (signal_name, handler_name) in merged.iter() {
        let handler = HandlerRef::resolve(handler_name, &table)
            .ok_or_else(|| ConfigError::unknown_handler(observer.name(), handler_name))?;
        let signal = SignalKind::parse(signal_name)
            .ok_or_else(|| ConfigError::unknown_signal(signal_name))?;

        bindings.push(Binding {
            signal,
            handler_name: handler_name.to_string(),
            handler,
        });
    }

    let change_hooks = M::meta()
        .concrete_fields()
        .filter_map(|field| {
            let hook_name = format!("{}{}", field.name, CHANGED_SUFFIX);
            table.get(&hook_name).map(|hook| ChangeHook {
                field: field.name,
                hook_name,
                hook,
            })
        })
        .collect();

    Ok(ResolvedObserver { bindings, change_hooks })
}
