use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::database::model::Model;
use crate::observer::context::Event;
use crate::observer::error::ObserverError;
use crate::observer::registry::{HandlerTable, SignalMap};

/// Future returned by custom hooks
pub type HookFuture<'a> = BoxFuture<'a, Result<(), ObserverError>>;

/// A named custom hook: a method taking the observer and the in-flight event.
///
/// ```ignore
/// fn status_changed<'a>(&'a self, event: &'a mut Event<Article>) -> HookFuture<'a> {
///     Box::pin(async move { Ok(()) })
/// }
/// ```
pub type Hook<O, M> = for<'a> fn(&'a O, &'a mut Event<M>) -> HookFuture<'a>;

/// Declarative lifecycle observer for model `M`.
///
/// The observer always listens to `pre_save`, `post_save` and `post_delete`
/// (see [`DEFAULT_SIGNALS`](crate::observer::registry::DEFAULT_SIGNALS)).
/// [`signals`](Self::signals) adds or overrides entries, mapping a signal
/// name to a handler name from [`handlers`](Self::handlers) or one of the
/// built-ins. A handler named `<field>_changed` fires whenever that concrete
/// field differs from the persisted row on save.
#[async_trait]
pub trait ModelObserver<M: Model>: Send + Sync + Sized + 'static {
    /// Observer name used in dispatch uids and error messages
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Extension signal map, overlaid on the defaults
    fn signals(&self) -> SignalMap {
        SignalMap::new()
    }

    /// Custom hooks addressable by name
    fn handlers(&self) -> HandlerTable<Self, M> {
        HandlerTable::new()
    }

    async fn on_create(&self, _event: &mut Event<M>) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_update(&self, _event: &mut Event<M>) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_delete(&self, _event: &mut Event<M>) -> Result<(), ObserverError> {
        Ok(())
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
