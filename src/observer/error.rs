use thiserror::Error;

use crate::database::error::StoreError;
use crate::i18n::gettext;
use crate::types::SignalKind;

/// Configuration errors raised while registering an observer.
/// Never raised during steady-state dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{}", unknown_handler_message(.observer, .method))]
    UnknownHandler { observer: String, method: String },

    #[error("{}", unknown_signal_message(.signal, .available))]
    UnknownSignal { signal: String, available: String },
}

impl ConfigError {
    pub fn unknown_handler(observer: &str, method: &str) -> Self {
        ConfigError::UnknownHandler {
            observer: observer.to_string(),
            method: method.to_string(),
        }
    }

    pub fn unknown_signal(signal: &str) -> Self {
        ConfigError::UnknownSignal {
            signal: signal.to_string(),
            available: SignalKind::available(),
        }
    }
}

fn unknown_handler_message(observer: &str, method: &str) -> String {
    gettext(&format!("'{}' model has no method '{}'", observer, method))
}

fn unknown_signal_message(signal: &str, available: &str) -> String {
    gettext(&format!(
        "Signals don't have signal of type '{}'. Available signal types: {}",
        signal, available
    ))
}

/// Observer system errors with structured error types
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Signal {signal} was sent without a model instance")]
    MissingInstance { signal: SignalKind },

    #[error("A receiver replaced the {signal} payload")]
    DetailReplaced { signal: SignalKind },

    #[error("Hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ObserverError {
    /// Convenience for hooks rejecting a change
    pub fn hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        ObserverError::Hook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ObserverError {
    fn from(error: serde_json::Error) -> Self {
        ObserverError::Store(StoreError::Serde(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handler_names_observer_and_method() {
        let error = ConfigError::unknown_handler("ArticleObserver", "publish");
        assert_eq!(error.to_string(), "'ArticleObserver' model has no method 'publish'");
    }

    #[test]
    fn unknown_signal_lists_valid_names() {
        let error = ConfigError::unknown_signal("on_refresh");
        let message = error.to_string();
        assert!(message.starts_with("Signals don't have signal of type 'on_refresh'."));
        assert!(message.contains("pre_save, post_save"));
        assert!(message.contains("m2m_changed"));
    }
}
