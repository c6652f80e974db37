//! Translation hook for user-facing error messages.
//!
//! Messages pass through unchanged until an application installs a
//! translator with [`set_translator`]. Only the first installation wins.

use std::sync::OnceLock;

type Translator = Box<dyn Fn(&str) -> String + Send + Sync>;

static TRANSLATOR: OnceLock<Translator> = OnceLock::new();

/// Install the process-wide translator. Returns false if one was already set.
pub fn set_translator<F>(translator: F) -> bool
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    TRANSLATOR.set(Box::new(translator)).is_ok()
}

/// Translate a message, or return it as-is when no translator is installed
pub fn gettext(message: &str) -> String {
    match TRANSLATOR.get() {
        Some(translate) => translate(message),
        None => message.to_string(),
    }
}
