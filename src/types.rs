// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle signals a model observer can listen to.
/// Used by the signal bus, the observer registry and the model manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    PreInit,
    PostInit,
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
    M2mChanged,
    PreMigrate,
    PostMigrate,
}

impl SignalKind {
    /// Every supported signal, in the order they are reported in errors
    pub const ALL: [SignalKind; 9] = [
        SignalKind::PreInit,
        SignalKind::PostInit,
        SignalKind::PreSave,
        SignalKind::PostSave,
        SignalKind::PreDelete,
        SignalKind::PostDelete,
        SignalKind::M2mChanged,
        SignalKind::PreMigrate,
        SignalKind::PostMigrate,
    ];

    /// Canonical snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::PreInit => "pre_init",
            SignalKind::PostInit => "post_init",
            SignalKind::PreSave => "pre_save",
            SignalKind::PostSave => "post_save",
            SignalKind::PreDelete => "pre_delete",
            SignalKind::PostDelete => "post_delete",
            SignalKind::M2mChanged => "m2m_changed",
            SignalKind::PreMigrate => "pre_migrate",
            SignalKind::PostMigrate => "post_migrate",
        }
    }

    /// Parse a signal name, accepting `before_*`/`after_*` aliases
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "pre_init" | "before_init" => SignalKind::PreInit,
            "post_init" | "after_init" => SignalKind::PostInit,
            "pre_save" | "before_save" => SignalKind::PreSave,
            "post_save" | "after_save" => SignalKind::PostSave,
            "pre_delete" | "before_delete" => SignalKind::PreDelete,
            "post_delete" | "after_delete" => SignalKind::PostDelete,
            "m2m_changed" => SignalKind::M2mChanged,
            "pre_migrate" | "before_migrate" => SignalKind::PreMigrate,
            "post_migrate" | "after_migrate" => SignalKind::PostMigrate,
            _ => return None,
        };
        Some(kind)
    }

    /// Comma separated list of canonical names
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Signals that carry a model instance
    pub fn carries_instance(&self) -> bool {
        !matches!(
            self,
            SignalKind::PreInit | SignalKind::PreMigrate | SignalKind::PostMigrate
        )
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for SignalKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Error returned when a signal name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal '{0}'")]
pub struct UnknownSignalName(pub String);

impl FromStr for SignalKind {
    type Err = UnknownSignalName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownSignalName(s.to_string()))
    }
}

/// Stage of a many-to-many relation change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum M2mAction {
    PreAdd,
    PostAdd,
    PreRemove,
    PostRemove,
    PreClear,
    PostClear,
}
