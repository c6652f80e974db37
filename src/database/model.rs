use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::observer::prior_state::PriorState;

/// How a field is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Backed by a column on the model's own table
    Concrete,
    /// Backed by a join table; never part of the row itself
    ManyToMany,
    /// Reverse side of a relation declared on another model
    Reverse,
}

/// A single field in a model's schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub const fn concrete(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Concrete }
    }

    pub const fn many_to_many(name: &'static str) -> Self {
        Self { name, kind: FieldKind::ManyToMany }
    }

    pub const fn reverse(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Reverse }
    }

    pub fn is_concrete(&self) -> bool {
        self.kind == FieldKind::Concrete
    }
}

/// Static schema description of a model type
#[derive(Debug)]
pub struct ModelMeta {
    /// Model name used as the signal sender and in error messages
    pub name: &'static str,
    /// Backing table
    pub table: &'static str,
    /// Fields in declaration order
    pub fields: &'static [FieldDescriptor],
}

impl ModelMeta {
    pub const fn new(
        name: &'static str,
        table: &'static str,
        fields: &'static [FieldDescriptor],
    ) -> Self {
        Self { name, table, fields }
    }

    /// Column-backed fields, in declaration order
    pub fn concrete_fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter().filter(|field| field.is_concrete())
    }

    pub fn has_concrete_field(&self, name: &str) -> bool {
        self.concrete_fields().any(|field| field.name == name)
    }
}

/// A persisted entity that can be observed.
///
/// Field values are read through the model's `Serialize` impl, so every
/// concrete field must serialize under its own name; change detection fails
/// on a concrete field missing from the output. The prior-state slot
/// must be excluded from serialization (`#[serde(skip)]`).
pub trait Model: Clone + Serialize + Send + Sync + 'static {
    fn meta() -> &'static ModelMeta;

    /// Identity key, `None` until the row has been inserted
    fn pk(&self) -> Option<Uuid>;

    fn set_pk(&mut self, id: Uuid);

    fn prior_state(&self) -> &PriorState<Self>;

    fn prior_state_mut(&mut self) -> &mut PriorState<Self>;
}

/// Snapshot the serialized field values of an instance
pub fn field_values<M: Model>(instance: &M) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(instance)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "model '{}' must serialize to an object, got {}",
            M::meta().name,
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FIELDS: [FieldDescriptor; 4] = [
        FieldDescriptor::concrete("id"),
        FieldDescriptor::concrete("title"),
        FieldDescriptor::many_to_many("tags"),
        FieldDescriptor::concrete("status"),
    ];
    static META: ModelMeta = ModelMeta::new("Article", "articles", &FIELDS);

    #[test]
    fn concrete_fields_keep_declaration_order() {
        let names: Vec<_> = META.concrete_fields().map(|f| f.name).collect();
        assert_eq!(names, vec!["id", "title", "status"]);
        assert!(META.has_concrete_field("status"));
        assert!(!META.has_concrete_field("tags"));
    }
}
