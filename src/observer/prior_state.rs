use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::database::model::{field_values, Model};

/// Transient back-references attached to an instance while it is being saved.
///
/// Both references point at the same snapshot: the row as it was persisted
/// before the save, or the instance itself when that row no longer exists.
/// Never serialized; overwritten on every save of an existing row.
pub struct PriorState<M> {
    pre_save_instance: Option<Arc<M>>,
    pre_delete_instance: Option<Arc<M>>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<M> PriorState<M> {
    pub fn new() -> Self {
        Self {
            pre_save_instance: None,
            pre_delete_instance: None,
            loaded_at: None,
        }
    }

    /// Attach a snapshot under both back-references
    pub fn attach(&mut self, snapshot: Arc<M>) {
        self.pre_save_instance = Some(Arc::clone(&snapshot));
        self.pre_delete_instance = Some(snapshot);
        self.loaded_at = Some(Utc::now());
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn pre_save_instance(&self) -> Option<&M> {
        self.pre_save_instance.as_deref()
    }

    pub fn pre_delete_instance(&self) -> Option<&M> {
        self.pre_delete_instance.as_deref()
    }

    /// Shared handle to the snapshot
    pub fn snapshot(&self) -> Option<Arc<M>> {
        self.pre_save_instance.clone()
    }

    /// When the snapshot was attached
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn is_attached(&self) -> bool {
        self.pre_save_instance.is_some()
    }
}

impl<M> Default for PriorState<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for PriorState<M> {
    fn clone(&self) -> Self {
        Self {
            pre_save_instance: self.pre_save_instance.clone(),
            pre_delete_instance: self.pre_delete_instance.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

impl<M> fmt::Debug for PriorState<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorState")
            .field("attached", &self.is_attached())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// A concrete field whose value differs from the prior snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Compare every concrete field of `current` against `prior`, in declaration order.
///
/// A concrete field that neither instance serializes under its declared name
/// is an error, since its changes could never be seen.
pub fn changed_fields<M: Model>(current: &M, prior: &M) -> Result<Vec<FieldChange>, serde_json::Error> {
    let current_values = field_values(current)?;
    let prior_values = field_values(prior)?;

    let mut changes = Vec::new();
    for field in M::meta().concrete_fields() {
        let new_value = current_values.get(field.name);
        let old_value = prior_values.get(field.name);
        tracing::trace!("Comparing {}.{}: {:?} -> {:?}", M::meta().name, field.name, old_value, new_value);

        if new_value.is_none() && old_value.is_none() {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "concrete field '{}.{}' is missing from the serialized model",
                M::meta().name,
                field.name
            )));
        }

        if new_value != old_value {
            changes.push(FieldChange {
                field: field.name,
                old_value: old_value.cloned(),
                new_value: new_value.cloned(),
            });
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::model::{FieldDescriptor, ModelMeta};
    use serde::Serialize;
    use uuid::Uuid;

    static FIELDS: [FieldDescriptor; 4] = [
        FieldDescriptor::concrete("id"),
        FieldDescriptor::concrete("body"),
        FieldDescriptor::concrete("status"),
        FieldDescriptor::many_to_many("labels"),
    ];
    static META: ModelMeta = ModelMeta::new("Note", "notes", &FIELDS);

    #[derive(Debug, Clone, Serialize)]
    struct Note {
        id: Option<Uuid>,
        body: String,
        status: String,
        labels: Vec<String>,
        #[serde(skip)]
        prior: PriorState<Note>,
    }

    impl Model for Note {
        fn meta() -> &'static ModelMeta { &META }
        fn pk(&self) -> Option<Uuid> { self.id }
        fn set_pk(&mut self, id: Uuid) { self.id = Some(id); }
        fn prior_state(&self) -> &PriorState<Self> { &self.prior }
        fn prior_state_mut(&mut self) -> &mut PriorState<Self> { &mut self.prior }
    }

    fn note(body: &str, status: &str) -> Note {
        Note {
            id: Some(Uuid::nil()),
            body: body.to_string(),
            status: status.to_string(),
            labels: Vec::new(),
            prior: PriorState::new(),
        }
    }

    #[test]
    fn reports_changed_fields_in_declaration_order() {
        let prior = note("hello", "draft");
        let current = note("hello world", "published");
        let changes = changed_fields(&current, &prior).unwrap();
        let names: Vec<_> = changes.iter().map(|c| c.field).collect();
        assert_eq!(names, vec!["body", "status"]);
        assert_eq!(changes[1].old_value, Some(Value::from("draft")));
        assert_eq!(changes[1].new_value, Some(Value::from("published")));
    }

    #[test]
    fn ignores_non_concrete_fields() {
        let prior = note("hello", "draft");
        let mut current = prior.clone();
        current.labels.push("rust".to_string());
        assert!(changed_fields(&current, &prior).unwrap().is_empty());
    }

    static DOC_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::concrete("id"),
        FieldDescriptor::concrete("status"),
    ];
    static DOC_META: ModelMeta = ModelMeta::new("Doc", "docs", &DOC_FIELDS);

    #[derive(Debug, Clone, Serialize)]
    struct Doc {
        id: Option<Uuid>,
        #[serde(rename = "state")]
        status: String,
        #[serde(skip)]
        prior: PriorState<Doc>,
    }

    impl Model for Doc {
        fn meta() -> &'static ModelMeta { &DOC_META }
        fn pk(&self) -> Option<Uuid> { self.id }
        fn set_pk(&mut self, id: Uuid) { self.id = Some(id); }
        fn prior_state(&self) -> &PriorState<Self> { &self.prior }
        fn prior_state_mut(&mut self) -> &mut PriorState<Self> { &mut self.prior }
    }

    #[test]
    fn renamed_concrete_field_is_an_error() {
        let prior = Doc { id: Some(Uuid::nil()), status: "draft".to_string(), prior: PriorState::new() };
        let current = Doc { status: "published".to_string(), ..prior.clone() };

        let error = changed_fields(&current, &prior).unwrap_err();
        assert!(error.to_string().contains("'Doc.status'"));
    }

    #[test]
    fn attach_sets_both_references_to_one_snapshot() {
        let mut state = PriorState::new();
        let snapshot = Arc::new(note("hello", "draft"));
        state.attach(Arc::clone(&snapshot));
        assert!(state.is_attached());
        assert!(state.loaded_at().is_some());
        assert!(std::ptr::eq(
            state.pre_save_instance().unwrap(),
            state.pre_delete_instance().unwrap()
        ));
        state.clear();
        assert!(state.pre_delete_instance().is_none());
    }
}
