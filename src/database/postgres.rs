use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

use crate::config::config;
use crate::database::error::StoreError;
use crate::database::model::{field_values, Model};
use crate::database::repository::ModelStore;

/// Postgres-backed store. Rows travel as JSON through `row_to_json` and
/// `jsonb_populate_record`, so the table's columns must match the model's
/// concrete field names.
pub struct PgStore<M> {
    pool: PgPool,
    table: String,
    columns: Vec<&'static str>,
    _model: PhantomData<fn() -> M>,
}

impl<M> PgStore<M>
where
    M: Model + DeserializeOwned,
{
    pub fn new(pool: PgPool) -> Result<Self, StoreError> {
        let meta = M::meta();
        if !is_valid_identifier(meta.table) {
            return Err(StoreError::InvalidIdentifier(meta.table.to_string()));
        }

        let columns: Vec<&'static str> = meta.concrete_fields().map(|field| field.name).collect();
        if let Some(bad) = columns.iter().find(|column| !is_valid_identifier(column)) {
            return Err(StoreError::InvalidIdentifier(bad.to_string()));
        }
        if !columns.contains(&"id") {
            return Err(StoreError::MissingKey(format!("{} has no concrete 'id' field", meta.name)));
        }

        Ok(Self {
            pool,
            table: meta.table.to_string(),
            columns,
            _model: PhantomData,
        })
    }

    /// Connect a pool sized from config
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let database = &config().database;
        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .acquire_timeout(Duration::from_secs(database.connection_timeout))
            .connect(database_url)
            .await?;

        tracing::info!("Connected Postgres store for {}", M::meta().name);
        Self::new(pool)
    }

    /// Connect using DATABASE_URL
    pub async fn connect_from_env() -> Result<Self, StoreError> {
        let url = config()
            .database
            .url
            .clone()
            .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
        Self::connect(&url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn column_list(&self, include_id: bool) -> String {
        self.columns
            .iter()
            .filter(|column| include_id || **column != "id")
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl<M> ModelStore<M> for PgStore<M>
where
    M: Model + DeserializeOwned,
{
    async fn get(&self, id: Uuid) -> Result<Option<M>, StoreError> {
        let sql = format!("SELECT row_to_json(t) FROM {} t WHERE t.id = $1", self.table);
        let row: Option<Value> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, instance: &mut M) -> Result<(), StoreError> {
        if instance.pk().is_none() {
            instance.set_pk(Uuid::new_v4());
        }

        let columns = self.column_list(true);
        let sql = format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)",
            table = self.table,
            columns = columns,
        );

        sqlx::query(&sql)
            .bind(Value::Object(field_values(instance)?))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, instance: &M, update_fields: Option<&[String]>) -> Result<bool, StoreError> {
        let id = instance
            .pk()
            .ok_or_else(|| StoreError::MissingKey(format!("update of {} requires a key", M::meta().name)))?;

        let columns = match update_fields {
            Some(fields) => select_columns(M::meta().name, &self.columns, fields)?.join(", "),
            None => self.column_list(false),
        };
        if columns.is_empty() {
            return self.exists(id).await;
        }

        let sql = format!(
            "UPDATE {table} SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) WHERE id = $2",
            table = self.table,
            columns = columns,
        );

        let result = sqlx::query(&sql)
            .bind(Value::Object(field_values(instance)?))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Non-key columns named by `update_fields`, in declaration order
fn select_columns(
    model: &'static str,
    columns: &[&'static str],
    update_fields: &[String],
) -> Result<Vec<&'static str>, StoreError> {
    if let Some(unknown) = update_fields
        .iter()
        .find(|field| field.as_str() == "id" || !columns.iter().any(|column| *column == field.as_str()))
    {
        return Err(StoreError::unknown_field(model, unknown));
    }

    Ok(columns
        .iter()
        .filter(|column| **column != "id" && update_fields.iter().any(|field| field.as_str() == **column))
        .copied()
        .collect())
}

/// Accepts `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`
fn is_valid_identifier(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => valid_part(name),
        (Some(schema), Some(name), None) => valid_part(schema) && valid_part(name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_identifiers() {
        assert!(is_valid_identifier("articles"));
        assert!(is_valid_identifier("blog.articles"));
        assert!(is_valid_identifier("_private_2"));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("articles; DROP TABLE users"));
        assert!(!is_valid_identifier("a.b.c"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn update_fields_select_known_columns_in_order() {
        let columns = ["id", "title", "status"];
        let fields = vec!["status".to_string(), "title".to_string()];
        assert_eq!(select_columns("Article", &columns, &fields).unwrap(), vec!["title", "status"]);

        let fields = vec!["status".to_string()];
        assert_eq!(select_columns("Article", &columns, &fields).unwrap(), vec!["status"]);
    }

    #[test]
    fn update_fields_reject_key_and_unknown_columns() {
        let columns = ["id", "title", "status"];
        for bad in ["id", "tags"] {
            let fields = vec![bad.to_string()];
            assert!(matches!(
                select_columns("Article", &columns, &fields),
                Err(StoreError::UnknownField { ref field, .. }) if field == bad
            ));
        }
    }
}
