// src/patch.rs

//! Sparse UPDATE statements built from a fixed column whitelist.
//!
//! Each updatable table declares a [`PatchSchema`]. A [`Patch`] collects only
//! the fields that were actually sent (`Some`) and binds their values, so the
//! generated SQL never contains client-controlled column names.

use sqlx::{Encode, Postgres, QueryBuilder, Type};
use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug)]
pub struct PatchSchema {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub touches_updated_at: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("column '{column}' is not updatable on '{table}'")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl From<PatchError> for AppError {
    fn from(err: PatchError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

pub struct Patch<'args> {
    schema: &'static PatchSchema,
    builder: QueryBuilder<'args, Postgres>,
    columns: Vec<&'static str>,
    unknown: Option<&'static str>,
}

impl<'args> Patch<'args> {
    pub fn new(schema: &'static PatchSchema) -> Self {
        let builder = QueryBuilder::new(format!("UPDATE {} SET ", schema.table));
        Self {
            schema,
            builder,
            columns: Vec::new(),
            unknown: None,
        }
    }

    /// Adds `column = value` when `value` is `Some`. For nullable columns pass
    /// `Option<Option<T>>`: `Some(None)` writes NULL.
    pub fn set<T>(&mut self, column: &'static str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        let Some(value) = value else {
            return self;
        };
        if !self.schema.columns.contains(&column) {
            self.unknown.get_or_insert(column);
            return self;
        }
        if !self.columns.is_empty() {
            self.builder.push(", ");
        }
        self.builder.push(column).push(" = ").push_bind(value);
        self.columns.push(column);
        self
    }

    pub fn table(&self) -> &'static str {
        self.schema.table
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Finishes the statement for the row `id`. `Ok(None)` means nothing to update.
    pub fn build(mut self, id: i32) -> Result<Option<QueryBuilder<'args, Postgres>>, PatchError> {
        if let Some(column) = self.unknown {
            return Err(PatchError::UnknownColumn {
                table: self.schema.table,
                column,
            });
        }
        if self.columns.is_empty() {
            return Ok(None);
        }
        if self.schema.touches_updated_at {
            self.builder.push(", updated_at = NOW()");
        }
        self.builder.push(" WHERE id = ").push_bind(id);
        self.builder.push(" RETURNING *");
        Ok(Some(self.builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FARMERS: PatchSchema = PatchSchema {
        table: "farmers",
        columns: &["name", "bio_es", "bio_en", "is_active"],
        touches_updated_at: true,
    };

    static VARIETIES: PatchSchema = PatchSchema {
        table: "varieties",
        columns: &["name"],
        touches_updated_at: false,
    };

    #[test]
    fn only_sent_fields_are_updated() {
        let mut patch = Patch::new(&FARMERS);
        patch
            .set("name", Some("Don Aurelio".to_string()))
            .set("bio_es", None::<Option<String>>)
            .set("bio_en", Some(None::<String>));
        assert_eq!(patch.columns(), &["name", "bio_en"]);

        let builder = patch.build(12).unwrap().unwrap();
        assert_eq!(
            builder.sql(),
            "UPDATE farmers SET name = $1, bio_en = $2, updated_at = NOW() WHERE id = $3 RETURNING *"
        );
    }

    #[test]
    fn empty_patch_builds_nothing() {
        let mut patch = Patch::new(&FARMERS);
        patch.set("is_active", None::<bool>);
        assert!(patch.is_empty());
        assert!(patch.build(1).unwrap().is_none());
    }

    #[test]
    fn tables_without_updated_at_are_not_touched() {
        let mut patch = Patch::new(&VARIETIES);
        patch.set("name", Some("Castillo".to_string()));
        let builder = patch.build(3).unwrap().unwrap();
        assert_eq!(builder.sql(), "UPDATE varieties SET name = $1 WHERE id = $2 RETURNING *");
    }

    #[test]
    fn column_outside_schema_is_rejected() {
        let mut patch = Patch::new(&VARIETIES);
        patch.set("password_hash", Some("x".to_string()));
        assert_eq!(
            patch.build(3).err(),
            Some(PatchError::UnknownColumn {
                table: "varieties",
                column: "password_hash"
            })
        );
    }
}
