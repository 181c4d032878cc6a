use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map};
use thiserror::Error as ThisError;

///
/// Row
///
/// Field-name → value map exchanged with the storage collaborator.
/// Field order is canonical (sorted) so two rows with the same content are equal.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Keep only `fields`; absent fields project as `Null`.
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Self {
        let fields = fields
            .iter()
            .map(|f| (f.clone(), self.get(f).cloned().unwrap_or(Value::Null)))
            .collect();

        Self { fields }
    }

    pub fn require(&self, field: &str) -> Result<&Value, RowDecodeError> {
        self.get(field).ok_or_else(|| RowDecodeError::MissingField {
            field: field.to_string(),
        })
    }

    pub fn require_text(&self, field: &str) -> Result<String, RowDecodeError> {
        let value = self.require(field)?;
        value
            .as_text()
            .map(ToString::to_string)
            .ok_or_else(|| RowDecodeError::mismatch(field, "text", value))
    }

    pub fn require_i64(&self, field: &str) -> Result<i64, RowDecodeError> {
        let value = self.require(field)?;
        value
            .as_i64()
            .ok_or_else(|| RowDecodeError::mismatch(field, "int", value))
    }

    /// Read a nullable integer column; both a missing field and `Null` decode as `None`.
    pub fn optional_i64(&self, field: &str) -> Result<Option<i64>, RowDecodeError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| RowDecodeError::mismatch(field, "int", value)),
        }
    }

    /// Read a nullable text column; both a missing field and `Null` decode as `None`.
    pub fn optional_text(&self, field: &str) -> Result<Option<String>, RowDecodeError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_text()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| RowDecodeError::mismatch(field, "text", value)),
        }
    }

    // Single-column rows decode into scalars.
    fn into_single(self) -> Result<(String, Value), RowDecodeError> {
        if self.fields.len() != 1 {
            return Err(RowDecodeError::NotScalar {
                columns: self.fields.len(),
            });
        }

        self.fields
            .into_iter()
            .next()
            .ok_or(RowDecodeError::NotScalar { columns: 0 })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

///
/// RowDecodeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RowDecodeError {
    #[error("row has no field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("scalar decode requires exactly one column, found {columns}")]
    NotScalar { columns: usize },
}

impl RowDecodeError {
    fn mismatch(field: &str, expected: &'static str, found: &Value) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
            found: found.kind_label(),
        }
    }
}

///
/// FromRow
///
/// Decode one storage row into a caller type (entity, DTO, or scalar).
///

pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self, RowDecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, RowDecodeError> {
        Ok(row)
    }
}

impl FromRow for Value {
    fn from_row(row: Row) -> Result<Self, RowDecodeError> {
        row.into_single().map(|(_, value)| value)
    }
}

impl FromRow for String {
    fn from_row(row: Row) -> Result<Self, RowDecodeError> {
        let (field, value) = row.into_single()?;
        match value {
            Value::Text(s) => Ok(s),
            other => Err(RowDecodeError::mismatch(&field, "text", &other)),
        }
    }
}

impl FromRow for i64 {
    fn from_row(row: Row) -> Result<Self, RowDecodeError> {
        let (field, value) = row.into_single()?;
        value
            .as_i64()
            .ok_or_else(|| RowDecodeError::mismatch(&field, "int", &value))
    }
}
