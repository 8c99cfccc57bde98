//! Stored relations and tabular results.

use crate::error::{CoreError, CoreResult};
use crate::value::DataValue;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

/// Returns true if `name` is a valid relation or column identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Tabular result: column headers plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedRows {
    /// Column names.
    pub headers: Vec<String>,
    /// Row values, one entry per header.
    pub rows: Vec<Vec<DataValue>>,
}

impl NamedRows {
    /// Creates a result set.
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<DataValue>>) -> Self {
        Self { headers, rows }
    }

    /// The single-row `status: OK` result returned by mutations.
    #[must_use]
    pub fn status_ok() -> Self {
        Self::new(
            vec!["status".to_string()],
            vec![vec![DataValue::Str("OK".to_string())]],
        )
    }

    /// Renders headers and rows as JSON.
    #[must_use]
    pub fn rows_json(&self) -> JsonValue {
        JsonValue::Array(
            self.rows
                .iter()
                .map(|row| JsonValue::Array(row.iter().map(DataValue::to_json).collect()))
                .collect(),
        )
    }
}

/// A named relation with key columns and non-key columns.
///
/// Rows are unique by key; writing an existing key replaces its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    name: String,
    keys: Vec<String>,
    values: Vec<String>,
    rows: BTreeMap<Vec<DataValue>, Vec<DataValue>>,
}

impl Relation {
    /// Creates an empty relation, validating the schema.
    pub fn new(name: &str, keys: Vec<String>, values: Vec<String>) -> CoreResult<Self> {
        if !is_identifier(name) {
            return Err(CoreError::eval(format!("invalid relation name '{name}'")));
        }
        if keys.is_empty() {
            return Err(CoreError::eval(format!(
                "relation '{name}' must have at least one key column"
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for col in keys.iter().chain(values.iter()) {
            if !is_identifier(col) {
                return Err(CoreError::eval(format!("invalid column name '{col}'")));
            }
            if !seen.insert(col.as_str()) {
                return Err(CoreError::eval(format!(
                    "duplicate column '{col}' in relation '{name}'"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            keys,
            values,
            rows: BTreeMap::new(),
        })
    }

    /// Relation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key column names.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Non-key column names.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// All column names, keys first.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.keys.iter().chain(self.values.iter())
    }

    /// Number of columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.keys.len() + self.values.len()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the relation holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates full tuples (keys then values) in key order.
    pub fn tuples(&self) -> impl Iterator<Item = Vec<DataValue>> + '_ {
        self.rows.iter().map(|(k, v)| {
            let mut tuple = k.clone();
            tuple.extend(v.iter().cloned());
            tuple
        })
    }

    /// Maps `headers` onto this relation's columns.
    ///
    /// Returns, for each column in schema order, the index into `headers`
    /// supplying it. When `keys_only` is set, only key columns are required.
    pub fn column_positions(&self, headers: &[String], keys_only: bool) -> CoreResult<Vec<usize>> {
        let wanted: Vec<&String> = if keys_only {
            self.keys.iter().collect()
        } else {
            self.columns().collect()
        };
        wanted
            .into_iter()
            .map(|col| {
                headers.iter().position(|h| h == col).ok_or_else(|| {
                    CoreError::eval(format!(
                        "column '{col}' of relation '{}' not supplied",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Inserts or replaces a full tuple given in schema order.
    pub fn put(&mut self, mut tuple: Vec<DataValue>) {
        let values = tuple.split_off(self.keys.len());
        self.rows.insert(tuple, values);
    }

    /// Removes the row with the given key.
    pub fn remove(&mut self, key: &[DataValue]) -> bool {
        self.rows.remove(key).is_some()
    }

    /// Exports as `{"headers", "rows", "keys"}`.
    #[must_use]
    pub fn to_export_json(&self) -> JsonValue {
        let rows = NamedRows::new(self.columns().cloned().collect(), self.tuples().collect());
        let rows_json = rows.rows_json();
        json!({
            "headers": rows.headers,
            "rows": rows_json,
            "keys": self.keys,
        })
    }

    /// Returns true if both relations share the same schema.
    #[must_use]
    pub fn same_schema(&self, other: &Relation) -> bool {
        self.keys == other.keys && self.values == other.values
    }
}
