//! The structured intermediate shape: typed columns, sparse rows and the
//! flattened hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::closure::ClosureEntry;
use crate::schema::{ColumnId, ColumnType, Schema};

/// Local entity identifier (the STEP instance number), unique within one
/// conversion.
pub type EntityId = u64;

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A sparse row: only the cells that were actually assigned.
///
/// Missing columns read as absent, not as null; writers backfill them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(ColumnId, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a cell, replacing any earlier value for the same column.
    pub fn set(&mut self, column: ColumnId, value: Value) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: ColumnId) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn cells(&self) -> impl Iterator<Item = (ColumnId, &Value)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn into_cells(self) -> Vec<(ColumnId, Value)> {
        self.cells
    }
}

/// Decoded model ready for an encoder: `{columns, rows, relations}`.
#[derive(Debug, Clone, Default)]
pub struct TabularModel {
    pub schema: Schema,
    pub rows: BTreeMap<EntityId, Row>,
    pub relations: Vec<ClosureEntry>,
}

impl TabularModel {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().map(|(_, name, _)| name)
    }

    /// Look up a cell by column name.
    pub fn cell(&self, id: EntityId, column: &str) -> Option<&Value> {
        let column = self.schema.column_id(column)?;
        self.rows.get(&id)?.get(column)
    }

    /// Materialize a row in schema order, backfilling unset columns with null.
    pub fn dense_row<'a>(&'a self, row: &'a Row) -> Vec<&'a Value> {
        const NULL: &Value = &Value::Null;
        let mut dense = vec![NULL; self.schema.len()];
        for (column, value) in row.cells() {
            if let Some(slot) = dense.get_mut(column.index()) {
                *slot = value;
            }
        }
        dense
    }

    /// Add a column after decoding (for transforms). Existing columns are
    /// widened instead of duplicated.
    pub fn add_column(&mut self, name: &str, column_type: ColumnType) -> ColumnId {
        self.schema.declare(name, column_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_set_overwrites() {
        let mut row = Row::new();
        row.set(ColumnId(0), Value::Int(1));
        row.set(ColumnId(1), "a".into());
        row.set(ColumnId(0), Value::Null);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(ColumnId(0)), Some(&Value::Null));
    }

    #[test]
    fn test_dense_row_backfills_null() {
        let mut model = TabularModel::default();
        let a = model.add_column("A", ColumnType::Integer);
        model.add_column("B", ColumnType::Text);
        let mut row = Row::new();
        row.set(a, Value::Int(7));
        model.rows.insert(1, row);

        let row = &model.rows[&1];
        let dense = model.dense_row(row);
        assert_eq!(dense, vec![&Value::Int(7), &Value::Null]);
        assert_eq!(model.cell(1, "A"), Some(&Value::Int(7)));
        assert_eq!(model.cell(1, "B"), None);
    }
}
