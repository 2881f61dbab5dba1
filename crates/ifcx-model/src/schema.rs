//! Dynamic schema inference
//!
//! Property bags arrive one record at a time and nobody knows the full column
//! set until the last record has been seen. The engine keeps:
//! - an arena of interned column names with a widening [`ColumnType`] each,
//! - a sparse row store keyed by entity id.
//!
//! Column typing is a join over every non-empty observation, so the final
//! type does not depend on the order values were seen in. Values are only
//! coerced once, in [`SchemaInference::finish`], against the final types.

use ahash::AHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::closure::ClosureEntry;
use crate::tabular::{EntityId, Row, TabularModel, Value};

// ============================================================================
// Column types
// ============================================================================

/// Inferred column type.
///
/// `Empty` is the bottom and `Text` the top. `Integer` widens to `Real`.
/// `Boolean` sits beside the numeric chain: joining it with a number gives
/// `Text`, so a column holding both `true` and `"5"` is `Text` whichever
/// arrives first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Empty,
    Boolean,
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Least upper bound of two types.
    pub fn join(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Empty, t) | (t, Empty) => t,
            (Integer, Real) | (Real, Integer) => Real,
            _ => Text,
        }
    }

    /// Classify a single raw value.
    pub fn classify(value: &Value) -> ColumnType {
        match value {
            Value::Null => ColumnType::Empty,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Int(_) => ColumnType::Integer,
            Value::Real(f) if f.is_nan() => ColumnType::Text,
            Value::Real(f) if real_to_integer(*f).is_some() => ColumnType::Integer,
            Value::Real(_) => ColumnType::Real,
            Value::Text(s) if integer_pattern().is_match(s) && s.parse::<i64>().is_ok() => {
                ColumnType::Integer
            }
            Value::Text(s) if parse_real(s).is_some() => ColumnType::Real,
            Value::Text(_) => ColumnType::Text,
        }
    }

    /// Convert a stored value into its emitted form under this (final) type.
    pub fn coerce(self, value: Value) -> Value {
        match self {
            ColumnType::Empty => Value::Null,
            ColumnType::Boolean => match value {
                Value::Bool(true) => Value::Int(1),
                Value::Bool(false) => Value::Int(0),
                _ => Value::Null,
            },
            ColumnType::Integer => match value {
                Value::Int(i) => Value::Int(i),
                Value::Real(f) => real_to_integer(f.trunc()).map_or(Value::Null, Value::Int),
                Value::Text(s) => parse_integer(&s).map_or(Value::Null, Value::Int),
                _ => Value::Null,
            },
            ColumnType::Real => match value {
                Value::Int(i) => Value::Real(i as f64),
                Value::Real(f) => Value::Real(f),
                Value::Text(s) => parse_real(&s).map_or(Value::Null, Value::Real),
                _ => Value::Null,
            },
            ColumnType::Text => value,
        }
    }
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?[0-9]+$").expect("static pattern"))
}

fn parse_real(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Integral `f` that fits in an `i64`; anything else has no integer form.
fn real_to_integer(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| parse_real(trimmed).and_then(|f| real_to_integer(f.trunc())))
}

// ============================================================================
// Schema (interned column arena)
// ============================================================================

/// Index of a column in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u32);

impl ColumnId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ordered column set; insertion order is first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    names: Vec<String>,
    types: Vec<ColumnType>,
    index: AHashMap<String, ColumnId>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, column: ColumnId) -> &str {
        &self.names[column.index()]
    }

    pub fn column_type(&self, column: ColumnId) -> ColumnType {
        self.types[column.index()]
    }

    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.column_id(name).map(|c| self.column_type(c))
    }

    /// Intern a column name without changing its type.
    pub fn intern(&mut self, name: &str) -> ColumnId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = ColumnId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.types.push(ColumnType::Empty);
        self.index.insert(name.to_string(), id);
        id
    }

    /// Intern a column and widen it to at least `column_type`.
    pub fn declare(&mut self, name: &str, column_type: ColumnType) -> ColumnId {
        let id = self.intern(name);
        self.widen(id, column_type);
        id
    }

    pub fn widen(&mut self, column: ColumnId, column_type: ColumnType) {
        let slot = &mut self.types[column.index()];
        *slot = slot.join(column_type);
    }

    /// `(id, name, type)` in column order.
    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, &str, ColumnType)> {
        self.names
            .iter()
            .zip(&self.types)
            .enumerate()
            .map(|(i, (name, ty))| (ColumnId(i as u32), name.as_str(), *ty))
    }
}

// ============================================================================
// Inference engine
// ============================================================================

/// Identity columns every entity row carries, in output order.
pub const IDENTITY_COLUMNS: [(&str, ColumnType); 7] = [
    ("ExpressID", ColumnType::Integer),
    ("Type", ColumnType::Text),
    ("GlobalId", ColumnType::Text),
    ("GUID", ColumnType::Text),
    ("Name", ColumnType::Text),
    ("Description", ColumnType::Text),
    ("Tag", ColumnType::Text),
];

#[derive(Debug, Default)]
pub struct SchemaInference {
    schema: Schema,
    rows: BTreeMap<EntityId, Row>,
}

impl SchemaInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine pre-seeded with [`IDENTITY_COLUMNS`].
    pub fn with_identity_columns() -> Self {
        let mut engine = Self::new();
        for (name, column_type) in IDENTITY_COLUMNS {
            engine.schema.declare(name, column_type);
        }
        engine
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Record one observation of `value` for `column` and return the column.
    ///
    /// Empty values never change a column's type.
    pub fn observe(&mut self, column: &str, value: &Value) -> ColumnId {
        let id = self.schema.intern(column);
        let observed = ColumnType::classify(value);
        if observed != ColumnType::Empty {
            self.schema.widen(id, observed);
        }
        id
    }

    /// Intern a column with a fixed type (identity columns and the like).
    pub fn declare(&mut self, column: &str, column_type: ColumnType) -> ColumnId {
        self.schema.declare(column, column_type)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.schema.type_of(column)
    }

    pub fn row_mut(&mut self, id: EntityId) -> &mut Row {
        self.rows.entry(id).or_default()
    }

    pub fn insert_row(&mut self, id: EntityId, row: Row) {
        self.rows.insert(id, row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Freeze the schema and coerce every stored value by its column's final
    /// type.
    ///
    /// Columns that never saw a non-empty value are dropped along with their
    /// cells; surviving columns keep first-seen order.
    pub fn finish(self, relations: Vec<ClosureEntry>) -> TabularModel {
        let SchemaInference { schema, rows } = self;

        let mut final_schema = Schema::new();
        let mut remap: Vec<Option<ColumnId>> = Vec::with_capacity(schema.len());
        for (_, name, column_type) in schema.iter() {
            if column_type == ColumnType::Empty {
                remap.push(None);
            } else {
                remap.push(Some(final_schema.declare(name, column_type)));
            }
        }
        let dropped = remap.iter().filter(|r| r.is_none()).count();
        if dropped > 0 {
            tracing::debug!(dropped, "dropping columns without any non-empty value");
        }

        let rows = rows
            .into_iter()
            .map(|(id, row)| {
                let mut out = Row::new();
                for (column, value) in row.into_cells() {
                    if let Some(target) = remap[column.index()] {
                        let column_type = final_schema.column_type(target);
                        out.set(target, column_type.coerce(value));
                    }
                }
                (id, out)
            })
            .collect();

        TabularModel {
            schema: final_schema,
            rows,
            relations,
        }
    }
}
