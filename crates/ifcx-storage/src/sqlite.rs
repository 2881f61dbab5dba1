//! SQLite output
//!
//! Writes a [`TabularModel`] into a fresh database file with two tables:
//!
//! - `Entities`: one column per schema column, `ExpressID` as primary key and
//!   `GlobalId` unique;
//! - `Hierarchy(ParentID, ChildID, Depth)`: the relation closure, with both
//!   ids referencing `Entities(ExpressID)`.
//!
//! SQLite compares column names without regard to ASCII case, so a schema
//! column whose name differs from an earlier one only by case is written as
//! `<name>_2`, `<name>_3`, ...
//!
//! Foreign keys are enforced while loading. Closure entries that point at an
//! entity without a row are rejected by SQLite and skipped, not fatal.

use std::collections::HashSet;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};
use thiserror::Error;

use ifcx_model::{ClosureEntry, ColumnType, Schema, TabularModel, Value};

#[derive(Debug, Error)]
pub enum SqliteWriteError {
    #[error("cannot create a table without columns")]
    EmptySchema,

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A hierarchy entry the database refused.
#[derive(Debug, Clone, Error)]
#[error("hierarchy entry {ancestor} -> {descendant} (depth {depth}) skipped: {reason}")]
pub struct RelationInsertSkipped {
    pub ancestor: u64,
    pub descendant: u64,
    pub depth: u32,
    pub reason: String,
}

/// What ended up in the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqliteReport {
    pub rows: usize,
    pub relations: usize,
    pub skipped_relations: usize,
}

const HIERARCHY_DDL: &str = "CREATE TABLE Hierarchy (
    ParentID INTEGER,
    ChildID INTEGER,
    Depth INTEGER,
    FOREIGN KEY(ParentID) REFERENCES Entities(ExpressID),
    FOREIGN KEY(ChildID) REFERENCES Entities(ExpressID)
);";

const INSERT_HIERARCHY: &str = "INSERT INTO Hierarchy (ParentID, ChildID, Depth) VALUES (?1, ?2, ?3)";

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Boolean | ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Empty | ColumnType::Text => "TEXT",
    }
}

fn column_constraint(name: &str) -> &'static str {
    match name {
        "ExpressID" => " PRIMARY KEY",
        "GlobalId" => " UNIQUE",
        _ => "",
    }
}

/// Table column name for every schema column, in schema order, unique under
/// SQLite's case-insensitive comparison.
pub fn column_names(schema: &Schema) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(schema.len());
    schema
        .iter()
        .map(|(_, name, _)| {
            if taken.insert(name.to_ascii_lowercase()) {
                return name.to_string();
            }
            let renamed = (2..)
                .map(|n| format!("{name}_{n}"))
                .find(|candidate| !taken.contains(&candidate.to_ascii_lowercase()))
                .unwrap_or_else(|| name.to_string());
            taken.insert(renamed.to_ascii_lowercase());
            tracing::warn!(column = name, renamed = %renamed, "column name collides ignoring case");
            renamed
        })
        .collect()
}

/// `CREATE TABLE Entities (...)` for a schema, columns in schema order.
pub fn entities_ddl(schema: &Schema) -> Result<String, SqliteWriteError> {
    if schema.is_empty() {
        return Err(SqliteWriteError::EmptySchema);
    }
    let columns: Vec<String> = schema
        .iter()
        .zip(column_names(schema))
        .map(|((_, name, column_type), column)| {
            format!(
                "{} {}{}",
                quote_ident(&column),
                sql_type(column_type),
                column_constraint(name)
            )
        })
        .collect();
    Ok(format!("CREATE TABLE Entities (\n    {}\n);", columns.join(",\n    ")))
}

fn insert_entities_sql(schema: &Schema) -> String {
    let names: Vec<String> = column_names(schema).iter().map(|name| quote_ident(name)).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO Entities ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Borrowing adapter from a cell value to a SQLite parameter.
struct Cell<'a>(&'a Value);

impl ToSql for Cell<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn insert_relation(
    conn: &Connection,
    entry: &ClosureEntry,
) -> Result<(), RelationInsertSkipped> {
    conn.execute(
        INSERT_HIERARCHY,
        params![entry.ancestor as i64, entry.descendant as i64, entry.depth],
    )
    .map(|_| ())
    .map_err(|err| RelationInsertSkipped {
        ancestor: entry.ancestor,
        descendant: entry.descendant,
        depth: entry.depth,
        reason: err.to_string(),
    })
}

/// Load `model` into an open, empty database.
///
/// Progress is split evenly: rows fill `[0, 0.5]`, hierarchy entries fill
/// `(0.5, 1]`.
pub fn load_into(
    conn: &mut Connection,
    model: &TabularModel,
    progress: &mut dyn FnMut(f64),
) -> Result<SqliteReport, SqliteWriteError> {
    let mut report = SqliteReport::default();
    let total_rows = model.rows.len().max(1) as f64;
    let total_relations = model.relations.len().max(1) as f64;
    progress(0.0);

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&entities_ddl(&model.schema)?)?;
    conn.execute_batch(HIERARCHY_DDL)?;

    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(&insert_entities_sql(&model.schema))?;
        for row in model.rows.values() {
            let dense = model.dense_row(row);
            insert.execute(rusqlite::params_from_iter(dense.into_iter().map(Cell)))?;
            report.rows += 1;
            progress(report.rows as f64 / total_rows * 0.5);
        }
    }

    for (i, entry) in model.relations.iter().enumerate() {
        match insert_relation(&tx, entry) {
            Ok(()) => report.relations += 1,
            Err(skipped) => {
                report.skipped_relations += 1;
                tracing::debug!(%skipped, "hierarchy insert rejected");
            }
        }
        progress(0.5 + (i + 1) as f64 / total_relations * 0.5);
    }
    tx.commit()?;

    if report.skipped_relations > 0 {
        tracing::warn!(
            skipped = report.skipped_relations,
            "hierarchy entries referencing entities without a row were skipped"
        );
    }
    Ok(report)
}

/// Write `model` to a temporary database file and return the file's bytes.
pub fn write_sqlite(
    model: &TabularModel,
    progress: &mut dyn FnMut(f64),
) -> Result<(Vec<u8>, SqliteReport), SqliteWriteError> {
    let file = tempfile::Builder::new()
        .prefix("ifcx-")
        .suffix(".db")
        .tempfile()?;

    let mut conn = Connection::open(file.path())?;
    let report = load_into(&mut conn, model, progress)?;
    conn.close().map_err(|(_, err)| err)?;

    let bytes = std::fs::read(file.path())?;
    tracing::debug!(
        rows = report.rows,
        relations = report.relations,
        bytes = bytes.len(),
        "wrote SQLite database"
    );
    Ok((bytes, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifcx_model::closure::push_edges;
    use ifcx_model::{build_closure, Adjacency, SchemaInference};

    fn sample_model() -> TabularModel {
        let mut engine = SchemaInference::with_identity_columns();
        for id in [1u64, 2] {
            let express = engine.declare("ExpressID", ColumnType::Integer);
            let global = engine.declare("GlobalId", ColumnType::Text);
            let row = engine.row_mut(id);
            row.set(express, Value::Int(id as i64));
            row.set(global, Value::Text(format!("gid-{id}")));
        }
        let flag = engine.observe("Pset_IsExternal", &Value::Bool(true));
        engine.row_mut(1).set(flag, Value::Bool(true));

        let mut adjacency = Adjacency::new();
        // 3 has no row, so every entry touching it is rejected.
        push_edges(&mut adjacency, 1, [2, 3]);
        engine.finish(build_closure(&adjacency))
    }

    #[test]
    fn test_entities_ddl_types_and_keys() {
        let model = sample_model();
        let ddl = entities_ddl(&model.schema).unwrap();
        assert!(ddl.contains("\"ExpressID\" INTEGER PRIMARY KEY"));
        assert!(ddl.contains("\"GlobalId\" TEXT UNIQUE"));
        assert!(ddl.contains("\"Pset_IsExternal\" INTEGER"));
        assert!(entities_ddl(&Schema::new()).is_err());
    }

    #[test]
    fn test_load_skips_orphan_relations() {
        let model = sample_model();
        let mut conn = Connection::open_in_memory().unwrap();
        let mut seen = Vec::new();
        let report = load_into(&mut conn, &model, &mut |p| seen.push(p)).unwrap();

        // Closure: (1,1) (1,2) (1,3) (2,2) (3,3); the two touching 3 fail.
        assert_eq!(report.rows, 2);
        assert_eq!(report.relations, 3);
        assert_eq!(report.skipped_relations, 2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Hierarchy", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);

        let flag: Option<i64> = conn
            .query_row(
                "SELECT Pset_IsExternal FROM Entities WHERE ExpressID = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(flag, Some(1));

        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_write_sqlite_returns_database_bytes() {
        let model = sample_model();
        let (bytes, report) = write_sqlite(&model, &mut |_| {}).unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
        assert_eq!(report.rows, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        std::fs::write(&path, &bytes).unwrap();
        let conn = Connection::open(&path).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM Entities", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_case_colliding_columns_get_distinct_names() {
        let mut engine = SchemaInference::with_identity_columns();
        let express = engine.declare("ExpressID", ColumnType::Integer);
        let upper = engine.observe("Pset_Width", &Value::Real(0.3));
        let lower = engine.observe("Pset_width", &Value::Real(0.4));
        let taken = engine.observe("Pset_WIDTH_2", &"x".into());
        let row = engine.row_mut(7);
        row.set(express, Value::Int(7));
        row.set(upper, Value::Real(0.3));
        row.set(lower, Value::Real(0.4));
        row.set(taken, "x".into());
        let model = engine.finish(Vec::new());

        let names = column_names(&model.schema);
        let tail: Vec<&str> = names.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["Pset_Width", "Pset_width_2", "Pset_WIDTH_2_2"]);

        let mut conn = Connection::open_in_memory().unwrap();
        let report = load_into(&mut conn, &model, &mut |_| {}).unwrap();
        assert_eq!(report.rows, 1);
        let (upper, lower): (f64, f64) = conn
            .query_row(
                "SELECT Pset_Width, Pset_width_2 FROM Entities WHERE ExpressID = 7",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((upper, lower), (0.3, 0.4));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
