use anyhow::bail;

use ifcx_storage::write_sqlite;

use crate::data::{ConvertData, TABULAR};
use crate::plugin::{Encoder, EncoderDescriptor, Phase};

/// Writes the tabular model as an `Entities` + `Hierarchy` SQLite database.
#[derive(Debug, Default)]
pub struct SqliteEncoder;

impl Encoder for SqliteEncoder {
    fn encode(&mut self, data: ConvertData, phase: &mut Phase<'_>) -> anyhow::Result<Vec<u8>> {
        let kind = data.kind();
        let Some(model) = data.into_tabular() else {
            bail!("SQLite encoder needs the tabular model, got {kind}");
        };
        let (bytes, report) = write_sqlite(&model, &mut |p| phase.report(p))?;
        tracing::info!(
            rows = report.rows,
            relations = report.relations,
            skipped_relations = report.skipped_relations,
            "SQLite database written"
        );
        Ok(bytes)
    }
}

pub fn descriptor() -> EncoderDescriptor {
    EncoderDescriptor::new("sqlite", || Box::new(SqliteEncoder))
        .environments(&["native"])
        .formats(&["db", "db3", "sqlite", "sqlite3"])
        .priority(10)
        .consumes(&[TABULAR])
}
