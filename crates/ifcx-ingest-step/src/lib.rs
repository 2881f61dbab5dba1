//! IFC ingestion for ifcx
//!
//! This crate parses IFC files (STEP ISO-10303-21 physical files) and lifts
//! them into the tabular model:
//! - one row per supported building/spatial element,
//! - property set and quantity columns synthesized as `<Set>_<Name>`,
//! - the spatial containment hierarchy as a flattened closure.

pub mod elements;
pub mod lift;
pub mod parser;

use std::collections::HashMap;

use ifcx_model::IdentifierError;
use thiserror::Error;

pub use lift::lift_tabular;
pub use parser::{parse_step, StepEntity, StepFile, StepHeader, StepValue};

#[derive(Debug, Error)]
pub enum StepError {
    #[error("not a STEP physical file: no DATA section")]
    MissingDataSection,

    #[error("entity #{id} ({type_name}) has a malformed GlobalId: {source}")]
    GlobalId {
        id: u64,
        type_name: String,
        #[source]
        source: IdentifierError,
    },
}

// ============================================================================
// Entity table
// ============================================================================

/// Parsed IFC instances, indexed by id and by type.
#[derive(Debug, Clone, Default)]
pub struct IfcModel {
    header: StepHeader,
    entities: HashMap<u64, StepEntity>,
    /// Type name → ids, ascending.
    by_type: HashMap<String, Vec<u64>>,
    skipped: usize,
}

impl IfcModel {
    /// Parse IFC bytes. Non-UTF-8 bytes are replaced; STEP text is ASCII with
    /// escapes for everything else.
    pub fn parse(bytes: &[u8]) -> Result<Self, StepError> {
        let text = String::from_utf8_lossy(bytes);
        let file = parse_step(&text)?;
        Ok(Self::from_step_file(file))
    }

    pub fn from_step_file(file: StepFile) -> Self {
        let StepFile {
            header,
            entities,
            skipped,
        } = file;
        let mut model = Self::from_parts(header, entities);
        model.skipped = skipped;
        model
    }

    /// Build the table from already-parsed instances. A later instance with a
    /// duplicate id replaces the earlier one.
    pub fn from_parts(header: StepHeader, entities: impl IntoIterator<Item = StepEntity>) -> Self {
        let mut map: HashMap<u64, StepEntity> = HashMap::new();
        for entity in entities {
            if let Some(previous) = map.insert(entity.id, entity) {
                tracing::warn!(id = previous.id, "duplicate entity id; keeping the later instance");
            }
        }

        let mut by_type: HashMap<String, Vec<u64>> = HashMap::new();
        for entity in map.values() {
            by_type
                .entry(entity.type_name.clone())
                .or_default()
                .push(entity.id);
        }
        for ids in by_type.values_mut() {
            ids.sort_unstable();
        }

        Self {
            header,
            entities: map,
            by_type,
            skipped: 0,
        }
    }

    pub fn header(&self) -> &StepHeader {
        &self.header
    }

    pub fn get(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    /// Ids of instances with exactly this type, ascending.
    pub fn ids_of_type(&self, type_name: &str) -> &[u64] {
        self.by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Records the parser could not read.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// All instances in ascending id order.
    pub fn sorted_entities(&self) -> Vec<&StepEntity> {
        let mut out: Vec<&StepEntity> = self.entities.values().collect();
        out.sort_unstable_by_key(|e| e.id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_indexes_by_type() {
        let src = b"ISO-10303-21;HEADER;FILE_SCHEMA(('IFC4'));ENDSEC;DATA;\
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'B',$,$,$,$,$);\
#2=IFCWALL('2O2Fr$t4X7Zf8NOew3FLKI',$,'A',$,$,$,$,$);\
#3=IFCSLAB('2O2Fr$t4X7Zf8NOew3FLJJ',$,'S',$,$,$,$,$);\
ENDSEC;END-ISO-10303-21;";
        let model = IfcModel::parse(src).unwrap();
        assert_eq!(model.len(), 3);
        assert_eq!(model.ids_of_type("IFCWALL"), &[2, 5]);
        assert!(model.ids_of_type("IFCDOOR").is_empty());
        assert_eq!(model.header().file_schema, vec!["IFC4".to_string()]);
        assert_eq!(
            model.sorted_entities().iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![2, 3, 5]
        );
    }

    #[test]
    fn test_rejects_non_step_input() {
        assert!(matches!(
            IfcModel::parse(b"hello world"),
            Err(StepError::MissingDataSection)
        ));
    }
}
