use anyhow::Context;

use ifcx_ingest_step::{lift_tabular, IfcModel};

use crate::data::{ConvertData, RAW_IFC, TABULAR};
use crate::plugin::{Decoder, DecoderDescriptor, Phase};

/// IFC STEP decoder. Produces the tabular model, or hands the bytes through
/// untouched when the encoder wants raw IFC.
#[derive(Debug, Default)]
pub struct IfcDecoder;

impl Decoder for IfcDecoder {
    fn decode(&mut self, input: Vec<u8>, phase: &mut Phase<'_>) -> anyhow::Result<ConvertData> {
        if phase.shape() == RAW_IFC {
            return Ok(ConvertData::Bytes(input));
        }

        let model = IfcModel::parse(&input).context("parsing IFC")?;
        tracing::debug!(
            entities = model.len(),
            skipped = model.skipped(),
            schema = ?model.header().file_schema,
            "parsed IFC"
        );
        let tabular = lift_tabular(&model, &mut |p| phase.report(p))?;
        Ok(ConvertData::Tabular(tabular))
    }

    fn emits_progress(&self, shape: &str) -> bool {
        shape != RAW_IFC
    }
}

pub fn descriptor() -> DecoderDescriptor {
    DecoderDescriptor::new("ifc", || Box::new(IfcDecoder))
        .environments(&["native"])
        .formats(&["ifc"])
        .priority(10)
        .produces(&[TABULAR, RAW_IFC])
}
