use anyhow::{bail, Context};

use ifcx_ingest_step::{lift_tabular, IfcModel};
use ifcx_storage::{decode_frag, encode_frag};

use crate::data::{ConvertData, RAW_IFC, TABULAR};
use crate::plugin::{Decoder, DecoderDescriptor, Encoder, EncoderDescriptor, Phase};

/// Reads a `.frag` file back into the tabular model.
#[derive(Debug, Default)]
pub struct FragDecoder;

impl Decoder for FragDecoder {
    fn decode(&mut self, input: Vec<u8>, phase: &mut Phase<'_>) -> anyhow::Result<ConvertData> {
        let model = decode_frag(&input).context("reading .frag")?;
        let tabular = lift_tabular(&model, &mut |p| phase.report(p))?;
        Ok(ConvertData::Tabular(tabular))
    }
}

/// Writes raw IFC bytes as a verified `.frag` file.
#[derive(Debug, Default)]
pub struct FragEncoder;

impl Encoder for FragEncoder {
    fn encode(&mut self, data: ConvertData, phase: &mut Phase<'_>) -> anyhow::Result<Vec<u8>> {
        let kind = data.kind();
        let Some(bytes) = data.into_bytes() else {
            bail!("frag encoder needs raw IFC bytes, got {kind}");
        };
        phase.report(0.0);
        let model = IfcModel::parse(&bytes).context("parsing IFC")?;
        phase.report(0.5);
        let out = encode_frag(&model)?;
        phase.report(1.0);
        Ok(out)
    }
}

pub fn decoder_descriptor() -> DecoderDescriptor {
    DecoderDescriptor::new("frag", || Box::new(FragDecoder))
        .environments(&["native"])
        .formats(&["frag"])
        .priority(10)
        .produces(&[TABULAR])
}

pub fn encoder_descriptor() -> EncoderDescriptor {
    EncoderDescriptor::new("frag", || Box::new(FragEncoder))
        .environments(&["native"])
        .formats(&["frag"])
        .priority(10)
        .consumes(&[RAW_IFC])
}
