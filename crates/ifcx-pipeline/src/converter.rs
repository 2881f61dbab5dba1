//! Conversion orchestrator
//!
//! One call runs resolve → decode → transforms → encode, strictly in that
//! order. Lookup failures surface before any plugin is instantiated; plugin
//! errors are wrapped with the plugin's name and passed up without retry.

use std::path::Path;
use std::sync::Arc;

use crate::config::{default_environment, ConvertConfig};
use crate::data::ConvertData;
use crate::error::ConvertError;
use crate::plugin::{DecoderDescriptor, EncoderDescriptor, Phase};
use crate::progress::{PhaseWeights, ProgressTracker};
use crate::registry::{negotiate, CompatiblePair, Registry};

pub type Transform = Box<dyn Fn(ConvertData) -> anyhow::Result<ConvertData> + Send + Sync>;

/// Lowercase file extension of `path`.
pub fn detect_format(path: &Path) -> Result<String, ConvertError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ConvertError::UnknownFormat(path.display().to_string()))
}

pub struct Converter {
    env: String,
    registry: Arc<Registry>,
    forced_decoder: Option<DecoderDescriptor>,
    forced_encoder: Option<EncoderDescriptor>,
    transforms: Vec<Transform>,
    weights: PhaseWeights,
}

impl Converter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            env: default_environment().to_string(),
            registry,
            forced_decoder: None,
            forced_encoder: None,
            transforms: Vec::new(),
            weights: PhaseWeights::default(),
        }
    }

    pub fn from_config(registry: Arc<Registry>, config: &ConvertConfig) -> Self {
        Self::new(registry)
            .with_env(&config.environment)
            .with_weights(config.weights())
    }

    pub fn with_env(mut self, env: &str) -> Self {
        self.env = env.to_string();
        self
    }

    pub fn with_weights(mut self, weights: PhaseWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Always use this decoder, whatever the input format.
    pub fn with_decoder(mut self, descriptor: DecoderDescriptor) -> Self {
        self.forced_decoder = Some(descriptor);
        self
    }

    /// Always use this encoder, whatever the output format.
    pub fn with_encoder(mut self, descriptor: EncoderDescriptor) -> Self {
        self.forced_encoder = Some(descriptor);
        self
    }

    /// Append a transform; transforms run in the order they were added.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(ConvertData) -> anyhow::Result<ConvertData> + Send + Sync + 'static,
    {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Pick the decoder, encoder and shared shape for a conversion.
    pub fn resolve(
        &self,
        input_format: &str,
        output_format: &str,
    ) -> Result<CompatiblePair, ConvertError> {
        let decoders = match &self.forced_decoder {
            Some(forced) => vec![forced.clone()],
            None => self.registry.decoder_candidates(&self.env, input_format),
        };
        if decoders.is_empty() {
            return Err(ConvertError::NoReaderFound {
                format: input_format.to_string(),
                env: self.env.clone(),
            });
        }

        let encoders = match &self.forced_encoder {
            Some(forced) => vec![forced.clone()],
            None => self.registry.encoder_candidates(&self.env, output_format),
        };
        if encoders.is_empty() {
            return Err(ConvertError::NoWriterFound {
                format: output_format.to_string(),
                env: self.env.clone(),
            });
        }

        negotiate(&decoders, &encoders).ok_or_else(|| ConvertError::NoCompatiblePair {
            input: input_format.to_string(),
            output: output_format.to_string(),
            env: self.env.clone(),
        })
    }

    /// Convert `input` from `input_format` to `output_format`.
    ///
    /// `progress` receives whole percentages, each strictly greater than the
    /// last, ending with 100 on success.
    pub fn convert(
        &self,
        input: Vec<u8>,
        input_format: &str,
        output_format: &str,
        progress: &mut dyn FnMut(u32),
    ) -> Result<Vec<u8>, ConvertError> {
        let pair = self.resolve(input_format, output_format)?;
        tracing::info!(
            decoder = %pair.decoder.name,
            encoder = %pair.encoder.name,
            shape = %pair.shape,
            env = %self.env,
            "resolved conversion"
        );

        let mut decoder = pair.decoder.instantiate();
        let mut encoder = pair.encoder.instantiate();
        let weights = self.weights.negotiate(
            decoder.emits_progress(&pair.shape),
            encoder.emits_progress(&pair.shape),
        );
        let mut tracker = ProgressTracker::new(progress);

        let mut data = {
            let mut report = |p: f64| tracker.emit(weights.decoder_progress(p));
            let mut phase = Phase::new(&pair.shape, &mut report);
            decoder
                .decode(input, &mut phase)
                .map_err(|source| ConvertError::DecodeFailure {
                    decoder: pair.decoder.name.clone(),
                    source: source.into(),
                })?
        };
        tracing::debug!(kind = data.kind(), "decoded");

        for (index, transform) in self.transforms.iter().enumerate() {
            data = transform(data).map_err(|source| ConvertError::TransformFailure {
                index,
                source: source.into(),
            })?;
        }

        let output = {
            let mut report = |p: f64| tracker.emit(weights.encoder_progress(p));
            let mut phase = Phase::new(&pair.shape, &mut report);
            encoder
                .encode(data, &mut phase)
                .map_err(|source| ConvertError::EncodeFailure {
                    encoder: pair.encoder.name.clone(),
                    source: source.into(),
                })?
        };
        tracker.emit(1.0);
        tracing::debug!(bytes = output.len(), "encoded");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RAW_IFC, TABULAR};
    use crate::plugin::{Decoder, Encoder};
    use ifcx_model::{ColumnType, TabularModel};
    use std::sync::Mutex;

    /// Replays a fixed progress script, then returns an empty tabular model.
    struct Scripted(Vec<f64>);

    impl Decoder for Scripted {
        fn decode(&mut self, _: Vec<u8>, phase: &mut Phase<'_>) -> anyhow::Result<ConvertData> {
            for &p in &self.0 {
                phase.report(p);
            }
            Ok(ConvertData::Tabular(TabularModel::default()))
        }
    }

    struct Passthrough;

    impl Decoder for Passthrough {
        fn decode(&mut self, input: Vec<u8>, _: &mut Phase<'_>) -> anyhow::Result<ConvertData> {
            Ok(ConvertData::Bytes(input))
        }

        fn emits_progress(&self, _: &str) -> bool {
            false
        }
    }

    /// Reports 0, ½, 1 and writes the column names.
    struct Columns;

    impl Encoder for Columns {
        fn encode(&mut self, data: ConvertData, phase: &mut Phase<'_>) -> anyhow::Result<Vec<u8>> {
            phase.report(0.0);
            phase.report(0.5);
            let names = match data {
                ConvertData::Tabular(model) => model.column_names().collect::<Vec<_>>().join(","),
                ConvertData::Bytes(bytes) => format!("{} bytes", bytes.len()),
            };
            phase.report(1.0);
            Ok(names.into_bytes())
        }
    }

    struct Failing;

    impl Encoder for Failing {
        fn encode(&mut self, _: ConvertData, _: &mut Phase<'_>) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("disk full")
        }
    }

    fn registry_with(decoder: DecoderDescriptor, encoder: EncoderDescriptor) -> Arc<Registry> {
        let registry = Registry::new();
        registry.register_decoder(decoder);
        registry.register_encoder(encoder);
        Arc::new(registry)
    }

    fn scripted(script: &[f64]) -> DecoderDescriptor {
        let script = script.to_vec();
        DecoderDescriptor::new("scripted", move || Box::new(Scripted(script.clone())))
            .environments(&["native"])
            .formats(&["in"])
            .produces(&[TABULAR])
    }

    fn columns() -> EncoderDescriptor {
        EncoderDescriptor::new("columns", || Box::new(Columns))
            .environments(&["native"])
            .formats(&["out"])
            .consumes(&[TABULAR, RAW_IFC])
    }

    #[test]
    fn test_progress_weighting_and_dedup() {
        let registry = registry_with(scripted(&[0.1, 0.12, 0.5, 1.0]), columns());
        let converter = Converter::new(registry).with_env("native");

        let mut seen = Vec::new();
        converter
            .convert(Vec::new(), "in", "out", &mut |p| seen.push(p))
            .unwrap();
        // The encoder's 0.0 lands on 50, already reported.
        assert_eq!(seen, vec![5, 6, 25, 50, 75, 100]);
    }

    #[test]
    fn test_silent_decoder_gives_encoder_the_whole_bar() {
        let decoder = DecoderDescriptor::new("pass", || Box::new(Passthrough))
            .environments(&["native"])
            .formats(&["in"])
            .produces(&[RAW_IFC]);
        let converter = Converter::new(registry_with(decoder, columns())).with_env("native");

        let mut seen = Vec::new();
        let out = converter
            .convert(vec![1, 2, 3], "in", "out", &mut |p| seen.push(p))
            .unwrap();
        assert_eq!(out, b"3 bytes");
        assert_eq!(seen, vec![0, 50, 100]);
    }

    #[test]
    fn test_lookup_errors_in_order() {
        let converter = Converter::new(registry_with(scripted(&[]), columns())).with_env("native");
        let mut ignore = |_: u32| {};

        assert!(matches!(
            converter.convert(Vec::new(), "nope", "out", &mut ignore),
            Err(ConvertError::NoReaderFound { .. })
        ));
        assert!(matches!(
            converter.convert(Vec::new(), "in", "nope", &mut ignore),
            Err(ConvertError::NoWriterFound { .. })
        ));

        let other_env = Converter::new(registry_with(scripted(&[]), columns())).with_env("wasm");
        assert!(matches!(
            other_env.convert(Vec::new(), "in", "out", &mut ignore),
            Err(ConvertError::NoReaderFound { .. })
        ));

        let raw_only = EncoderDescriptor::new("raw", || Box::new(Columns))
            .environments(&["native"])
            .formats(&["out"])
            .consumes(&[RAW_IFC]);
        let converter = Converter::new(registry_with(scripted(&[]), raw_only)).with_env("native");
        assert!(matches!(
            converter.convert(Vec::new(), "in", "out", &mut ignore),
            Err(ConvertError::NoCompatiblePair { .. })
        ));
    }

    #[test]
    fn test_transforms_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (Arc::clone(&order), Arc::clone(&order));

        let converter = Converter::new(registry_with(scripted(&[]), columns()))
            .with_env("native")
            .with_transform(move |mut data| {
                first.lock().unwrap().push(1);
                if let Some(model) = data.as_tabular_mut() {
                    model.add_column("A", ColumnType::Text);
                }
                Ok(data)
            })
            .with_transform(move |mut data| {
                second.lock().unwrap().push(2);
                if let Some(model) = data.as_tabular_mut() {
                    model.add_column("B", ColumnType::Integer);
                }
                Ok(data)
            });

        let out = converter.convert(Vec::new(), "in", "out", &mut |_| {}).unwrap();
        assert_eq!(out, b"A,B");
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_plugin_errors_keep_their_source() {
        let failing = EncoderDescriptor::new("failing", || Box::new(Failing))
            .environments(&["native"])
            .formats(&["out"])
            .consumes(&[TABULAR]);
        let converter = Converter::new(registry_with(scripted(&[]), failing)).with_env("native");

        let err = converter
            .convert(Vec::new(), "in", "out", &mut |_| {})
            .unwrap_err();
        match err {
            ConvertError::EncodeFailure { encoder, source } => {
                assert_eq!(encoder, "failing");
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_plugins_bypass_format_lookup() {
        let registry = Arc::new(Registry::new());
        let converter = Converter::new(registry)
            .with_env("native")
            .with_decoder(scripted(&[]))
            .with_encoder(columns());
        let pair = converter.resolve("anything", "whatever").unwrap();
        assert_eq!(pair.decoder.name, "scripted");
        assert_eq!(pair.shape, TABULAR);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("model.IFC")).unwrap(), "ifc");
        assert_eq!(detect_format(Path::new("/tmp/out.tar.db")).unwrap(), "db");
        assert!(matches!(
            detect_format(Path::new("README")),
            Err(ConvertError::UnknownFormat(_))
        ));
    }
}
