//! Capability registry
//!
//! Append-only lists of decoder and encoder descriptors. Lookups filter by
//! environment and format and order candidates by descending priority; the
//! sort is stable so equal priorities keep registration order.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::config::ConvertConfig;
use crate::plugin::{DecoderDescriptor, EncoderDescriptor, PluginDescriptor};

/// A decoder and encoder that agree on a shape tag.
#[derive(Debug, Clone)]
pub struct CompatiblePair {
    pub decoder: DecoderDescriptor,
    pub encoder: EncoderDescriptor,
    pub shape: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    decoders: RwLock<Vec<DecoderDescriptor>>,
    encoders: RwLock<Vec<EncoderDescriptor>>,
}

fn candidates<P: ?Sized>(
    list: &[PluginDescriptor<P>],
    env: &str,
    format: &str,
) -> Vec<PluginDescriptor<P>> {
    let mut matches: Vec<PluginDescriptor<P>> = list
        .iter()
        .filter(|d| d.supports(env, format))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.priority.cmp(&a.priority));
    matches
}

/// First (decoder, encoder, shape) in nested priority order: decoders outer,
/// encoders inner, shape = first tag of the decoder's list the encoder
/// consumes.
pub fn negotiate(
    decoders: &[DecoderDescriptor],
    encoders: &[EncoderDescriptor],
) -> Option<CompatiblePair> {
    for decoder in decoders {
        for encoder in encoders {
            let shared = decoder
                .shapes
                .iter()
                .find(|shape| encoder.shapes.contains(shape));
            if let Some(shape) = shared {
                return Some(CompatiblePair {
                    decoder: decoder.clone(),
                    encoder: encoder.clone(),
                    shape: shape.clone(),
                });
            }
        }
    }
    None
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in plugins for `config`.
    pub fn with_builtins(config: &ConvertConfig) -> Self {
        let registry = Self::new();
        crate::plugins::register_builtins(&registry, config);
        registry
    }

    /// Add a decoder. Duplicates are allowed and simply add a candidate.
    pub fn register_decoder(&self, descriptor: DecoderDescriptor) {
        tracing::debug!(
            name = %descriptor.name,
            formats = ?descriptor.formats,
            priority = descriptor.priority,
            "registered decoder"
        );
        self.decoders.write().push(descriptor);
    }

    pub fn register_encoder(&self, descriptor: EncoderDescriptor) {
        tracing::debug!(
            name = %descriptor.name,
            formats = ?descriptor.formats,
            priority = descriptor.priority,
            "registered encoder"
        );
        self.encoders.write().push(descriptor);
    }

    /// Snapshot of every registered decoder, in registration order.
    pub fn decoders(&self) -> Vec<DecoderDescriptor> {
        self.decoders.read().clone()
    }

    pub fn encoders(&self) -> Vec<EncoderDescriptor> {
        self.encoders.read().clone()
    }

    pub fn decoder_candidates(&self, env: &str, format: &str) -> Vec<DecoderDescriptor> {
        candidates(&self.decoders.read(), env, format)
    }

    pub fn encoder_candidates(&self, env: &str, format: &str) -> Vec<EncoderDescriptor> {
        candidates(&self.encoders.read(), env, format)
    }

    pub fn find_decoder(&self, env: &str, format: &str) -> Option<DecoderDescriptor> {
        self.decoder_candidates(env, format).into_iter().next()
    }

    pub fn find_encoder(&self, env: &str, format: &str) -> Option<EncoderDescriptor> {
        self.encoder_candidates(env, format).into_iter().next()
    }

    pub fn find_compatible_pair(
        &self,
        env: &str,
        input_format: &str,
        output_format: &str,
    ) -> Option<CompatiblePair> {
        negotiate(
            &self.decoder_candidates(env, input_format),
            &self.encoder_candidates(env, output_format),
        )
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Process-wide registry, created with the built-in plugins on first call.
pub fn init_global() -> Arc<Registry> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::with_builtins(&ConvertConfig::default()))))
}
