//! ifcx conversion pipeline
//!
//! Plugins are registered as descriptors in a [`Registry`]. A [`Converter`]
//! resolves a decoder/encoder pair for an `(input, output)` format pair,
//! agrees on a shared data shape, and drives:
//!
//! ```text
//! bytes ──► decoder ──► transforms ──► encoder ──► bytes
//!            (0..w)                    (w..1)
//! ```
//!
//! Progress from both phases is folded into one monotone percentage.

pub mod config;
pub mod converter;
pub mod data;
pub mod error;
pub mod plugin;
pub mod plugins;
pub mod progress;
pub mod registry;
pub mod worker;

pub use config::{ConfigError, ConvertConfig};
pub use converter::{detect_format, Converter, Transform};
pub use data::{ConvertData, RAW_IFC, TABULAR};
pub use error::{ConvertError, PluginError};
pub use plugin::{Decoder, DecoderDescriptor, Encoder, EncoderDescriptor, Phase};
pub use progress::{PhaseWeights, ProgressTracker};
pub use registry::{init_global, negotiate, CompatiblePair, Registry};
pub use worker::{worker_descriptor, DecodeWorker, PendingDecode, WorkerEvent};
