//! Decoder / encoder traits and the descriptors the registry stores.
//!
//! A descriptor is plain data (environments, formats, priority, shape tags)
//! plus a factory. The registry never instantiates a plugin; the converter
//! does, once per conversion.

use std::fmt;
use std::sync::Arc;

use crate::data::ConvertData;

/// Per-phase context handed to a plugin: the negotiated shape tag and the
/// progress sink.
pub struct Phase<'a> {
    shape: &'a str,
    progress: &'a mut dyn FnMut(f64),
}

impl<'a> Phase<'a> {
    pub fn new(shape: &'a str, progress: &'a mut dyn FnMut(f64)) -> Self {
        Self { shape, progress }
    }

    pub fn shape(&self) -> &str {
        self.shape
    }

    /// Report a fraction of this phase's work, clamped to `[0, 1]`.
    pub fn report(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        (self.progress)(fraction);
    }
}

/// Bytes in, pass-through bytes or a structured model out.
pub trait Decoder: Send {
    fn decode(&mut self, input: Vec<u8>, phase: &mut Phase<'_>) -> anyhow::Result<ConvertData>;

    /// Whether decoding to `shape` reports meaningful progress.
    fn emits_progress(&self, _shape: &str) -> bool {
        true
    }
}

/// Decoded data in, output bytes out.
pub trait Encoder: Send {
    fn encode(&mut self, data: ConvertData, phase: &mut Phase<'_>) -> anyhow::Result<Vec<u8>>;

    fn emits_progress(&self, _shape: &str) -> bool {
        true
    }
}

pub type Factory<P> = Arc<dyn Fn() -> Box<P> + Send + Sync>;

/// Capabilities of one plugin plus the factory that builds it.
///
/// `shapes` are the tags a decoder produces or an encoder consumes, in
/// preference order.
pub struct PluginDescriptor<P: ?Sized> {
    pub name: String,
    pub environments: Vec<String>,
    pub formats: Vec<String>,
    pub priority: i32,
    pub shapes: Vec<String>,
    factory: Factory<P>,
}

pub type DecoderDescriptor = PluginDescriptor<dyn Decoder>;
pub type EncoderDescriptor = PluginDescriptor<dyn Encoder>;

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl<P: ?Sized> PluginDescriptor<P> {
    pub fn from_factory(name: impl Into<String>, factory: Factory<P>) -> Self {
        Self {
            name: name.into(),
            environments: Vec::new(),
            formats: Vec::new(),
            priority: 0,
            shapes: Vec::new(),
            factory,
        }
    }

    pub fn environments(mut self, environments: &[&str]) -> Self {
        self.environments = owned(environments);
        self
    }

    pub fn formats(mut self, formats: &[&str]) -> Self {
        self.formats = owned(formats);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn supports(&self, env: &str, format: &str) -> bool {
        self.environments.iter().any(|e| e == env) && self.formats.iter().any(|f| f == format)
    }

    pub fn factory(&self) -> Factory<P> {
        Arc::clone(&self.factory)
    }

    pub fn instantiate(&self) -> Box<P> {
        (self.factory)()
    }
}

impl DecoderDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        Self::from_factory(name, Arc::new(factory))
    }

    pub fn produces(mut self, shapes: &[&str]) -> Self {
        self.shapes = owned(shapes);
        self
    }
}

impl EncoderDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
    {
        Self::from_factory(name, Arc::new(factory))
    }

    pub fn consumes(mut self, shapes: &[&str]) -> Self {
        self.shapes = owned(shapes);
        self
    }
}

impl<P: ?Sized> Clone for PluginDescriptor<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            environments: self.environments.clone(),
            formats: self.formats.clone(),
            priority: self.priority,
            shapes: self.shapes.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<P: ?Sized> fmt::Debug for PluginDescriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("environments", &self.environments)
            .field("formats", &self.formats)
            .field("priority", &self.priority)
            .field("shapes", &self.shapes)
            .finish_non_exhaustive()
    }
}
