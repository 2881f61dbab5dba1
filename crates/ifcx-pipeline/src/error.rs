use ifcx_model::IdentifierError;
use thiserror::Error;

/// Opaque plugin failure, source chain intact.
pub type PluginError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("no decoder registered for format `{format}` in environment `{env}`")]
    NoReaderFound { format: String, env: String },

    #[error("no encoder registered for format `{format}` in environment `{env}`")]
    NoWriterFound { format: String, env: String },

    #[error("no compatible decoder/encoder for {input} -> {output} in environment `{env}`")]
    NoCompatiblePair {
        input: String,
        output: String,
        env: String,
    },

    #[error("decoder `{decoder}` failed")]
    DecodeFailure {
        decoder: String,
        #[source]
        source: PluginError,
    },

    #[error("encoder `{encoder}` failed")]
    EncodeFailure {
        encoder: String,
        #[source]
        source: PluginError,
    },

    #[error("transform #{index} failed")]
    TransformFailure {
        index: usize,
        #[source]
        source: PluginError,
    },

    #[error("cannot detect the format of `{0}`: no file extension")]
    UnknownFormat(String),
}
