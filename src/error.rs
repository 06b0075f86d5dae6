use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlateTuneError {
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Malformed JSON in archive entry '{entry}': {source}")]
    Format {
        entry: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed XML in archive entry '{entry}': {message}")]
    Xml { entry: String, message: String },

    #[error("Invalid optimization response: {0}")]
    InvalidResponse(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Text-generation service error: {0}")]
    Service(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlateTuneError>;

impl From<zip::result::ZipError> for PlateTuneError {
    fn from(err: zip::result::ZipError) -> Self {
        PlateTuneError::Archive(err.to_string())
    }
}
