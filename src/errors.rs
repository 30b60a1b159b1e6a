use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Overlay surface error: {0}")]
    Surface(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Detection data decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Event channel closed")]
    ChannelClosed,
}

impl serde::Serialize for OverlayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type OverlayResult<T> = Result<T, OverlayError>;
