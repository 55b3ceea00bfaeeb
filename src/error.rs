use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum DewPointError {
    #[error("Config entry not found: {0}")]
    EntryNotFound(String),

    #[error("Config entry already exists for {0}")]
    DuplicateEntry(String),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DewPointError>;
