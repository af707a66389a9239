use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayCreatorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("entity error: {0}")]
    Entity(#[from] waddle_sessions::SessionError),

    #[error("onboarding message delivery failed: {0}")]
    Onboarding(#[from] waddle_channels::ChannelError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no gateway registered for entity '{0}'")]
    GatewayNotFound(String),
}

pub type Result<T> = std::result::Result<T, GatewayCreatorError>;
