use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispenserError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Prize '{prize_id}' not found")]
    UnknownPrize { prize_id: String },

    #[error("Persistence worker is no longer running")]
    PersistenceClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispenserError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig { reason: reason.into() }
    }
}

pub type DispenserResult<T> = Result<T, DispenserError>;
