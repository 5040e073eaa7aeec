use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorldError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown event type '{event_type}'")]
    UnknownEventType { event_type: String },

    #[error("District '{district_id}' is not registered")]
    UnknownDistrict { district_id: String },

    #[error("Reputation target {target_type}:{target_id} is not registered")]
    UnknownTarget { target_type: String, target_id: String },

    #[error("Player '{player_id}' is not registered")]
    UnknownPlayer { player_id: String },

    #[error("Severity {severity} outside 1..=10")]
    InvalidSeverity { severity: i64 },

    #[error("Malformed reputation changes: {reason}")]
    MalformedChanges { reason: String },

    #[error("Lock poisoned: {what}")]
    LockPoisoned { what: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type WorldResult<T> = Result<T, WorldError>;
