use thiserror::Error;

/// Main error type for the decision engine
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    // Grading errors
    #[error("Game not completed: {provider_event_id}")]
    GameNotCompleted { provider_event_id: String },

    #[error("Missing provider event id for event {event_id}")]
    MissingProviderId { event_id: String },

    #[error("Provider mapping drift for event {event_id}: expected {expected}, got {actual}")]
    ProviderMappingDrift {
        event_id: String,
        expected: String,
        actual: String,
    },

    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotency(String),

    // Decision pipeline errors
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Simulation timeout after {elapsed_ms}ms ({completed} of {requested} iterations)")]
    SimTimeout {
        elapsed_ms: u64,
        completed: u32,
        requested: u32,
    },

    #[error("Stale snapshot for event {event_id}: observed {age_secs}s ago")]
    StaleSnapshot { event_id: String, age_secs: i64 },

    // Boundary validation errors
    #[error("Market contract mismatch: {sport} does not allow {market_type}/{market_settlement}")]
    MarketContractMismatch {
        sport: String,
        market_type: String,
        market_settlement: String,
    },

    // Writer matrix violations (programmer error; the worker must not continue)
    #[error("Unauthorized write: {caller} may not write collection {collection}")]
    WriterUnauthorized { caller: String, collection: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the caller should retry this operation on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::GameNotCompleted { .. }
                | EngineError::TransportTimeout(_)
                | EngineError::Http(_)
        )
    }

    /// Process exit code for CLI tooling.
    ///
    /// 0 success, 2 usage, 3 integrity failure, 4 migration failure,
    /// 5 external dependency unavailable.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::IntegrityViolation(_) => 3,
            EngineError::Migration(_) => 4,
            EngineError::Http(_)
            | EngineError::TransportTimeout(_)
            | EngineError::Database(_) => 5,
            _ => 1,
        }
    }
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let err = EngineError::GameNotCompleted {
            provider_event_id: "ext-1".into(),
        };
        assert!(err.is_retryable());

        let err = EngineError::MissingProviderId {
            event_id: "evt-1".into(),
        };
        assert!(!err.is_retryable());

        let err = EngineError::ProviderMappingDrift {
            event_id: "evt-1".into(),
            expected: "Lakers".into(),
            actual: "Los Angeles Lakers".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            EngineError::IntegrityViolation("dup keys".into()).exit_code(),
            3
        );
        assert_eq!(
            EngineError::TransportTimeout("odds provider".into()).exit_code(),
            5
        );
        assert_eq!(EngineError::Internal("boom".into()).exit_code(), 1);
    }
}
