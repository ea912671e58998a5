pub mod decisions;
pub mod grading;
pub mod parlay;
pub mod simulations;
pub mod system;

pub use decisions::*;
pub use grading::*;
pub use parlay::*;
pub use simulations::*;
pub use system::*;

use axum::http::StatusCode;
use axum::Json;

use crate::api::types::ErrorBody;
use crate::error::EngineError;

/// Map engine errors to structured HTTP responses.
pub(crate) fn error_response(err: EngineError) -> (StatusCode, Json<ErrorBody>) {
    let (status, error_code) = match &err {
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        EngineError::GameNotCompleted { .. } => (StatusCode::CONFLICT, "GAME_NOT_COMPLETED"),
        EngineError::MissingProviderId { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "PROVIDER_ID_MISSING")
        }
        EngineError::ProviderMappingDrift { .. } => {
            (StatusCode::CONFLICT, "PROVIDER_MAPPING_DRIFT")
        }
        EngineError::MarketContractMismatch { .. } => {
            (StatusCode::CONFLICT, "MARKET_CONTRACT_MISMATCH")
        }
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
        EngineError::IntegrityViolation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY_VIOLATION")
        }
        EngineError::DuplicateIdempotency(_) => (StatusCode::OK, "DUPLICATE_NOOP"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };
    let request_context = match &err {
        EngineError::MarketContractMismatch {
            sport,
            market_type,
            market_settlement,
        } => Some(serde_json::json!({
            "sport": sport,
            "market_type": market_type,
            "market_settlement": market_settlement,
        })),
        _ => None,
    };
    (
        status,
        Json(ErrorBody {
            error_code: error_code.to_string(),
            message: err.to_string(),
            request_context,
        }),
    )
}
