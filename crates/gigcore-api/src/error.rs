use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gigcore_core::error::CoreError;
use serde::Serialize;

/// Wraps `CoreError` so it can be returned directly from a handler. No
/// variant here is reinterpreted — the status mapping only picks the HTTP
/// family, the `code()`/`Display` pair is what callers should key off of.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = if self.0.is_noop_success() {
            StatusCode::OK
        } else {
            match &self.0 {
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Forbidden => StatusCode::FORBIDDEN,
                CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
                CoreError::SignatureVerificationFailed => StatusCode::BAD_REQUEST,
                CoreError::Serialization(_) => StatusCode::BAD_REQUEST,
                CoreError::VersionConflict
                | CoreError::InvalidState(_)
                | CoreError::InvalidTransition(_)
                | CoreError::TaskTerminal
                | CoreError::EscrowTerminal
                | CoreError::DisputeTerminal
                | CoreError::ProofTerminal
                | CoreError::ProofVerifierRejected { .. }
                | CoreError::SupplyLocked
                | CoreError::SupplyMax
                | CoreError::SupplyDuplicate
                | CoreError::SupplyCooldown
                | CoreError::SupplyWaitlisted { .. }
                | CoreError::CorrectionScopeViolation
                | CoreError::DuplicateOutboxKey => StatusCode::CONFLICT,
                CoreError::XpRequiresReleasedEscrow
                | CoreError::ReleaseRequiresTaskCompleted
                | CoreError::CompletionRequiresAcceptedProof
                | CoreError::EscrowAmountImmutable
                | CoreError::DuplicateXpLedgerRow
                | CoreError::InvalidProgressTransition
                | CoreError::AppendOnlyViolation
                | CoreError::MaxActiveExpertiseExceeded => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::ExternalUnavailable(_) | CoreError::CircuitOpen(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CoreError::Storage(_) | CoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CoreError::BudgetExhausted(_) | CoreError::SafeMode => StatusCode::OK,
            }
        };
        let body = ErrorBody {
            code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
