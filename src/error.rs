//! API error envelope: maps core failures onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::chain::ChainError;
use crate::scope::GateError;
use crate::scorer::ScorerError;

/// HTTP-facing error. Always rendered as a JSON body with an `error` field
/// plus whatever structured detail the failure class carries.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!({ "error": msg.into() }))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, json!({ "error": msg.into() }))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": msg.into() }),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match &err {
            ChainError::NoGenesis => Self::internal(err.to_string()),
            ChainError::NotFound { .. } => Self::not_found(err.to_string()),
            ChainError::Inactive { reason, .. } => Self::new(
                StatusCode::FORBIDDEN,
                json!({ "error": err.to_string(), "reason": reason }),
            ),
            ChainError::SignerMismatch | ChainError::SignatureRejected { .. } => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match &err {
            GateError::PayloadTooLarge {
                category,
                count,
                max,
            } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": err.to_string(),
                    "category": category,
                    "count": count,
                    "max": max,
                }),
            ),
            GateError::ScopeViolation {
                disallowed,
                permitted,
            } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": err.to_string(),
                    "disallowed": disallowed,
                    "allowed": permitted,
                }),
            ),
        }
    }
}

impl From<ScorerError> for ApiError {
    fn from(err: ScorerError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, json!({ "error": err.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InactiveReason;
    use crate::scope::SignalCategory;
    use std::collections::BTreeSet;

    #[test]
    fn inactive_consent_maps_to_forbidden() {
        let api: ApiError = ChainError::Inactive {
            consent_id: "c1".to_string(),
            reason: InactiveReason::Revoked,
        }
        .into();
        assert_eq!(api.status(), StatusCode::FORBIDDEN);
        assert_eq!(api.body["reason"], "revoked");
    }

    #[test]
    fn unknown_consent_maps_to_not_found() {
        let api: ApiError = ChainError::NotFound {
            consent_id: "c1".to_string(),
        }
        .into();
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn scope_violation_names_categories() {
        let mut disallowed = BTreeSet::new();
        disallowed.insert(SignalCategory::Ecom);
        let mut permitted = BTreeSet::new();
        permitted.insert(SignalCategory::Sms);
        let api: ApiError = GateError::ScopeViolation {
            disallowed,
            permitted,
        }
        .into();
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.body["disallowed"][0], "ecom");
        assert_eq!(api.body["allowed"][0], "sms");
    }

    #[test]
    fn oversized_payload_is_unprocessable() {
        let api: ApiError = GateError::PayloadTooLarge {
            category: SignalCategory::Sms,
            count: 2001,
            max: 2000,
        }
        .into();
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.body["category"], "sms");
    }

    #[test]
    fn scorer_failures_are_gateway_errors() {
        let api: ApiError = ScorerError::Transport("timed out".to_string()).into();
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        let api: ApiError = ScorerError::NotConfigured.into();
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
    }
}
