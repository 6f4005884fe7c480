// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// A request the engines refuse for a business reason.
///
/// Nothing is written when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Not enough points")]
    InsufficientPoints,

    #[error("Daily spin limit reached")]
    DailyLimitReached,

    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("Referral limit reached")]
    ReferralLimitReached,

    #[error("Already referred")]
    AlreadyReferred,

    #[error("Invalid month")]
    InvalidMonth,
}

impl Rejection {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InsufficientPoints => "insufficient_points",
            Rejection::DailyLimitReached => "daily_limit_reached",
            Rejection::InvalidReferralCode => "invalid_referral_code",
            Rejection::SelfReferral => "self_referral",
            Rejection::ReferralLimitReached => "referral_limit_reached",
            Rejection::AlreadyReferred => "already_referred",
            Rejection::InvalidMonth => "invalid_month",
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient failure; the client may retry.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("No roulette rewards are configured")]
    NoRewardsConfigured,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            StoreError::SchemaMissing(collection) => {
                AppError::ServiceUnavailable(format!("{} is not provisioned", collection))
            }
            StoreError::Conflict => AppError::Conflict("Concurrent update".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Rejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                reason.code(),
                Some(reason.to_string()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", None)
            }
            AppError::NoRewardsConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_rewards",
                Some(self.to_string()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
