// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Referral routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Page, ReferralEdge, ReferralStats};
use crate::routes::PageQuery;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/referrals/code", get(get_code))
        .route("/api/referrals/apply", post(apply_code))
        .route("/api/referrals/stats", get(get_stats))
        .route("/api/referrals/history", get(get_history))
        .route("/api/referrals/pending", get(get_pending))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReferralCodeResponse {
    pub code: String,
    pub share_url: String,
}

/// The caller's referral code, created on first request.
async fn get_code(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ReferralCodeResponse>> {
    let code = state.referrals.ensure_code(&user.user_id).await?;
    let share_url = state.referrals.share_url(&code.code);
    Ok(Json(ReferralCodeResponse {
        code: code.code,
        share_url,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCodeRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Serialize)]
pub struct ApplyCodeResponse {
    pub success: bool,
    pub message: String,
    pub referral: ReferralEdge,
}

/// Apply someone else's code to the caller's account.
async fn apply_code(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ApplyCodeRequest>,
) -> Result<Json<ApplyCodeResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let referral = state
        .referrals
        .record_referral(&body.code, &user.user_id)
        .await?;

    Ok(Json(ApplyCodeResponse {
        success: true,
        message: "Referral code applied. Rewards are paid after your first booking.".to_string(),
        referral,
    }))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ReferralStats>> {
    Ok(Json(state.referrals.stats(&user.user_id).await?))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Page<ReferralEdge>>> {
    let page = params.page()?;
    Ok(Json(state.referrals.history(&user.user_id, page).await?))
}

#[derive(Serialize)]
pub struct PendingReferralResponse {
    /// Whether the caller ever applied a referral code
    pub was_referred: bool,
    /// The caller's referral if it still awaits their first booking
    pub referral: Option<ReferralEdge>,
}

async fn get_pending(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PendingReferralResponse>> {
    let was_referred = state.referrals.received(&user.user_id).await?.is_some();
    let referral = state.referrals.pending_for(&user.user_id).await?;
    Ok(Json(PendingReferralResponse {
        was_referred,
        referral,
    }))
}
