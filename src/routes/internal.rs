// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service-to-service routes.
//!
//! Called by the booking service (referral completion), the scheduler
//! (expiry sweep) and the admin console (wheel setup and stats). Auth is
//! applied in routes/mod.rs.

use crate::error::{AppError, Result};
use crate::models::{ReferralEdge, RewardType, RouletteReward, RouletteStats};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/internal/referrals/complete", post(complete_referral))
        .route("/internal/referrals/expire", post(expire_referrals))
        .route("/internal/roulette/stats", get(get_roulette_stats))
        .route("/internal/roulette/rewards", get(list_rewards))
        .route(
            "/internal/roulette/rewards/{id}",
            put(save_reward).delete(deactivate_reward),
        )
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteReferralRequest {
    #[validate(length(min = 1))]
    pub referred_id: String,
    #[validate(length(min = 1))]
    pub booking_id: String,
}

#[derive(Serialize)]
pub struct CompleteReferralResponse {
    pub completed: bool,
    pub referral: Option<ReferralEdge>,
}

/// Called when a user's first booking is confirmed. Safe to retry.
async fn complete_referral(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompleteReferralRequest>,
) -> Result<Json<CompleteReferralResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let referral = state
        .referrals
        .complete_referral(&body.referred_id, &body.booking_id)
        .await?;

    Ok(Json(CompleteReferralResponse {
        completed: referral.is_some(),
        referral,
    }))
}

#[derive(Serialize)]
pub struct ExpireResponse {
    pub expired: usize,
}

async fn expire_referrals(State(state): State<Arc<AppState>>) -> Result<Json<ExpireResponse>> {
    let expired = state.referrals.expire_stale().await?;
    Ok(Json(ExpireResponse { expired }))
}

async fn get_roulette_stats(State(state): State<Arc<AppState>>) -> Result<Json<RouletteStats>> {
    Ok(Json(state.roulette.stats().await?))
}

async fn list_rewards(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RouletteReward>>> {
    Ok(Json(state.roulette.all_rewards().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RewardRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub reward_type: RewardType,
    #[validate(range(min = 0))]
    pub reward_value: i64,
    pub probability: u32,
    #[validate(length(min = 1, max = 32))]
    pub color: String,
    #[serde(default)]
    pub coupon_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_active() -> bool {
    true
}

/// Create or replace the wheel segment `id`.
async fn save_reward(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RewardRequest>,
) -> Result<Json<RouletteReward>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let reward = RouletteReward {
        id,
        name: body.name,
        reward_type: body.reward_type,
        reward_value: body.reward_value,
        probability: body.probability,
        color: body.color,
        coupon_id: body.coupon_id,
        is_active: body.is_active,
        display_order: body.display_order,
    };
    Ok(Json(state.roulette.save_reward(reward).await?))
}

async fn deactivate_reward(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RouletteReward>> {
    Ok(Json(state.roulette.deactivate_reward(&id).await?))
}
