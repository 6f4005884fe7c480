// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roulette routes for authenticated users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Page, RouletteReward, RouletteSpinRecord, SpinEligibility, SpinResult};
use crate::routes::PageQuery;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/roulette/rewards", get(get_rewards))
        .route("/api/roulette/eligibility", get(get_eligibility))
        .route("/api/roulette/spin", post(spin))
        .route("/api/roulette/history", get(get_history))
}

async fn get_rewards(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RouletteReward>>> {
    Ok(Json(state.roulette.list_rewards().await?))
}

async fn get_eligibility(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SpinEligibility>> {
    Ok(Json(state.roulette.eligibility(&user.user_id).await?))
}

/// Spin once. Ineligible spins are rejected with 422 and a reason code.
async fn spin(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SpinResult>> {
    Ok(Json(state.roulette.spin(&user.user_id).await?))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Page<RouletteSpinRecord>>> {
    let page = params.page()?;
    Ok(Json(state.roulette.history(&user.user_id, page).await?))
}
