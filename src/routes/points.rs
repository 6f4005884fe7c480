// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Points balance and ledger history.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{LedgerEntry, Page, PointBalance};
use crate::routes::PageQuery;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;

const LEDGER_PAGE_SIZE: u32 = 20;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/points/balance", get(get_balance))
        .route("/api/points/history", get(get_history))
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PointBalance>> {
    Ok(Json(state.ledger.balance_summary(&user.user_id).await?))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Page<LedgerEntry>>> {
    let page = params.page()?;
    Ok(Json(
        state
            .ledger
            .history(&user.user_id, page, LEDGER_PAGE_SIZE)
            .await?,
    ))
}
