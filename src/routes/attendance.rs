// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Attendance routes for authenticated users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{
    AttendanceRecord, AttendanceResult, AttendanceStats, MonthlyAttendance, NextMilestone, Page,
};
use crate::routes::PageQuery;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/attendance/check-in", post(check_in))
        .route("/api/attendance/monthly", get(get_monthly))
        .route("/api/attendance/stats", get(get_stats))
        .route("/api/attendance/today", get(get_today))
        .route("/api/attendance/history", get(get_history))
}

/// Check in for today. Repeated calls return the stored result.
async fn check_in(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AttendanceResult>> {
    Ok(Json(state.attendance.check_in(&user.user_id).await?))
}

#[derive(Deserialize)]
struct MonthlyQuery {
    /// Defaults to the current year
    year: Option<i32>,
    /// 1-12, defaults to the current month
    month: Option<u32>,
}

async fn get_monthly(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<MonthlyQuery>,
) -> Result<Json<Vec<MonthlyAttendance>>> {
    let today = state.clock.today();
    let year = params.year.unwrap_or(today.year());
    let month = params.month.unwrap_or(today.month());

    Ok(Json(
        state.attendance.monthly(&user.user_id, year, month).await?,
    ))
}

/// Stats plus the distance to the next streak milestone.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AttendanceStatsResponse {
    #[serde(flatten)]
    pub stats: AttendanceStats,
    pub next_milestone: Option<NextMilestone>,
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AttendanceStatsResponse>> {
    let stats = state.attendance.stats(&user.user_id).await?;
    let next_milestone = state.attendance.next_milestone(stats.current_streak);
    Ok(Json(AttendanceStatsResponse {
        stats,
        next_milestone,
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TodayResponse {
    pub checked_in: bool,
}

async fn get_today(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TodayResponse>> {
    let checked_in = state.attendance.has_checked_today(&user.user_id).await?;
    Ok(Json(TodayResponse { checked_in }))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Page<AttendanceRecord>>> {
    let page = params.page()?;
    Ok(Json(state.attendance.history(&user.user_id, page).await?))
}
