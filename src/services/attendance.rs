// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Attendance engine: daily check-in, streaks and milestone bonuses.
//!
//! Each operation has two implementations behind [`AttendancePath`]:
//! - [`ProcedurePath`]: the store's atomic server-side procedure
//! - [`FallbackPath`]: read-then-write calls guarded by create-only inserts
//!
//! The engine tries the procedure first and falls back when it is missing
//! or failing. Both paths produce the same results and the same ledger
//! entries for the same inputs.

use crate::db::{RewardsStore, StoreError, StoreResult};
use crate::error::{Rejection, Result};
use crate::models::{
    AttendanceRecord, AttendanceResult, AttendanceRules, AttendanceStats, MonthlyAttendance,
    NextMilestone, Page,
};
use crate::services::ledger::PointsLedger;
use crate::time_utils::Clock;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Page size for the attendance history.
pub const HISTORY_PAGE_SIZE: u32 = 30;

/// One way of running the attendance operations against the store.
#[async_trait]
pub trait AttendancePath: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check_in(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: &str,
    ) -> StoreResult<AttendanceResult>;

    async fn monthly(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<MonthlyAttendance>>;

    async fn stats(&self, user_id: &str, today: NaiveDate) -> StoreResult<AttendanceStats>;

    async fn has_checked_today(&self, user_id: &str, today: NaiveDate) -> StoreResult<bool>;
}

// ─── Procedure Path ──────────────────────────────────────────────

/// Delegates to the store's atomic procedures.
pub struct ProcedurePath {
    store: Arc<dyn RewardsStore>,
    rules: AttendanceRules,
}

impl ProcedurePath {
    pub fn new(store: Arc<dyn RewardsStore>, rules: AttendanceRules) -> Self {
        Self { store, rules }
    }
}

#[async_trait]
impl AttendancePath for ProcedurePath {
    fn name(&self) -> &'static str {
        "procedure"
    }

    async fn check_in(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: &str,
    ) -> StoreResult<AttendanceResult> {
        self.store
            .check_attendance(user_id, today, &self.rules, now)
            .await
    }

    async fn monthly(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<MonthlyAttendance>> {
        self.store.get_monthly_attendance(user_id, year, month).await
    }

    async fn stats(&self, user_id: &str, today: NaiveDate) -> StoreResult<AttendanceStats> {
        self.store.get_attendance_stats(user_id, today).await
    }

    async fn has_checked_today(&self, user_id: &str, today: NaiveDate) -> StoreResult<bool> {
        self.store.has_checked_today(user_id, today).await
    }
}

// ─── Fallback Path ───────────────────────────────────────────────

/// Plain table reads and create-only writes.
///
/// The record insert decides the winner of concurrent check-ins. Credits
/// are keyed by the record id, so re-issuing them is harmless; the
/// already-checked branch re-issues them to finish a check-in that was
/// interrupted between the insert and the credit.
pub struct FallbackPath {
    store: Arc<dyn RewardsStore>,
    ledger: PointsLedger,
    rules: AttendanceRules,
}

impl FallbackPath {
    pub fn new(store: Arc<dyn RewardsStore>, ledger: PointsLedger, rules: AttendanceRules) -> Self {
        Self {
            store,
            ledger,
            rules,
        }
    }

    async fn credit(&self, record: &AttendanceRecord, now: &str) -> StoreResult<()> {
        for entry in record.ledger_entries(now) {
            self.ledger
                .credit(
                    &entry.user_id,
                    entry.delta,
                    entry.reason,
                    &entry.source_id,
                    entry.description,
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AttendancePath for FallbackPath {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn check_in(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: &str,
    ) -> StoreResult<AttendanceResult> {
        if let Some(existing) = self.store.get_attendance(user_id, today).await? {
            self.credit(&existing, now).await?;
            return Ok(AttendanceResult::already_checked(&existing));
        }

        let yesterday = match today.pred_opt() {
            Some(d) => self.store.get_attendance(user_id, d).await?,
            None => None,
        };
        let record = self
            .rules
            .new_record(user_id, today, yesterday.as_ref(), now);

        match self.store.insert_attendance(&record).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                tracing::debug!(user_id, "Concurrent check-in inserted first");
                let winner = self
                    .store
                    .get_attendance(user_id, today)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Unavailable("check-in conflict but no record found".into())
                    })?;
                self.credit(&winner, now).await?;
                return Ok(AttendanceResult::already_checked(&winner));
            }
            Err(e) => return Err(e),
        }

        self.credit(&record, now).await?;
        Ok(AttendanceResult::accepted(&record))
    }

    async fn monthly(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<MonthlyAttendance>> {
        let Some((first, last)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        let records = self
            .store
            .list_attendance(user_id, Some(first), Some(last))
            .await?;
        Ok(records.iter().map(MonthlyAttendance::from).collect())
    }

    async fn stats(&self, user_id: &str, today: NaiveDate) -> StoreResult<AttendanceStats> {
        let records = self.store.list_attendance(user_id, None, None).await?;
        Ok(AttendanceStats::from_records(&records, today))
    }

    async fn has_checked_today(&self, user_id: &str, today: NaiveDate) -> StoreResult<bool> {
        Ok(self.store.get_attendance(user_id, today).await?.is_some())
    }
}

/// First and last day of a calendar month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Whether a procedure-path failure should be retried on the fallback path.
fn should_fall_back(err: &StoreError) -> bool {
    err.is_retryable() || matches!(err, StoreError::ProcedureMissing(_) | StoreError::Backend(_))
}

// ─── Engine ──────────────────────────────────────────────────────

/// Attendance engine.
pub struct AttendanceService {
    store: Arc<dyn RewardsStore>,
    procedure: Box<dyn AttendancePath>,
    fallback: Box<dyn AttendancePath>,
    clock: Arc<dyn Clock>,
    rules: AttendanceRules,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn RewardsStore>,
        ledger: PointsLedger,
        clock: Arc<dyn Clock>,
        rules: AttendanceRules,
    ) -> Self {
        Self {
            procedure: Box::new(ProcedurePath::new(store.clone(), rules.clone())),
            fallback: Box::new(FallbackPath::new(store.clone(), ledger, rules.clone())),
            store,
            clock,
            rules,
        }
    }

    fn log_fallback(&self, op: &'static str, err: &StoreError) {
        match err {
            StoreError::ProcedureMissing(_) => {
                tracing::debug!(op, path = self.fallback.name(), "Procedure missing, using fallback")
            }
            _ => tracing::warn!(
                op,
                path = self.fallback.name(),
                error = %err,
                "Procedure failed, using fallback"
            ),
        }
    }

    /// Check in for today.
    ///
    /// A deployment without the attendance collection gets an
    /// `unavailable()` result rather than an error.
    pub async fn check_in(&self, user_id: &str) -> Result<AttendanceResult> {
        let today = self.clock.today();
        let now = self.clock.now_rfc3339();

        let result = match self.procedure.check_in(user_id, today, &now).await {
            Err(e) if should_fall_back(&e) => {
                self.log_fallback("check_in", &e);
                self.fallback.check_in(user_id, today, &now).await
            }
            other => other,
        };

        match result {
            Ok(result) => {
                if result.accepted {
                    tracing::info!(
                        user_id,
                        streak_days = result.streak_days,
                        bonus_points = result.bonus_points,
                        "Check-in accepted"
                    );
                } else {
                    tracing::debug!(user_id, "Duplicate check-in");
                }
                Ok(result)
            }
            Err(StoreError::SchemaMissing(collection)) => {
                tracing::warn!(user_id, collection, "Attendance not provisioned");
                Ok(AttendanceResult::unavailable())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Calendar entries for one month, ascending by date.
    pub async fn monthly(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<MonthlyAttendance>> {
        if !(1..=12).contains(&month) || month_bounds(year, month).is_none() {
            return Err(Rejection::InvalidMonth.into());
        }

        let result = match self.procedure.monthly(user_id, year, month).await {
            Err(e) if should_fall_back(&e) => {
                self.log_fallback("monthly", &e);
                self.fallback.monthly(user_id, year, month).await
            }
            other => other,
        };

        match result {
            Err(StoreError::SchemaMissing(_)) => Ok(Vec::new()),
            other => Ok(other?),
        }
    }

    pub async fn stats(&self, user_id: &str) -> Result<AttendanceStats> {
        let today = self.clock.today();
        let result = match self.procedure.stats(user_id, today).await {
            Err(e) if should_fall_back(&e) => {
                self.log_fallback("stats", &e);
                self.fallback.stats(user_id, today).await
            }
            other => other,
        };

        match result {
            Err(StoreError::SchemaMissing(_)) => Ok(AttendanceStats::default()),
            other => Ok(other?),
        }
    }

    pub async fn has_checked_today(&self, user_id: &str) -> Result<bool> {
        let today = self.clock.today();
        let result = match self.procedure.has_checked_today(user_id, today).await {
            Err(e) if should_fall_back(&e) => {
                self.log_fallback("has_checked_today", &e);
                self.fallback.has_checked_today(user_id, today).await
            }
            other => other,
        };

        match result {
            Err(StoreError::SchemaMissing(_)) => Ok(false),
            other => Ok(other?),
        }
    }

    /// Past check-ins, newest first.
    pub async fn history(&self, user_id: &str, page: u32) -> Result<Page<AttendanceRecord>> {
        match self.store.list_attendance(user_id, None, None).await {
            Ok(mut records) => {
                records.reverse();
                Ok(Page::from_sorted(records, page, HISTORY_PAGE_SIZE))
            }
            Err(StoreError::SchemaMissing(_)) => {
                Ok(Page::from_sorted(Vec::new(), page, HISTORY_PAGE_SIZE))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn next_milestone(&self, current_streak: u32) -> Option<NextMilestone> {
        self.rules.milestones.next_after(current_streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, december) = month_bounds(2026, 12).unwrap();
        assert_eq!(december, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        assert!(month_bounds(2026, 13).is_none());
    }

    #[test]
    fn test_conflicts_are_not_retried_on_fallback() {
        assert!(should_fall_back(&StoreError::ProcedureMissing("x")));
        assert!(should_fall_back(&StoreError::Unavailable("timeout".into())));
        assert!(should_fall_back(&StoreError::Backend("internal".into())));
        assert!(!should_fall_back(&StoreError::SchemaMissing("attendance")));
        assert!(!should_fall_back(&StoreError::Conflict));
    }
}
