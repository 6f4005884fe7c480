// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Daily attendance records, streak rules and milestone bonuses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::ledger::{LedgerEntry, LedgerReason};

/// One check-in, stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Derived from `(user_id, check_date)` (also used as document ID)
    pub id: String,
    pub user_id: String,
    /// User-local calendar date ("YYYY-MM-DD")
    pub check_date: String,
    pub streak_days: u32,
    #[serde(default)]
    pub base_points: i64,
    #[serde(default)]
    pub bonus_points: i64,
    /// When the record was written (ISO 8601)
    pub created_at: String,
}

impl AttendanceRecord {
    /// Document ID for the uniqueness key `(user_id, check_date)`.
    pub fn key(user_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", urlencoding::encode(user_id), date_key(date))
    }

    pub fn total_points(&self) -> i64 {
        self.base_points + self.bonus_points
    }

    /// Ledger credits owed for this check-in, keyed by the record id.
    pub fn ledger_entries(&self, now: &str) -> Vec<LedgerEntry> {
        let mut entries = vec![LedgerEntry::new(
            &self.user_id,
            self.base_points,
            LedgerReason::Attendance,
            &self.id,
            format!("Attendance check-in ({})", self.check_date),
            now,
        )];
        if self.bonus_points > 0 {
            entries.push(LedgerEntry::new(
                &self.user_id,
                self.bonus_points,
                LedgerReason::StreakBonus,
                &self.id,
                format!("{}-day streak bonus", self.streak_days),
                now,
            ));
        }
        entries
    }
}

/// Format a date the way it is stored ("YYYY-MM-DD").
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Streak length for a check-in given the previous day's record, if any.
///
/// A missed day resets the streak to 1.
pub fn next_streak(yesterday: Option<&AttendanceRecord>) -> u32 {
    yesterday.map(|r| r.streak_days + 1).unwrap_or(1)
}

/// Point rules applied by both check-in paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRules {
    pub base_points: i64,
    pub milestones: MilestoneSchedule,
}

impl Default for AttendanceRules {
    fn default() -> Self {
        Self {
            base_points: 10,
            milestones: MilestoneSchedule::default(),
        }
    }
}

impl AttendanceRules {
    /// Build the record for a new check-in on `today`.
    pub fn new_record(
        &self,
        user_id: &str,
        today: NaiveDate,
        yesterday: Option<&AttendanceRecord>,
        now: &str,
    ) -> AttendanceRecord {
        let streak_days = next_streak(yesterday);
        AttendanceRecord {
            id: AttendanceRecord::key(user_id, today),
            user_id: user_id.to_string(),
            check_date: date_key(today),
            streak_days,
            base_points: self.base_points,
            bonus_points: self.milestones.bonus_for(streak_days),
            created_at: now.to_string(),
        }
    }
}

/// Milestone bonus schedule: `(streak_days, bonus_points)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneSchedule {
    milestones: Vec<(u32, i64)>,
}

impl Default for MilestoneSchedule {
    fn default() -> Self {
        Self::new(vec![(7, 50), (14, 100), (21, 150), (30, 300)])
    }
}

impl MilestoneSchedule {
    pub fn new(mut milestones: Vec<(u32, i64)>) -> Self {
        milestones.sort_by_key(|(days, _)| *days);
        milestones.dedup_by_key(|(days, _)| *days);
        Self { milestones }
    }

    /// Parse "7:50,14:100" style schedules.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut milestones = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (days, bonus) = part.split_once(':')?;
            let days: u32 = days.trim().parse().ok()?;
            let bonus: i64 = bonus.trim().parse().ok()?;
            if days == 0 || bonus < 0 {
                return None;
            }
            milestones.push((days, bonus));
        }
        if milestones.is_empty() {
            return None;
        }
        Some(Self::new(milestones))
    }

    /// Bonus for an exact milestone day, 0 otherwise. Not cumulative.
    pub fn bonus_for(&self, streak_days: u32) -> i64 {
        self.milestones
            .iter()
            .find(|(days, _)| *days == streak_days)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(0)
    }

    /// The next milestone strictly after `current_streak`.
    ///
    /// Past the last milestone, the next multiple of the last milestone is
    /// used with the last bonus.
    pub fn next_after(&self, current_streak: u32) -> Option<NextMilestone> {
        if let Some((days, bonus)) = self.milestones.iter().find(|(d, _)| current_streak < *d) {
            return Some(NextMilestone {
                days_until_next: days - current_streak,
                next_milestone: *days,
                next_bonus: *bonus,
            });
        }

        let (last_days, last_bonus) = *self.milestones.last()?;
        let next = (current_streak / last_days + 1) * last_days;
        Some(NextMilestone {
            days_until_next: next - current_streak,
            next_milestone: next,
            next_bonus: last_bonus,
        })
    }
}

/// Result of a check-in attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AttendanceResult {
    /// False only when the service is not provisioned in this deployment
    pub success: bool,
    /// True when this call created today's record
    pub accepted: bool,
    pub message: String,
    pub attendance_id: Option<String>,
    pub streak_days: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub base_points: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub bonus_points: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points: i64,
    pub already_checked: bool,
}

impl AttendanceResult {
    pub fn accepted(record: &AttendanceRecord) -> Self {
        let message = if record.bonus_points > 0 {
            format!(
                "Checked in! {}-day streak bonus of {}P added.",
                record.streak_days, record.bonus_points
            )
        } else {
            format!("Checked in! Day {} of your streak.", record.streak_days)
        };
        Self::from_record(record, message, true, false)
    }

    pub fn already_checked(record: &AttendanceRecord) -> Self {
        Self::from_record(
            record,
            "You have already checked in today.".to_string(),
            false,
            true,
        )
    }

    pub fn unavailable() -> Self {
        Self {
            success: false,
            accepted: false,
            message: "Attendance check-in is being prepared. Please try again later.".to_string(),
            attendance_id: None,
            streak_days: 0,
            base_points: 0,
            bonus_points: 0,
            total_points: 0,
            already_checked: false,
        }
    }

    fn from_record(
        record: &AttendanceRecord,
        message: String,
        accepted: bool,
        already_checked: bool,
    ) -> Self {
        Self {
            success: true,
            accepted,
            message,
            attendance_id: Some(record.id.clone()),
            streak_days: record.streak_days,
            base_points: record.base_points,
            bonus_points: record.bonus_points,
            total_points: record.total_points(),
            already_checked,
        }
    }
}

/// One calendar cell of the monthly attendance view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MonthlyAttendance {
    pub check_date: String,
    pub streak_days: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points: i64,
}

impl From<&AttendanceRecord> for MonthlyAttendance {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            check_date: record.check_date.clone(),
            streak_days: record.streak_days,
            total_points: record.total_points(),
        }
    }
}

/// Aggregate attendance statistics for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AttendanceStats {
    pub total_days: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points_earned: i64,
    pub this_month_days: u32,
}

impl AttendanceStats {
    /// Compute stats from every record of a user, in any order.
    pub fn from_records(records: &[AttendanceRecord], today: NaiveDate) -> Self {
        let today_key = date_key(today);
        let yesterday_key = today.pred_opt().map(date_key).unwrap_or_default();
        let month_prefix = &today_key[..7];

        let mut stats = Self::default();
        let mut today_streak = None;
        let mut yesterday_streak = None;

        for record in records {
            stats.total_days += 1;
            stats.max_streak = stats.max_streak.max(record.streak_days);
            stats.total_points_earned += record.total_points();
            if record.check_date.starts_with(month_prefix) {
                stats.this_month_days += 1;
            }
            if record.check_date == today_key {
                today_streak = Some(record.streak_days);
            } else if record.check_date == yesterday_key {
                yesterday_streak = Some(record.streak_days);
            }
        }

        stats.current_streak = today_streak.or(yesterday_streak).unwrap_or(0);
        stats
    }
}

/// Distance to the next streak milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct NextMilestone {
    pub days_until_next: u32,
    pub next_milestone: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub next_bonus: i64,
}
