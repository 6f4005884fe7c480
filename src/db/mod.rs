// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Every engine talks to the backing store through [`RewardsStore`]. Writes
//! that must happen at most once (ledger entries, daily check-ins, spin
//! slots, referral edges) are create-only and fail with
//! [`StoreError::Conflict`] when the document already exists; that is the
//! only mutual-exclusion mechanism the engines rely on.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::models::{
    AttendanceRecord, AttendanceResult, AttendanceRules, AttendanceStats, LedgerEntry,
    MonthlyAttendance, ReferralCode, ReferralEdge, RouletteReward, RouletteSpinRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    pub const LEDGER: &str = "point_ledger";
    pub const ATTENDANCE: &str = "attendance";
    pub const ROULETTE_REWARDS: &str = "roulette_rewards";
    pub const ROULETTE_SPINS: &str = "roulette_spins";
    /// Code -> owner (keyed by code, enforces code uniqueness)
    pub const REFERRAL_CODES: &str = "referral_codes";
    /// Owner -> code (keyed by user_id, one code per user)
    pub const REFERRAL_CODE_OWNERS: &str = "referral_code_owners";
    /// Referral edges (keyed by referred_id)
    pub const REFERRALS: &str = "referrals";
    /// Terminal-state markers (keyed by edge id, written once)
    pub const REFERRAL_OUTCOMES: &str = "referral_outcomes";
}

/// Server-side procedure names.
pub mod procedures {
    pub const CHECK_ATTENDANCE: &str = "check_attendance";
    pub const GET_MONTHLY_ATTENDANCE: &str = "get_monthly_attendance";
    pub const GET_ATTENDANCE_STATS: &str = "get_attendance_stats";
    pub const HAS_CHECKED_TODAY: &str = "has_checked_today";
}

/// Store-level failures, normalized across backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network failure, timeout or contention. Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The collection is not provisioned in this deployment.
    #[error("Collection not provisioned: {0}")]
    SchemaMissing(&'static str),

    /// The atomic procedure is not available; use the fallback path.
    #[error("Procedure not available: {0}")]
    ProcedureMissing(&'static str),

    /// A create-only write hit an existing document.
    #[error("Document already exists")]
    Conflict,

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backing store shared by all engines.
///
/// The attendance procedures have default implementations that report
/// [`StoreError::ProcedureMissing`]; a backend that can run them atomically
/// overrides them.
#[async_trait]
pub trait RewardsStore: Send + Sync {
    // ─── Ledger ──────────────────────────────────────────────────

    /// Create-only insert keyed by `entry.id`.
    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()>;

    async fn get_ledger_entry(&self, id: &str) -> StoreResult<Option<LedgerEntry>>;

    /// All entries for a user, newest first.
    async fn list_ledger_entries(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>>;

    // ─── Attendance ──────────────────────────────────────────────

    async fn get_attendance(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Create-only insert keyed by `record.id`.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// Records in the inclusive date range, oldest first.
    async fn list_attendance(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    /// Atomically check in and credit the ledger.
    async fn check_attendance(
        &self,
        _user_id: &str,
        _today: NaiveDate,
        _rules: &AttendanceRules,
        _now: &str,
    ) -> StoreResult<AttendanceResult> {
        Err(StoreError::ProcedureMissing(procedures::CHECK_ATTENDANCE))
    }

    async fn get_monthly_attendance(
        &self,
        _user_id: &str,
        _year: i32,
        _month: u32,
    ) -> StoreResult<Vec<MonthlyAttendance>> {
        Err(StoreError::ProcedureMissing(
            procedures::GET_MONTHLY_ATTENDANCE,
        ))
    }

    async fn get_attendance_stats(
        &self,
        _user_id: &str,
        _today: NaiveDate,
    ) -> StoreResult<AttendanceStats> {
        Err(StoreError::ProcedureMissing(procedures::GET_ATTENDANCE_STATS))
    }

    async fn has_checked_today(&self, _user_id: &str, _today: NaiveDate) -> StoreResult<bool> {
        Err(StoreError::ProcedureMissing(procedures::HAS_CHECKED_TODAY))
    }

    // ─── Roulette ────────────────────────────────────────────────

    /// Active rewards ordered by `display_order`.
    async fn list_active_rewards(&self) -> StoreResult<Vec<RouletteReward>>;

    /// Every reward, active or not, ordered by `display_order` (admin).
    async fn list_all_rewards(&self) -> StoreResult<Vec<RouletteReward>>;

    async fn get_reward(&self, id: &str) -> StoreResult<Option<RouletteReward>>;

    /// Create or replace a wheel segment (admin).
    async fn upsert_reward(&self, reward: &RouletteReward) -> StoreResult<()>;

    /// Spins for a user on one day, oldest first.
    async fn list_spins_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<RouletteSpinRecord>>;

    /// All spins for a user, newest first.
    async fn list_spins(&self, user_id: &str) -> StoreResult<Vec<RouletteSpinRecord>>;

    /// Every spin across users (admin stats).
    async fn list_all_spins(&self) -> StoreResult<Vec<RouletteSpinRecord>>;

    /// Create-only insert keyed by `record.id`.
    async fn insert_spin(&self, record: &RouletteSpinRecord) -> StoreResult<()>;

    // ─── Referrals ───────────────────────────────────────────────

    async fn get_referral_code(&self, code: &str) -> StoreResult<Option<ReferralCode>>;

    async fn get_referral_code_for_user(&self, user_id: &str)
        -> StoreResult<Option<ReferralCode>>;

    /// Create-only insert keyed by `code.code`.
    async fn insert_referral_code(&self, code: &ReferralCode) -> StoreResult<()>;

    /// Create-only insert keyed by `code.user_id`.
    async fn insert_referral_code_owner(&self, code: &ReferralCode) -> StoreResult<()>;

    async fn get_referral_edge(&self, referred_id: &str) -> StoreResult<Option<ReferralEdge>>;

    /// Create-only insert keyed by `edge.id`.
    async fn insert_referral_edge(&self, edge: &ReferralEdge) -> StoreResult<()>;

    /// Edges created by a referrer, newest first.
    async fn list_referrals_by_referrer(
        &self,
        referrer_id: &str,
    ) -> StoreResult<Vec<ReferralEdge>>;

    /// Pending edges created strictly before `created_before` (ISO 8601).
    async fn list_pending_referrals_before(
        &self,
        created_before: &str,
    ) -> StoreResult<Vec<ReferralEdge>>;

    /// Move an edge into its terminal state.
    ///
    /// `edge.status` must be terminal. Fails with [`StoreError::Conflict`]
    /// if the edge already reached a terminal state.
    async fn settle_referral(&self, edge: &ReferralEdge) -> StoreResult<()>;
}
