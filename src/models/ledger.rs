// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Points ledger entries and the derived balance.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Attendance,
    StreakBonus,
    Roulette,
    ReferralReferrer,
    ReferralReferred,
    Spend,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Attendance => "attendance",
            LedgerReason::StreakBonus => "streak_bonus",
            LedgerReason::Roulette => "roulette",
            LedgerReason::ReferralReferrer => "referral_referrer",
            LedgerReason::ReferralReferred => "referral_referred",
            LedgerReason::Spend => "spend",
        }
    }
}

/// Immutable record of a single balance change, stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LedgerEntry {
    /// Derived from `(user_id, reason, source_id)` (also used as document ID)
    pub id: String,
    pub user_id: String,
    /// Signed point delta (negative for spends)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub delta: i64,
    pub reason: LedgerReason,
    /// ID of the attendance record, spin or referral edge that caused it
    pub source_id: String,
    /// Human-readable description for the points history screen
    #[serde(default)]
    pub description: String,
    /// When the entry was written (ISO 8601)
    pub created_at: String,
}

impl LedgerEntry {
    /// Document ID for the idempotence key `(user_id, reason, source_id)`.
    ///
    /// Components are percent-encoded so user or source IDs containing
    /// separators cannot collide with each other or contain `/`.
    pub fn key(user_id: &str, reason: LedgerReason, source_id: &str) -> String {
        format!(
            "{}_{}_{}",
            urlencoding::encode(user_id),
            reason.as_str(),
            urlencoding::encode(source_id)
        )
    }

    pub fn new(
        user_id: &str,
        delta: i64,
        reason: LedgerReason,
        source_id: &str,
        description: impl Into<String>,
        created_at: &str,
    ) -> Self {
        Self {
            id: Self::key(user_id, reason, source_id),
            user_id: user_id.to_string(),
            delta,
            reason,
            source_id: source_id.to_string(),
            description: description.into(),
            created_at: created_at.to_string(),
        }
    }
}

/// Balance derived from the full set of ledger entries for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PointBalance {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_earned: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_used: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub available: i64,
}

impl PointBalance {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        let mut balance = Self::default();
        for entry in entries {
            if entry.delta >= 0 {
                balance.total_earned += entry.delta;
            } else {
                balance.total_used += -entry.delta;
            }
        }
        balance.available = balance.total_earned - balance.total_used;
        balance
    }
}
