// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Referral codes and referral edges.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A user's lifetime invitation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    pub user_id: String,
    /// Upper-case code (also used as document ID in `referral_codes`)
    pub code: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Completed,
    Expired,
}

impl ReferralStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReferralStatus::Pending)
    }
}

/// Relationship between an inviting user and an invited user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReferralEdge {
    /// Same as `referred_id`: a user can be referred once
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub status: ReferralStatus,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub referrer_reward_points: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub referred_reward_points: i64,
    /// Booking that completed the referral
    #[serde(default)]
    pub first_booking_id: Option<String>,
    /// When the edge was created (ISO 8601)
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub expired_at: Option<String>,
}

impl ReferralEdge {
    pub fn key(referred_id: &str) -> String {
        urlencoding::encode(referred_id).into_owned()
    }
}

/// Referral totals for the referrer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReferralStats {
    pub total_referrals: u32,
    pub completed_referrals: u32,
    pub pending_referrals: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_rewards_earned: i64,
}

impl ReferralStats {
    pub fn from_edges(edges: &[ReferralEdge]) -> Self {
        let mut stats = Self::default();
        for edge in edges {
            stats.total_referrals += 1;
            match edge.status {
                ReferralStatus::Completed => {
                    stats.completed_referrals += 1;
                    stats.total_rewards_earned += edge.referrer_reward_points;
                }
                ReferralStatus::Pending => stats.pending_referrals += 1,
                ReferralStatus::Expired => {}
            }
        }
        stats
    }
}
