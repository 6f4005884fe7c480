// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Roulette wheel segments, spin records and eligibility.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::attendance::date_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Points,
    Coupon,
    Nothing,
}

/// One segment of the wheel (admin-edited, stored in Firestore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RouletteReward {
    pub id: String,
    pub name: String,
    pub reward_type: RewardType,
    /// Points amount, or discount value for coupons
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub reward_value: i64,
    /// Relative weight of this segment
    pub probability: u32,
    pub color: String,
    /// Coupon definition granted for coupon rewards
    #[serde(default)]
    pub coupon_id: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

/// Audit row for one credited spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RouletteSpinRecord {
    /// Derived from `(user_id, spin_date, slot)` (also used as document ID)
    pub id: String,
    pub user_id: String,
    /// User-local calendar date ("YYYY-MM-DD")
    pub spin_date: String,
    /// 0-based index of the spin within the day
    pub slot: u32,
    pub reward_id: String,
    pub reward_name: String,
    pub reward_type: RewardType,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub reward_value: i64,
    /// Points spent on this spin (0 for the free spin)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub cost_points: i64,
    pub created_at: String,
}

impl RouletteSpinRecord {
    /// Document ID for the daily slot key `(user_id, spin_date, slot)`.
    pub fn key(user_id: &str, date: NaiveDate, slot: u32) -> String {
        format!("{}_{}_{}", urlencoding::encode(user_id), date_key(date), slot)
    }
}

/// Whether (and at what cost) a user may spin right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SpinEligibility {
    pub today_spin_count: u32,
    pub free_spin_available: bool,
    pub can_spin: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub point_cost: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_points: i64,
    /// Start of tomorrow (ISO 8601) once today's free spin is used
    pub next_free_spin_at: Option<String>,
}

impl SpinEligibility {
    /// Derive eligibility from today's spins and the current balance.
    pub fn compute(
        today_spins: &[RouletteSpinRecord],
        user_points: i64,
        max_daily_spins: u32,
        paid_cost: i64,
        next_free_spin_at: String,
    ) -> Self {
        let today_spin_count = (today_spins.len() as u32).min(max_daily_spins);
        let free_spin_available = !today_spins.iter().any(|s| s.cost_points == 0);
        let point_cost = if free_spin_available { 0 } else { paid_cost };
        let under_cap = today_spin_count < max_daily_spins;
        let can_spin = under_cap && (free_spin_available || user_points >= point_cost);

        Self {
            today_spin_count,
            free_spin_available,
            can_spin,
            point_cost,
            user_points,
            next_free_spin_at: (!free_spin_available).then_some(next_free_spin_at),
        }
    }

    pub fn daily_limit_reached(&self, max_daily_spins: u32) -> bool {
        self.today_spin_count >= max_daily_spins
    }
}

/// Outcome of a spin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SpinResult {
    pub success: bool,
    pub spin_id: String,
    pub reward: RouletteReward,
    pub message: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub cost_points: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub new_balance: i64,
    pub coupon_granted: bool,
}

/// Admin view of spin activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouletteStats {
    pub total_spins: u32,
    pub today_spins: u32,
    pub reward_distribution: Vec<RewardCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardCount {
    pub reward_name: String,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin(slot: u32, cost_points: i64) -> RouletteSpinRecord {
        RouletteSpinRecord {
            id: format!("u_2026-03-01_{}", slot),
            user_id: "u".to_string(),
            spin_date: "2026-03-01".to_string(),
            slot,
            reward_id: "r1".to_string(),
            reward_name: "Miss".to_string(),
            reward_type: RewardType::Nothing,
            reward_value: 0,
            cost_points,
            created_at: "2026-03-01T01:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_fresh_day_has_free_spin() {
        let e = SpinEligibility::compute(&[], 0, 5, 500, "tomorrow".to_string());

        assert!(e.free_spin_available);
        assert!(e.can_spin);
        assert_eq!(e.point_cost, 0);
        assert_eq!(e.next_free_spin_at, None);
    }

    #[test]
    fn test_paid_spin_requires_points() {
        let spins = vec![spin(0, 0)];

        let broke = SpinEligibility::compute(&spins, 499, 5, 500, "tomorrow".to_string());
        assert!(!broke.free_spin_available);
        assert!(!broke.can_spin);
        assert_eq!(broke.point_cost, 500);
        assert_eq!(broke.next_free_spin_at.as_deref(), Some("tomorrow"));

        let funded = SpinEligibility::compute(&spins, 500, 5, 500, "tomorrow".to_string());
        assert!(funded.can_spin);
    }

    #[test]
    fn test_daily_cap_blocks_regardless_of_balance() {
        let spins: Vec<_> = (0..5).map(|i| spin(i, if i == 0 { 0 } else { 500 })).collect();

        let e = SpinEligibility::compute(&spins, 1_000_000, 5, 500, "tomorrow".to_string());

        assert_eq!(e.today_spin_count, 5);
        assert!(!e.can_spin);
        assert!(e.daily_limit_reached(5));
    }
}
