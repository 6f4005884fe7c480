// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod attendance;
pub mod ledger;
pub mod referral;
pub mod roulette;

pub use attendance::{
    AttendanceRecord, AttendanceResult, AttendanceRules, AttendanceStats, MilestoneSchedule,
    MonthlyAttendance, NextMilestone,
};
pub use ledger::{LedgerEntry, LedgerReason, PointBalance};
pub use referral::{ReferralCode, ReferralEdge, ReferralStats, ReferralStatus};
pub use roulette::{
    RewardCount, RewardType, RouletteReward, RouletteSpinRecord, RouletteStats, SpinEligibility,
    SpinResult,
};

use serde::Serialize;

/// One page of a newest-first listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slice a full listing into a 1-indexed page.
    ///
    /// Callers validate `page >= 1` and `per_page >= 1` before slicing.
    pub fn from_sorted(items: Vec<T>, page: u32, per_page: u32) -> Self {
        let per_page = per_page as usize;
        let from = (page.saturating_sub(1) as usize).saturating_mul(per_page);
        let to = from.saturating_add(per_page);
        let has_more = items.len() > to;
        let data = items.into_iter().skip(from).take(per_page).collect();
        Self {
            data,
            page,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slicing() {
        let items: Vec<u32> = (0..25).collect();

        let first = Page::from_sorted(items.clone(), 1, 10);
        assert_eq!(first.data, (0..10).collect::<Vec<_>>());
        assert!(first.has_more);

        let last = Page::from_sorted(items.clone(), 3, 10);
        assert_eq!(last.data, (20..25).collect::<Vec<_>>());
        assert!(!last.has_more);

        let beyond = Page::from_sorted(items, 4, 10);
        assert!(beyond.data.is_empty());
        assert!(!beyond.has_more);
    }
}
