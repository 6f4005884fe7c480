// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Points ledger: the only writer of balance-affecting events.
//!
//! Every entry is keyed by `(user_id, reason, source_id)`, so a retried
//! credit or debit finds the entry it already wrote instead of adding a
//! second one. Balances are always summed from the entries, never cached.

use crate::db::{RewardsStore, StoreError, StoreResult};
use crate::error::{Rejection, Result};
use crate::models::{LedgerEntry, LedgerReason, Page, PointBalance};
use crate::time_utils::Clock;
use std::sync::Arc;

/// Append-only points ledger over the shared store.
#[derive(Clone)]
pub struct PointsLedger {
    store: Arc<dyn RewardsStore>,
    clock: Arc<dyn Clock>,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn RewardsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Credit `delta` points, idempotent on `(user_id, reason, source_id)`.
    ///
    /// A retry returns the entry written by the first call.
    pub async fn credit(
        &self,
        user_id: &str,
        delta: i64,
        reason: LedgerReason,
        source_id: &str,
        description: impl Into<String>,
    ) -> StoreResult<LedgerEntry> {
        let entry = LedgerEntry::new(
            user_id,
            delta,
            reason,
            source_id,
            description,
            &self.clock.now_rfc3339(),
        );
        self.insert_or_existing(entry).await
    }

    /// Spend `amount` points, keyed by `source_id`.
    ///
    /// The balance is re-read right before the write. A retried debit with
    /// the same key returns the earlier entry without re-checking.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        source_id: &str,
        description: impl Into<String>,
    ) -> Result<LedgerEntry> {
        let id = LedgerEntry::key(user_id, LedgerReason::Spend, source_id);
        if let Some(existing) = self.store.get_ledger_entry(&id).await? {
            tracing::debug!(user_id, source_id, "Debit already recorded");
            return Ok(existing);
        }

        let balance = self.balance(user_id).await?;
        if balance < amount {
            tracing::info!(user_id, balance, amount, "Debit rejected: insufficient points");
            return Err(Rejection::InsufficientPoints.into());
        }

        let entry = LedgerEntry::new(
            user_id,
            -amount,
            LedgerReason::Spend,
            source_id,
            description,
            &self.clock.now_rfc3339(),
        );
        let entry = self.insert_or_existing(entry).await?;
        tracing::info!(user_id, source_id, amount, "Points debited");
        Ok(entry)
    }

    /// Current spendable balance.
    pub async fn balance(&self, user_id: &str) -> StoreResult<i64> {
        Ok(self.balance_summary(user_id).await?.available)
    }

    pub async fn balance_summary(&self, user_id: &str) -> StoreResult<PointBalance> {
        let entries = self.store.list_ledger_entries(user_id).await?;
        Ok(PointBalance::from_entries(&entries))
    }

    /// Ledger entries, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> StoreResult<Page<LedgerEntry>> {
        let entries = self.store.list_ledger_entries(user_id).await?;
        Ok(Page::from_sorted(entries, page, per_page))
    }

    async fn insert_or_existing(&self, entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        match self.store.insert_ledger_entry(&entry).await {
            Ok(()) => {
                tracing::debug!(
                    user_id = %entry.user_id,
                    reason = entry.reason.as_str(),
                    delta = entry.delta,
                    "Ledger entry written"
                );
                Ok(entry)
            }
            Err(StoreError::Conflict) => {
                self.store.get_ledger_entry(&entry.id).await?.ok_or_else(|| {
                    StoreError::Unavailable(format!("ledger entry {} not readable", entry.id))
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use crate::time_utils::FixedClock;
    use chrono::{TimeZone, Utc};

    fn ledger() -> PointsLedger {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        PointsLedger::new(Arc::new(MemoryStore::new()), Arc::new(clock))
    }

    #[tokio::test]
    async fn test_credit_is_idempotent() {
        let ledger = ledger();

        let first = ledger
            .credit("u", 10, LedgerReason::Attendance, "a1", "check-in")
            .await
            .unwrap();
        let retry = ledger
            .credit("u", 10, LedgerReason::Attendance, "a1", "check-in")
            .await
            .unwrap();

        assert_eq!(first, retry);
        assert_eq!(ledger.balance("u").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_debit_rejects_short_balance() {
        let ledger = ledger();
        ledger
            .credit("u", 400, LedgerReason::Roulette, "s1", "")
            .await
            .unwrap();

        let result = ledger.debit("u", 500, "spin-1", "paid spin").await;

        assert!(matches!(
            result,
            Err(AppError::Rejected(Rejection::InsufficientPoints))
        ));
        assert_eq!(ledger.balance("u").await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_retried_debit_is_not_doubled() {
        let ledger = ledger();
        ledger
            .credit("u", 600, LedgerReason::Roulette, "s1", "")
            .await
            .unwrap();

        ledger.debit("u", 500, "spin-1", "paid spin").await.unwrap();
        // Balance is now 100; a retry must not re-check or re-debit.
        let retry = ledger.debit("u", 500, "spin-1", "paid spin").await.unwrap();

        assert_eq!(retry.delta, -500);
        let summary = ledger.balance_summary("u").await.unwrap();
        assert_eq!(summary.total_earned, 600);
        assert_eq!(summary.total_used, 500);
        assert_eq!(summary.available, 100);
    }
}
