// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roulette engine: eligibility, weighted draw and reward crediting.
//!
//! Each spin occupies a daily slot `(user, date, slot)`. The paid debit,
//! the spin record and the reward credit are all keyed by that slot, so two
//! concurrent spins racing for the same slot share one debit and only one
//! of them gets a record.

use crate::db::{RewardsStore, StoreError};
use crate::error::{AppError, Rejection, Result};
use crate::models::attendance::date_key;
use crate::models::{
    LedgerEntry, LedgerReason, Page, RewardCount, RewardType, RouletteReward, RouletteSpinRecord,
    RouletteStats, SpinEligibility, SpinResult,
};
use crate::services::coupon::{CouponError, CouponIssuer};
use crate::services::ledger::PointsLedger;
use crate::time_utils::Clock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Page size for the spin history.
pub const HISTORY_PAGE_SIZE: u32 = 10;

/// Pick one reward with probability proportional to its weight.
///
/// If every weight is zero, each reward is equally likely. Returns `None`
/// only for an empty slice.
pub fn select_weighted<'a, R: Rng + ?Sized>(
    rewards: &'a [RouletteReward],
    rng: &mut R,
) -> Option<&'a RouletteReward> {
    if rewards.is_empty() {
        return None;
    }

    let total: u64 = rewards.iter().map(|r| u64::from(r.probability)).sum();
    if total == 0 {
        return rewards.get(rng.gen_range(0..rewards.len()));
    }

    let mut roll = rng.gen_range(0..total);
    for reward in rewards {
        let weight = u64::from(reward.probability);
        if roll < weight {
            return Some(reward);
        }
        roll -= weight;
    }
    rewards.last()
}

/// Tunable roulette rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouletteSettings {
    pub spin_cost: i64,
    pub max_daily_spins: u32,
    /// Credited instead of a coupon the user already owns
    pub coupon_fallback_points: i64,
}

impl Default for RouletteSettings {
    fn default() -> Self {
        Self {
            spin_cost: 500,
            max_daily_spins: 5,
            coupon_fallback_points: 100,
        }
    }
}

/// Roulette engine.
pub struct RouletteService {
    store: Arc<dyn RewardsStore>,
    ledger: PointsLedger,
    coupons: Arc<dyn CouponIssuer>,
    clock: Arc<dyn Clock>,
    settings: RouletteSettings,
}

impl RouletteService {
    pub fn new(
        store: Arc<dyn RewardsStore>,
        ledger: PointsLedger,
        coupons: Arc<dyn CouponIssuer>,
        clock: Arc<dyn Clock>,
        settings: RouletteSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            coupons,
            clock,
            settings,
        }
    }

    /// Active wheel segments in display order.
    pub async fn list_rewards(&self) -> Result<Vec<RouletteReward>> {
        match self.store.list_active_rewards().await {
            Ok(rewards) => Ok(rewards),
            Err(StoreError::SchemaMissing(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every wheel segment, inactive ones included (admin).
    pub async fn all_rewards(&self) -> Result<Vec<RouletteReward>> {
        Ok(self.store.list_all_rewards().await?)
    }

    /// Create or replace a wheel segment (admin).
    ///
    /// Spins already drawn keep the reward name and value they recorded.
    pub async fn save_reward(&self, reward: RouletteReward) -> Result<RouletteReward> {
        let has_coupon = reward
            .coupon_id
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if reward.reward_type == RewardType::Coupon && !has_coupon {
            return Err(AppError::BadRequest(
                "Coupon rewards need a coupon_id".to_string(),
            ));
        }

        self.store.upsert_reward(&reward).await?;
        tracing::info!(
            reward_id = %reward.id,
            is_active = reward.is_active,
            probability = reward.probability,
            "Roulette reward saved"
        );
        Ok(reward)
    }

    /// Take a segment off the wheel. Rewards are never removed outright.
    pub async fn deactivate_reward(&self, id: &str) -> Result<RouletteReward> {
        let mut reward = self
            .store
            .get_reward(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Roulette reward {}", id)))?;

        if reward.is_active {
            reward.is_active = false;
            self.store.upsert_reward(&reward).await?;
            tracing::info!(reward_id = %reward.id, "Roulette reward deactivated");
        }
        Ok(reward)
    }

    pub async fn eligibility(&self, user_id: &str) -> Result<SpinEligibility> {
        let spins = match self.store.list_spins_on(user_id, self.clock.today()).await {
            Ok(spins) => spins,
            Err(StoreError::SchemaMissing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let balance = self.ledger.balance(user_id).await?;
        Ok(self.compute_eligibility(&spins, balance))
    }

    fn compute_eligibility(&self, spins: &[RouletteSpinRecord], balance: i64) -> SpinEligibility {
        SpinEligibility::compute(
            spins,
            balance,
            self.settings.max_daily_spins,
            self.settings.spin_cost,
            self.clock.start_of_tomorrow(),
        )
    }

    /// Spin the wheel once.
    pub async fn spin(&self, user_id: &str) -> Result<SpinResult> {
        // Snapshot the wheel before touching the balance.
        let rewards = self.list_rewards().await?;
        if rewards.is_empty() {
            return Err(AppError::NoRewardsConfigured);
        }

        let today = self.clock.today();
        let spins = self.store.list_spins_on(user_id, today).await?;
        let slot = (spins.len() as u32).min(self.settings.max_daily_spins);
        let spin_id = RouletteSpinRecord::key(user_id, today, slot);

        // A debit for this slot without a spin record means an earlier
        // attempt was paid for but never finished; resume it.
        let prepaid = self
            .store
            .get_ledger_entry(&LedgerEntry::key(user_id, LedgerReason::Spend, &spin_id))
            .await?
            .is_some();

        let balance = self.ledger.balance(user_id).await?;
        let eligibility = self.compute_eligibility(&spins, balance);

        if eligibility.daily_limit_reached(self.settings.max_daily_spins) {
            return Err(Rejection::DailyLimitReached.into());
        }
        if prepaid {
            tracing::info!(user_id, slot, "Resuming paid spin");
        } else if !eligibility.can_spin {
            return Err(Rejection::InsufficientPoints.into());
        }

        let cost_points = eligibility.point_cost;

        if cost_points > 0 {
            self.ledger
                .debit(user_id, cost_points, &spin_id, "Roulette spin")
                .await?;
        }

        let reward = {
            let mut rng = rand::thread_rng();
            select_weighted(&rewards, &mut rng).cloned()
        }
        .ok_or(AppError::NoRewardsConfigured)?;

        tracing::info!(
            user_id,
            slot,
            cost_points,
            reward_id = %reward.id,
            reward_type = ?reward.reward_type,
            "Roulette draw"
        );

        let record = RouletteSpinRecord {
            id: spin_id.clone(),
            user_id: user_id.to_string(),
            spin_date: date_key(today),
            slot,
            reward_id: reward.id.clone(),
            reward_name: reward.name.clone(),
            reward_type: reward.reward_type,
            reward_value: reward.reward_value,
            cost_points,
            created_at: self.clock.now_rfc3339(),
        };

        match self.store.insert_spin(&record).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                tracing::info!(user_id, slot, "Spin slot already taken");
                return Err(AppError::Conflict("Spin already in progress".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let coupon_granted = self.grant_reward(user_id, &spin_id, &reward).await?;
        let new_balance = self.ledger.balance(user_id).await?;

        let message = match reward.reward_type {
            RewardType::Nothing => "Better luck next time!".to_string(),
            _ => format!("Congratulations! You won {}!", reward.name),
        };

        Ok(SpinResult {
            success: true,
            spin_id,
            reward,
            message,
            cost_points,
            new_balance,
            coupon_granted,
        })
    }

    /// Credit the drawn reward. Returns whether a coupon was granted.
    async fn grant_reward(
        &self,
        user_id: &str,
        spin_id: &str,
        reward: &RouletteReward,
    ) -> Result<bool> {
        match reward.reward_type {
            RewardType::Points if reward.reward_value > 0 => {
                self.ledger
                    .credit(
                        user_id,
                        reward.reward_value,
                        LedgerReason::Roulette,
                        spin_id,
                        format!("Roulette reward: {}", reward.name),
                    )
                    .await?;
                Ok(false)
            }
            RewardType::Coupon => {
                let Some(coupon_id) = reward.coupon_id.as_deref() else {
                    tracing::warn!(reward_id = %reward.id, "Coupon reward without coupon_id");
                    return Ok(false);
                };

                match self.coupons.grant_coupon(user_id, coupon_id, spin_id).await {
                    Ok(()) => Ok(true),
                    Err(CouponError::AlreadyOwned) => {
                        tracing::info!(user_id, coupon_id, "Coupon already owned, crediting points");
                        self.ledger
                            .credit(
                                user_id,
                                self.settings.coupon_fallback_points,
                                LedgerReason::Roulette,
                                spin_id,
                                "Roulette reward (duplicate coupon converted to points)",
                            )
                            .await?;
                        Ok(false)
                    }
                    Err(e) => {
                        tracing::warn!(user_id, coupon_id, error = %e, "Coupon grant failed");
                        Ok(false)
                    }
                }
            }
            _ => Ok(false),
        }
    }

    /// Spin history, newest first.
    pub async fn history(&self, user_id: &str, page: u32) -> Result<Page<RouletteSpinRecord>> {
        let spins = match self.store.list_spins(user_id).await {
            Ok(spins) => spins,
            Err(StoreError::SchemaMissing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Page::from_sorted(spins, page, HISTORY_PAGE_SIZE))
    }

    /// Spin totals and per-reward distribution across all users.
    pub async fn stats(&self) -> Result<RouletteStats> {
        let spins = match self.store.list_all_spins().await {
            Ok(spins) => spins,
            Err(StoreError::SchemaMissing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let today = date_key(self.clock.today());
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for spin in &spins {
            *counts.entry(spin.reward_name.as_str()).or_default() += 1;
        }

        let mut reward_distribution: Vec<RewardCount> = counts
            .into_iter()
            .map(|(name, count)| RewardCount {
                reward_name: name.to_string(),
                count,
            })
            .collect();
        reward_distribution.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.reward_name.cmp(&b.reward_name))
        });

        Ok(RouletteStats {
            total_spins: spins.len() as u32,
            today_spins: spins.iter().filter(|s| s.spin_date == today).count() as u32,
            reward_distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn reward(id: &str, probability: u32) -> RouletteReward {
        RouletteReward {
            id: id.to_string(),
            name: id.to_string(),
            reward_type: RewardType::Nothing,
            reward_value: 0,
            probability,
            color: "#000000".to_string(),
            coupon_id: None,
            is_active: true,
            display_order: 0,
        }
    }

    #[test]
    fn test_empty_wheel_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(select_weighted(&[], &mut rng).is_none());
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let rewards = vec![reward("never", 0), reward("always", 10)];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            assert_eq!(select_weighted(&rewards, &mut rng).unwrap().id, "always");
        }
    }

    #[test]
    fn test_all_zero_weights_are_uniform() {
        let rewards = vec![reward("a", 0), reward("b", 0)];
        let mut rng = StdRng::seed_from_u64(11);
        let mut a = 0;
        for _ in 0..10_000 {
            if select_weighted(&rewards, &mut rng).unwrap().id == "a" {
                a += 1;
            }
        }
        assert!((4_700..=5_300).contains(&a), "a selected {} times", a);
    }
}
