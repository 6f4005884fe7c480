// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::NaiveDate;
use rewards_ledger::config::Config;
use rewards_ledger::db::{FirestoreDb, MemoryStore, RewardsStore};
use rewards_ledger::models::{RewardType, RouletteReward};
use rewards_ledger::routes::create_router;
use rewards_ledger::services::{CouponError, CouponIssuer};
use rewards_ledger::time_utils::FixedClock;
use rewards_ledger::AppState;
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

#[allow(dead_code)]
pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

/// Coupon issuer that records grants and answers with a preset outcome.
#[derive(Default)]
pub struct FakeCouponIssuer {
    pub outcome: Mutex<Option<CouponError>>,
    pub grants: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl FakeCouponIssuer {
    pub fn failing_with(err: CouponError) -> Self {
        Self {
            outcome: Mutex::new(Some(err)),
            grants: Mutex::new(Vec::new()),
        }
    }

    pub fn grant_count(&self) -> usize {
        self.grants.lock().unwrap().len()
    }
}

#[async_trait]
impl CouponIssuer for FakeCouponIssuer {
    async fn grant_coupon(
        &self,
        user_id: &str,
        coupon_id: &str,
        _source_id: &str,
    ) -> Result<(), CouponError> {
        if let Some(err) = self.outcome.lock().unwrap().clone() {
            return Err(err);
        }
        self.grants
            .lock()
            .unwrap()
            .push((user_id.to_string(), coupon_id.to_string()));
        Ok(())
    }
}

/// Engines wired to an in-memory store and a fixed clock.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub coupons: Arc<FakeCouponIssuer>,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
impl TestHarness {
    /// Harness starting at noon UTC on `date`.
    pub fn at(date: &str) -> Self {
        Self::with_store(MemoryStore::new(), date)
    }

    /// Harness whose store has no server-side procedures.
    pub fn fallback_at(date: &str) -> Self {
        Self::with_store(MemoryStore::without_procedures(), date)
    }

    pub fn with_store(store: MemoryStore, date: &str) -> Self {
        Self::build(store, date, FakeCouponIssuer::default())
    }

    pub fn build(store: MemoryStore, date: &str, coupons: FakeCouponIssuer) -> Self {
        let store = Arc::new(store);
        let clock = Arc::new(FixedClock::at_date(day(date)));
        let coupons = Arc::new(coupons);
        let state = Arc::new(AppState::new(
            Config::test_default(),
            store.clone(),
            clock.clone(),
            coupons.clone(),
        ));
        Self {
            store,
            clock,
            coupons,
            state,
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    pub async fn balance(&self, user_id: &str) -> i64 {
        self.state.ledger.balance(user_id).await.unwrap()
    }

    pub async fn seed_rewards(&self, rewards: &[RouletteReward]) {
        for reward in rewards {
            self.store.upsert_reward(reward).await.unwrap();
        }
    }
}

#[allow(dead_code)]
pub fn reward(id: &str, reward_type: RewardType, value: i64, probability: u32) -> RouletteReward {
    RouletteReward {
        id: id.to_string(),
        name: id.to_string(),
        reward_type,
        reward_value: value,
        probability,
        color: "#FFFFFF".to_string(),
        coupon_id: (reward_type == RewardType::Coupon).then(|| format!("coupon-{}", id)),
        is_active: true,
        display_order: 0,
    }
}

/// Create a test JWT token for `user_id`.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    rewards_ledger::middleware::auth::create_jwt(user_id, signing_key).unwrap()
}

/// Create a test app with an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let harness = TestHarness::at("2026-03-01");
    (harness.router(), harness.state)
}
