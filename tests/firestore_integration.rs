// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Set FIRESTORE_EMULATOR_HOST to run them; they are skipped otherwise.
//!
//! The emulator keeps state between tests, so every test uses fresh user ids.

use rewards_ledger::config::Config;
use rewards_ledger::db::{RewardsStore, StoreError};
use rewards_ledger::models::{
    AttendanceRules, LedgerEntry, LedgerReason, ReferralCode, ReferralEdge, ReferralStatus,
};
use rewards_ledger::time_utils::{Clock, FixedClock};
use rewards_ledger::AppState;
use std::sync::Arc;

mod common;
use common::{day, test_db, FakeCouponIssuer};

/// Generate a unique user id for test isolation.
fn unique_user(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn pending_edge(referrer: &str, referred: &str) -> ReferralEdge {
    ReferralEdge {
        id: ReferralEdge::key(referred),
        referrer_id: referrer.to_string(),
        referred_id: referred.to_string(),
        status: ReferralStatus::Pending,
        referrer_reward_points: 5000,
        referred_reward_points: 3000,
        first_booking_id: None,
        created_at: "2026-03-01T12:00:00Z".to_string(),
        completed_at: None,
        expired_at: None,
    }
}

#[tokio::test]
async fn test_ledger_entry_is_create_only() {
    require_emulator!();
    let db = test_db().await;
    let user = unique_user("ledger");

    let entry = LedgerEntry::new(
        &user,
        10,
        LedgerReason::Attendance,
        "att-1",
        "Check-in",
        "2026-03-01T12:00:00Z",
    );
    db.insert_ledger_entry(&entry).await.unwrap();

    let again = db.insert_ledger_entry(&entry).await;
    assert_eq!(again, Err(StoreError::Conflict));

    let entries = db.list_ledger_entries(&user).await.unwrap();
    assert_eq!(entries, vec![entry.clone()]);
    assert_eq!(db.get_ledger_entry(&entry.id).await.unwrap(), Some(entry));
}

#[tokio::test]
async fn test_attendance_range_query() {
    require_emulator!();
    let db = test_db().await;
    let user = unique_user("attendance");
    let rules = AttendanceRules::default();

    let mut prior = None;
    for date in ["2026-02-28", "2026-03-01", "2026-03-02"] {
        let record = rules.new_record(&user, day(date), prior.as_ref(), "2026-03-02T12:00:00Z");
        db.insert_attendance(&record).await.unwrap();
        prior = Some(record);
    }

    let march = db
        .list_attendance(&user, Some(day("2026-03-01")), Some(day("2026-03-31")))
        .await
        .unwrap();
    let dates: Vec<_> = march.iter().map(|r| r.check_date.as_str()).collect();
    assert_eq!(dates, vec!["2026-03-01", "2026-03-02"]);
    assert_eq!(march[1].streak_days, 3);

    let today = db.get_attendance(&user, day("2026-03-02")).await.unwrap();
    assert!(today.is_some());
}

#[tokio::test]
async fn test_transactional_check_in() {
    require_emulator!();
    let db = test_db().await;
    let user = unique_user("checkin");
    let rules = AttendanceRules::default();

    let first = db
        .check_attendance(&user, day("2026-03-01"), &rules, "2026-03-01T12:00:00Z")
        .await
        .unwrap();
    assert!(first.accepted);

    let second = db
        .check_attendance(&user, day("2026-03-01"), &rules, "2026-03-01T12:00:01Z")
        .await
        .unwrap();
    assert!(second.already_checked);

    let entries = db.list_ledger_entries(&user).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, 10);
}

#[tokio::test]
async fn test_referral_code_uniqueness() {
    require_emulator!();
    let db = test_db().await;
    let user = unique_user("code");
    let code = ReferralCode {
        user_id: user.clone(),
        code: unique_user("C").to_uppercase(),
        created_at: "2026-03-01T12:00:00Z".to_string(),
    };

    db.insert_referral_code(&code).await.unwrap();
    db.insert_referral_code_owner(&code).await.unwrap();
    assert_eq!(
        db.insert_referral_code(&code).await,
        Err(StoreError::Conflict)
    );

    let by_user = db.get_referral_code_for_user(&user).await.unwrap();
    assert_eq!(by_user, Some(code.clone()));
    let by_code = db.get_referral_code(&code.code).await.unwrap();
    assert_eq!(by_code.map(|c| c.user_id), Some(user));
}

#[tokio::test]
async fn test_referral_settles_once() {
    require_emulator!();
    let db = test_db().await;
    let referrer = unique_user("referrer");
    let referred = unique_user("referred");

    db.insert_referral_edge(&pending_edge(&referrer, &referred))
        .await
        .unwrap();

    let mut completed = pending_edge(&referrer, &referred);
    completed.status = ReferralStatus::Completed;
    completed.first_booking_id = Some("booking-1".to_string());
    db.settle_referral(&completed).await.unwrap();

    let mut expired = pending_edge(&referrer, &referred);
    expired.status = ReferralStatus::Expired;
    assert_eq!(db.settle_referral(&expired).await, Err(StoreError::Conflict));

    let stored = db.get_referral_edge(&referred).await.unwrap().unwrap();
    assert_eq!(stored.status, ReferralStatus::Completed);

    let by_referrer = db.list_referrals_by_referrer(&referrer).await.unwrap();
    assert_eq!(by_referrer.len(), 1);
}

#[tokio::test]
async fn test_engines_against_emulator() {
    require_emulator!();
    let store: Arc<dyn RewardsStore> = Arc::new(test_db().await);
    let clock = Arc::new(FixedClock::at_date(day("2026-03-01")));
    let state = AppState::new(
        Config::test_default(),
        store,
        clock.clone(),
        Arc::new(FakeCouponIssuer::default()),
    );
    let referrer = unique_user("engine-referrer");
    let referred = unique_user("engine-referred");

    let result = state.attendance.check_in(&referrer).await.unwrap();
    assert!(result.accepted);
    assert_eq!(clock.today(), day("2026-03-01"));

    let code = state.referrals.ensure_code(&referrer).await.unwrap();
    state
        .referrals
        .record_referral(&code.code, &referred)
        .await
        .unwrap();
    state
        .referrals
        .complete_referral(&referred, "booking-1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.ledger.balance(&referrer).await.unwrap(), 5010);
    assert_eq!(state.ledger.balance(&referred).await.unwrap(), 3000);
}

#[tokio::test]
async fn test_transactional_check_in_restores_missing_credits() {
    require_emulator!();
    let db = test_db().await;
    let user = unique_user("restore");
    let rules = AttendanceRules::default();

    // Record without credits, as left by an interrupted fallback check-in
    let record = rules.new_record(&user, day("2026-03-01"), None, "2026-03-01T12:00:00Z");
    db.insert_attendance(&record).await.unwrap();

    let result = db
        .check_attendance(&user, day("2026-03-01"), &rules, "2026-03-01T12:00:01Z")
        .await
        .unwrap();
    assert!(result.already_checked);

    let entries = db.list_ledger_entries(&user).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, 10);
}

#[tokio::test]
async fn test_reward_listing_includes_inactive() {
    require_emulator!();
    let db = test_db().await;
    let id = unique_user("reward");
    let reward = rewards_ledger::models::RouletteReward {
        id: id.clone(),
        name: "Inactive".to_string(),
        reward_type: rewards_ledger::models::RewardType::Nothing,
        reward_value: 0,
        probability: 1,
        color: "#000000".to_string(),
        coupon_id: None,
        is_active: false,
        display_order: 0,
    };
    db.upsert_reward(&reward).await.unwrap();

    assert_eq!(db.get_reward(&id).await.unwrap(), Some(reward));
    assert!(db.list_all_rewards().await.unwrap().iter().any(|r| r.id == id));
    assert!(!db.list_active_rewards().await.unwrap().iter().any(|r| r.id == id));
}
