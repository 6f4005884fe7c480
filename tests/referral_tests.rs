// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Referral engine tests: codes, recording, completion and expiry.

use rewards_ledger::db::RewardsStore;
use rewards_ledger::error::{AppError, Rejection};
use rewards_ledger::models::ReferralStatus;
use rewards_ledger::services::referral::{CODE_ALPHABET, CODE_LENGTH};

mod common;
use common::TestHarness;

#[tokio::test]
async fn test_code_is_created_once() {
    let h = TestHarness::at("2026-03-01");

    let first = h.state.referrals.ensure_code("alice").await.unwrap();
    let second = h.state.referrals.ensure_code("alice").await.unwrap();

    assert_eq!(first.code, second.code);
    assert_eq!(first.code.len(), CODE_LENGTH);
    assert!(first.code.bytes().all(|b| CODE_ALPHABET.contains(&b)));

    let owner = h.store.get_referral_code(&first.code).await.unwrap().unwrap();
    assert_eq!(owner.user_id, "alice");

    let bob = h.state.referrals.ensure_code("bob").await.unwrap();
    assert_ne!(bob.code, first.code);
}

#[tokio::test]
async fn test_share_url_points_at_signup() {
    let h = TestHarness::at("2026-03-01");
    assert_eq!(
        h.state.referrals.share_url("ABCD2345"),
        "http://localhost:5173/login?ref=ABCD2345"
    );
}

#[tokio::test]
async fn test_record_referral_creates_pending_edge() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;

    // Codes are matched case-insensitively
    let edge = h
        .state
        .referrals
        .record_referral(&format!(" {} ", code.to_lowercase()), "bob")
        .await
        .unwrap();

    assert_eq!(edge.referrer_id, "alice");
    assert_eq!(edge.referred_id, "bob");
    assert_eq!(edge.status, ReferralStatus::Pending);
    assert_eq!(edge.referrer_reward_points, 5000);
    assert_eq!(edge.referred_reward_points, 3000);

    // Nothing is credited until the first booking
    assert_eq!(h.balance("alice").await, 0);
    assert_eq!(h.balance("bob").await, 0);

    let stats = h.state.referrals.stats("alice").await.unwrap();
    assert_eq!(stats.total_referrals, 1);
    assert_eq!(stats.pending_referrals, 1);
}

#[tokio::test]
async fn test_record_referral_rejections() {
    let h = TestHarness::at("2026-03-01");
    let alice_code = h.state.referrals.ensure_code("alice").await.unwrap().code;
    let carol_code = h.state.referrals.ensure_code("carol").await.unwrap().code;

    let unknown = h.state.referrals.record_referral("NOPE2345", "bob").await;
    assert!(matches!(
        unknown,
        Err(AppError::Rejected(Rejection::InvalidReferralCode))
    ));

    let empty = h.state.referrals.record_referral("  ", "bob").await;
    assert!(matches!(
        empty,
        Err(AppError::Rejected(Rejection::InvalidReferralCode))
    ));

    let own = h.state.referrals.record_referral(&alice_code, "alice").await;
    assert!(matches!(
        own,
        Err(AppError::Rejected(Rejection::SelfReferral))
    ));

    h.state
        .referrals
        .record_referral(&alice_code, "bob")
        .await
        .unwrap();
    let twice = h.state.referrals.record_referral(&carol_code, "bob").await;
    assert!(matches!(
        twice,
        Err(AppError::Rejected(Rejection::AlreadyReferred))
    ));

    let edge = h.store.get_referral_edge("bob").await.unwrap().unwrap();
    assert_eq!(edge.referrer_id, "alice");
}

#[tokio::test]
async fn test_referrer_limit() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;

    for i in 0..50 {
        h.state
            .referrals
            .record_referral(&code, &format!("friend-{i}"))
            .await
            .unwrap();
    }

    let over = h.state.referrals.record_referral(&code, "friend-50").await;
    assert!(matches!(
        over,
        Err(AppError::Rejected(Rejection::ReferralLimitReached))
    ));
    assert!(h.store.get_referral_edge("friend-50").await.unwrap().is_none());
}

#[tokio::test]
async fn test_completion_credits_both_sides_once() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;
    h.state.referrals.record_referral(&code, "bob").await.unwrap();

    h.clock.advance_days(3);
    let completed = h
        .state
        .referrals
        .complete_referral("bob", "booking-1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(completed.status, ReferralStatus::Completed);
    assert_eq!(completed.first_booking_id.as_deref(), Some("booking-1"));
    assert!(completed.completed_at.is_some());
    assert_eq!(h.balance("alice").await, 5000);
    assert_eq!(h.balance("bob").await, 3000);

    // A retried completion (even with another booking) pays nothing more.
    let again = h
        .state
        .referrals
        .complete_referral("bob", "booking-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.first_booking_id.as_deref(), Some("booking-1"));
    assert_eq!(h.balance("alice").await, 5000);
    assert_eq!(h.balance("bob").await, 3000);

    let stats = h.state.referrals.stats("alice").await.unwrap();
    assert_eq!(stats.completed_referrals, 1);
    assert_eq!(stats.pending_referrals, 0);
    assert_eq!(stats.total_rewards_earned, 5000);
}

#[tokio::test]
async fn test_completion_without_referral_is_noop() {
    let h = TestHarness::at("2026-03-01");
    let result = h
        .state
        .referrals
        .complete_referral("nobody", "booking-1")
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_stale_referral_expires_instead_of_completing() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;
    h.state.referrals.record_referral(&code, "bob").await.unwrap();

    h.clock.advance_days(31);
    let result = h
        .state
        .referrals
        .complete_referral("bob", "booking-1")
        .await
        .unwrap();

    assert!(result.is_none());
    let edge = h.store.get_referral_edge("bob").await.unwrap().unwrap();
    assert_eq!(edge.status, ReferralStatus::Expired);
    assert!(edge.expired_at.is_some());
    assert_eq!(h.balance("alice").await, 0);
    assert_eq!(h.balance("bob").await, 0);
}

#[tokio::test]
async fn test_expire_stale_sweep() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;

    h.state.referrals.record_referral(&code, "bob").await.unwrap();
    h.clock.advance_days(20);
    h.state
        .referrals
        .record_referral(&code, "carol")
        .await
        .unwrap();
    h.clock.advance_days(11);

    assert_eq!(h.state.referrals.expire_stale().await.unwrap(), 1);
    // Already expired edges are not counted again
    assert_eq!(h.state.referrals.expire_stale().await.unwrap(), 0);

    let stats = h.state.referrals.stats("alice").await.unwrap();
    assert_eq!(stats.total_referrals, 2);
    assert_eq!(stats.pending_referrals, 1);
    assert_eq!(stats.completed_referrals, 0);

    // An expired edge can no longer complete
    let late = h
        .state
        .referrals
        .complete_referral("bob", "booking-1")
        .await
        .unwrap();
    assert!(late.is_none());
    assert_eq!(h.balance("alice").await, 0);
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;

    h.state.referrals.record_referral(&code, "bob").await.unwrap();
    h.clock.advance_days(1);
    h.state
        .referrals
        .record_referral(&code, "carol")
        .await
        .unwrap();

    let page = h.state.referrals.history("alice", 1).await.unwrap();
    let referred: Vec<_> = page.data.iter().map(|e| e.referred_id.as_str()).collect();
    assert_eq!(referred, vec!["carol", "bob"]);
}

#[tokio::test]
async fn test_pending_referral_view() {
    let h = TestHarness::at("2026-03-01");
    assert_eq!(h.state.referrals.pending_for("bob").await.unwrap(), None);
    assert_eq!(h.state.referrals.received("bob").await.unwrap(), None);

    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;
    h.state.referrals.record_referral(&code, "bob").await.unwrap();

    let pending = h.state.referrals.pending_for("bob").await.unwrap().unwrap();
    assert_eq!(pending.referrer_id, "alice");
    assert_eq!(pending.status, ReferralStatus::Pending);
    // The referrer has no pending referral of their own
    assert_eq!(h.state.referrals.pending_for("alice").await.unwrap(), None);

    h.state
        .referrals
        .complete_referral("bob", "booking-1")
        .await
        .unwrap();
    assert_eq!(h.state.referrals.pending_for("bob").await.unwrap(), None);
    let received = h.state.referrals.received("bob").await.unwrap().unwrap();
    assert_eq!(received.status, ReferralStatus::Completed);
}

#[tokio::test]
async fn test_stale_referral_is_not_pending() {
    let h = TestHarness::at("2026-03-01");
    let code = h.state.referrals.ensure_code("alice").await.unwrap().code;
    h.state.referrals.record_referral(&code, "bob").await.unwrap();

    h.clock.advance_days(31);

    // Not yet swept, but past the completion window
    assert_eq!(h.state.referrals.pending_for("bob").await.unwrap(), None);
    assert!(h.state.referrals.received("bob").await.unwrap().is_some());
}
