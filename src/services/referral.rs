// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Referral engine: invitation codes and referral edges.
//!
//! An edge is created `pending` when a new user applies a code and becomes
//! `completed` on the referred user's first booking, or `expired` once the
//! completion window has passed. Terminal transitions go through
//! [`RewardsStore::settle_referral`], which admits exactly one of them.

use crate::db::{RewardsStore, StoreError};
use crate::error::{AppError, Rejection, Result};
use crate::models::{LedgerReason, Page, ReferralCode, ReferralEdge, ReferralStats, ReferralStatus};
use crate::services::ledger::PointsLedger;
use crate::time_utils::{format_utc_rfc3339, Clock};
use chrono::Duration;
use rand::Rng;
use std::sync::Arc;

/// Unambiguous code alphabet (no 0/O, 1/I).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 5;

/// Page size for the referral history.
pub const HISTORY_PAGE_SIZE: u32 = 20;

/// Generate a random referral code.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralSettings {
    pub referrer_reward_points: i64,
    pub referred_reward_points: i64,
    pub max_per_user: u32,
    /// Days a pending referral may wait for the first booking
    pub expiry_days: i64,
    pub frontend_url: String,
}

impl Default for ReferralSettings {
    fn default() -> Self {
        Self {
            referrer_reward_points: 5000,
            referred_reward_points: 3000,
            max_per_user: 50,
            expiry_days: 30,
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

/// Referral engine.
pub struct ReferralService {
    store: Arc<dyn RewardsStore>,
    ledger: PointsLedger,
    clock: Arc<dyn Clock>,
    settings: ReferralSettings,
}

impl ReferralService {
    pub fn new(
        store: Arc<dyn RewardsStore>,
        ledger: PointsLedger,
        clock: Arc<dyn Clock>,
        settings: ReferralSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            settings,
        }
    }

    /// Return the user's code, creating it on first use.
    pub async fn ensure_code(&self, user_id: &str) -> Result<ReferralCode> {
        if let Some(existing) = self.store.get_referral_code_for_user(user_id).await? {
            return Ok(existing);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_code(&mut rand::thread_rng());
            let candidate = ReferralCode {
                user_id: user_id.to_string(),
                code,
                created_at: self.clock.now_rfc3339(),
            };

            match self.store.insert_referral_code(&candidate).await {
                Ok(()) => {}
                Err(StoreError::Conflict) => {
                    tracing::debug!(attempt, "Referral code collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            // A concurrent call may have claimed the owner slot first; its
            // code wins and ours stays resolvable to the same user.
            return match self.store.insert_referral_code_owner(&candidate).await {
                Ok(()) => {
                    tracing::info!(user_id, code = %candidate.code, "Referral code created");
                    Ok(candidate)
                }
                Err(StoreError::Conflict) => self
                    .store
                    .get_referral_code_for_user(user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::ServiceUnavailable("referral code not readable".to_string())
                    }),
                Err(e) => Err(e.into()),
            };
        }

        tracing::error!(user_id, "Could not allocate a unique referral code");
        Err(AppError::ServiceUnavailable(
            "Could not allocate a unique referral code".to_string(),
        ))
    }

    /// Apply `code` for a newly joined user, creating a pending edge.
    pub async fn record_referral(&self, code: &str, referred_id: &str) -> Result<ReferralEdge> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(Rejection::InvalidReferralCode.into());
        }

        let owner = self
            .store
            .get_referral_code(&code)
            .await?
            .ok_or(Rejection::InvalidReferralCode)?;

        if owner.user_id == referred_id {
            return Err(Rejection::SelfReferral.into());
        }
        if self.store.get_referral_edge(referred_id).await?.is_some() {
            return Err(Rejection::AlreadyReferred.into());
        }

        let existing = self
            .store
            .list_referrals_by_referrer(&owner.user_id)
            .await?
            .len();
        if existing >= self.settings.max_per_user as usize {
            return Err(Rejection::ReferralLimitReached.into());
        }

        let edge = ReferralEdge {
            id: ReferralEdge::key(referred_id),
            referrer_id: owner.user_id.clone(),
            referred_id: referred_id.to_string(),
            status: ReferralStatus::Pending,
            referrer_reward_points: self.settings.referrer_reward_points,
            referred_reward_points: self.settings.referred_reward_points,
            first_booking_id: None,
            created_at: self.clock.now_rfc3339(),
            completed_at: None,
            expired_at: None,
        };

        match self.store.insert_referral_edge(&edge).await {
            Ok(()) => {
                tracing::info!(
                    referrer_id = %edge.referrer_id,
                    referred_id,
                    "Referral recorded"
                );
                Ok(edge)
            }
            Err(StoreError::Conflict) => Err(Rejection::AlreadyReferred.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Complete the referral of `referred_id` after their first booking.
    ///
    /// Returns the completed edge, or `None` when there is nothing to
    /// complete. Calling it again for a completed edge re-issues the
    /// credits, which are idempotent.
    pub async fn complete_referral(
        &self,
        referred_id: &str,
        first_booking_id: &str,
    ) -> Result<Option<ReferralEdge>> {
        let Some(edge) = self.store.get_referral_edge(referred_id).await? else {
            return Ok(None);
        };

        match edge.status {
            ReferralStatus::Completed => {
                self.credit_both(&edge).await?;
                Ok(Some(edge))
            }
            ReferralStatus::Expired => Ok(None),
            ReferralStatus::Pending if self.is_stale(&edge) => {
                self.expire(edge).await?;
                Ok(None)
            }
            ReferralStatus::Pending => {
                let mut completed = edge;
                completed.status = ReferralStatus::Completed;
                completed.first_booking_id = Some(first_booking_id.to_string());
                completed.completed_at = Some(self.clock.now_rfc3339());

                match self.store.settle_referral(&completed).await {
                    Ok(()) => {
                        tracing::info!(
                            referrer_id = %completed.referrer_id,
                            referred_id,
                            first_booking_id,
                            "Referral completed"
                        );
                        self.credit_both(&completed).await?;
                        Ok(Some(completed))
                    }
                    Err(StoreError::Conflict) => {
                        let current = self.store.get_referral_edge(referred_id).await?;
                        match current {
                            Some(edge) if edge.status == ReferralStatus::Completed => {
                                self.credit_both(&edge).await?;
                                Ok(Some(edge))
                            }
                            _ => Ok(None),
                        }
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Expire every pending edge older than the completion window.
    pub async fn expire_stale(&self) -> Result<usize> {
        let stale = self
            .store
            .list_pending_referrals_before(&self.expiry_cutoff())
            .await?;

        let mut expired = 0;
        for edge in stale {
            if self.expire(edge).await? {
                expired += 1;
            }
        }

        tracing::info!(expired, "Referral expiry sweep finished");
        Ok(expired)
    }

    pub async fn stats(&self, user_id: &str) -> Result<ReferralStats> {
        match self.store.list_referrals_by_referrer(user_id).await {
            Ok(edges) => Ok(ReferralStats::from_edges(&edges)),
            Err(StoreError::SchemaMissing(_)) => Ok(ReferralStats::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Edges created by `user_id`, newest first.
    pub async fn history(&self, user_id: &str, page: u32) -> Result<Page<ReferralEdge>> {
        let edges = match self.store.list_referrals_by_referrer(user_id).await {
            Ok(edges) => edges,
            Err(StoreError::SchemaMissing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Page::from_sorted(edges, page, HISTORY_PAGE_SIZE))
    }

    /// The edge created when `user_id` applied a code, in any state.
    pub async fn received(&self, user_id: &str) -> Result<Option<ReferralEdge>> {
        match self.store.get_referral_edge(user_id).await {
            Ok(edge) => Ok(edge),
            Err(StoreError::SchemaMissing(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The caller's referral while it still waits for the first booking.
    ///
    /// A pending edge past the completion window is not reported, even
    /// before the sweep has expired it.
    pub async fn pending_for(&self, user_id: &str) -> Result<Option<ReferralEdge>> {
        let edge = self.received(user_id).await?;
        Ok(edge.filter(|e| e.status == ReferralStatus::Pending && !self.is_stale(e)))
    }

    /// Link that pre-fills `code` on the signup page.
    pub fn share_url(&self, code: &str) -> String {
        format!(
            "{}/login?ref={}",
            self.settings.frontend_url.trim_end_matches('/'),
            urlencoding::encode(code)
        )
    }

    fn expiry_cutoff(&self) -> String {
        format_utc_rfc3339(self.clock.now() - Duration::days(self.settings.expiry_days))
    }

    fn is_stale(&self, edge: &ReferralEdge) -> bool {
        edge.created_at < self.expiry_cutoff()
    }

    /// Returns false if the edge was settled concurrently.
    async fn expire(&self, mut edge: ReferralEdge) -> Result<bool> {
        edge.status = ReferralStatus::Expired;
        edge.expired_at = Some(self.clock.now_rfc3339());

        match self.store.settle_referral(&edge).await {
            Ok(()) => {
                tracing::info!(
                    referrer_id = %edge.referrer_id,
                    referred_id = %edge.referred_id,
                    "Referral expired"
                );
                Ok(true)
            }
            Err(StoreError::Conflict) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn credit_both(&self, edge: &ReferralEdge) -> Result<()> {
        self.ledger
            .credit(
                &edge.referrer_id,
                edge.referrer_reward_points,
                LedgerReason::ReferralReferrer,
                &edge.id,
                "Referral reward: your friend completed their first booking",
            )
            .await?;
        self.ledger
            .credit(
                &edge.referred_id,
                edge.referred_reward_points,
                LedgerReason::ReferralReferred,
                &edge.id,
                "Referral reward: welcome bonus",
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }
}
