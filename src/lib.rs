// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Rewards ledger: attendance streaks, roulette draws and referral grants
//!
//! This crate provides the backend API for the platform's gamified rewards.
//! Every engine credits one append-only points ledger, and every credit is
//! keyed so that retries and duplicate requests never count twice.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::RewardsStore;
use services::{AttendanceService, CouponIssuer, PointsLedger, ReferralService, RouletteService};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RewardsStore>,
    pub clock: Arc<dyn Clock>,
    pub ledger: PointsLedger,
    pub attendance: AttendanceService,
    pub roulette: RouletteService,
    pub referrals: ReferralService,
}

impl AppState {
    /// Wire every engine to one store and one clock.
    pub fn new(
        config: Config,
        store: Arc<dyn RewardsStore>,
        clock: Arc<dyn Clock>,
        coupons: Arc<dyn CouponIssuer>,
    ) -> Self {
        let ledger = PointsLedger::new(store.clone(), clock.clone());
        let attendance = AttendanceService::new(
            store.clone(),
            ledger.clone(),
            clock.clone(),
            config.attendance_rules(),
        );
        let roulette = RouletteService::new(
            store.clone(),
            ledger.clone(),
            coupons,
            clock.clone(),
            config.roulette_settings(),
        );
        let referrals = ReferralService::new(
            store.clone(),
            ledger.clone(),
            clock.clone(),
            config.referral_settings(),
        );

        Self {
            config,
            store,
            clock,
            ledger,
            attendance,
            roulette,
            referrals,
        }
    }
}
