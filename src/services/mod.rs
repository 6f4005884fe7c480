// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod attendance;
pub mod coupon;
pub mod ledger;
pub mod referral;
pub mod roulette;

pub use attendance::{AttendancePath, AttendanceService, FallbackPath, ProcedurePath};
pub use coupon::{CouponError, CouponIssuer, DisabledCouponIssuer, HttpCouponIssuer};
pub use ledger::PointsLedger;
pub use referral::{ReferralService, ReferralSettings};
pub use roulette::{select_weighted, RouletteService, RouletteSettings};
