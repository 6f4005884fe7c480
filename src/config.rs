// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read once at startup.

use crate::models::{AttendanceRules, MilestoneSchedule};
use crate::services::{ReferralSettings, RouletteSettings};
use std::env;
use std::str::FromStr;

/// Which [`crate::db::RewardsStore`] implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// In-process store for local development (data is lost on restart)
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and share links
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Offset of the users' calendar from UTC, in hours
    pub user_utc_offset_hours: i32,
    /// Coupon issuance service; coupon rewards are not granted when unset
    pub coupon_service_url: Option<String>,

    // --- Reward rules ---
    pub attendance_base_points: i64,
    pub streak_milestones: MilestoneSchedule,
    pub roulette_spin_cost: i64,
    pub roulette_max_daily_spins: u32,
    /// Points credited instead of a coupon the user already owns
    pub roulette_coupon_fallback_points: i64,
    pub referrer_reward_points: i64,
    pub referred_reward_points: i64,
    pub referral_max_per_user: u32,
    pub referral_expiry_days: i64,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Shared secret for internal (service-to-service) routes
    pub internal_api_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// For local development, values can be set in a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let milestones = match env::var("STREAK_MILESTONES") {
            Ok(raw) => MilestoneSchedule::parse(&raw)
                .ok_or(ConfigError::Invalid("STREAK_MILESTONES", raw))?,
            Err(_) => MilestoneSchedule::default(),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend: parse_or("STORE_BACKEND", StoreBackend::Firestore)?,
            user_utc_offset_hours: parse_or("USER_UTC_OFFSET_HOURS", 9)?,
            coupon_service_url: env::var("COUPON_SERVICE_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),

            attendance_base_points: parse_or("ATTENDANCE_BASE_POINTS", 10)?,
            streak_milestones: milestones,
            roulette_spin_cost: parse_or("ROULETTE_SPIN_COST", 500)?,
            roulette_max_daily_spins: parse_or("ROULETTE_MAX_DAILY_SPINS", 5)?,
            roulette_coupon_fallback_points: parse_or("ROULETTE_COUPON_FALLBACK_POINTS", 100)?,
            referrer_reward_points: parse_or("REFERRER_REWARD_POINTS", 5000)?,
            referred_reward_points: parse_or("REFERRED_REWARD_POINTS", 3000)?,
            referral_max_per_user: parse_or("REFERRAL_MAX_PER_USER", 50)?,
            referral_expiry_days: parse_or("REFERRAL_EXPIRY_DAYS", 30)?,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            internal_api_token: env::var("INTERNAL_API_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("INTERNAL_API_TOKEN"))?,
        })
    }

    /// Config for tests: default rules, memory store, fixed secrets.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            user_utc_offset_hours: 0,
            coupon_service_url: None,
            attendance_base_points: 10,
            streak_milestones: MilestoneSchedule::default(),
            roulette_spin_cost: 500,
            roulette_max_daily_spins: 5,
            roulette_coupon_fallback_points: 100,
            referrer_reward_points: 5000,
            referred_reward_points: 3000,
            referral_max_per_user: 50,
            referral_expiry_days: 30,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            internal_api_token: "test_internal_token".to_string(),
        }
    }

    pub fn attendance_rules(&self) -> AttendanceRules {
        AttendanceRules {
            base_points: self.attendance_base_points,
            milestones: self.streak_milestones.clone(),
        }
    }

    pub fn roulette_settings(&self) -> RouletteSettings {
        RouletteSettings {
            spin_cost: self.roulette_spin_cost,
            max_daily_spins: self.roulette_max_daily_spins,
            coupon_fallback_points: self.roulette_coupon_fallback_points,
        }
    }

    pub fn referral_settings(&self) -> ReferralSettings {
        ReferralSettings {
            referrer_reward_points: self.referrer_reward_points,
            referred_reward_points: self.referred_reward_points,
            max_per_user: self.referral_max_per_user,
            expiry_days: self.referral_expiry_days,
            frontend_url: self.frontend_url.clone(),
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the process-wide environment is not mutated concurrently.
    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("INTERNAL_API_TOKEN", " internal ");
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("STREAK_MILESTONES", "3:5,10:20");
        env::set_var("ROULETTE_SPIN_COST", "250");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.internal_api_token, "internal");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.roulette_spin_cost, 250);
        assert_eq!(config.roulette_max_daily_spins, 5);
        assert_eq!(config.streak_milestones.bonus_for(10), 20);
        assert_eq!(config.streak_milestones.bonus_for(7), 0);

        env::set_var("ROULETTE_SPIN_COST", "lots");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ROULETTE_SPIN_COST", _))
        ));
        env::remove_var("ROULETTE_SPIN_COST");
        env::remove_var("STREAK_MILESTONES");
    }
}
