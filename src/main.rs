// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rewards Ledger API Server
//!
//! Serves daily attendance check-ins, the roulette wheel and referral
//! rewards for the booking platform, all backed by one points ledger.

use rewards_ledger::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, RewardsStore},
    models::{RewardType, RouletteReward},
    services::{CouponIssuer, DisabledCouponIssuer, HttpCouponIssuer},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting Rewards Ledger API"
    );

    let store: Arc<dyn RewardsStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            let store = MemoryStore::new();
            for reward in demo_wheel() {
                store.upsert_reward(&reward).await?;
            }
            Arc::new(store)
        }
    };

    let coupons: Arc<dyn CouponIssuer> = match &config.coupon_service_url {
        Some(url) => {
            tracing::info!(url = %url, "Coupon service configured");
            Arc::new(HttpCouponIssuer::new(
                url.clone(),
                config.internal_api_token.clone(),
            ))
        }
        None => {
            tracing::warn!("COUPON_SERVICE_URL not set; coupon rewards will not be granted");
            Arc::new(DisabledCouponIssuer)
        }
    };

    let clock = Arc::new(SystemClock::new(config.user_utc_offset_hours));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store, clock, coupons));

    // Build router
    let app = rewards_ledger::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Wheel used by the in-memory backend so local development can spin.
fn demo_wheel() -> Vec<RouletteReward> {
    [
        ("points-100", "100P", RewardType::Points, 100, 40, "#F59E0B"),
        ("points-500", "500P", RewardType::Points, 500, 15, "#10B981"),
        ("points-1000", "1000P", RewardType::Points, 1000, 5, "#3B82F6"),
        ("miss", "Try again", RewardType::Nothing, 0, 40, "#9CA3AF"),
    ]
    .into_iter()
    .enumerate()
    .map(
        |(order, (id, name, reward_type, reward_value, probability, color))| RouletteReward {
            id: id.to_string(),
            name: name.to_string(),
            reward_type,
            reward_value,
            probability,
            color: color.to_string(),
            coupon_id: None,
            is_active: true,
            display_order: order as i32,
        },
    )
    .collect()
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rewards_ledger=debug,info")),
        )
        .with(format)
        .init();
}
