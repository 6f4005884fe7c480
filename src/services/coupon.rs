// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coupon issuance collaborator.
//!
//! Coupons are owned by a separate service; roulette only asks it to grant
//! one. A failed grant never rolls back the spin that won it.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    /// The user already holds this coupon.
    #[error("Coupon already owned")]
    AlreadyOwned,

    #[error("Coupon issuance disabled")]
    Disabled,

    #[error("Coupon service error: {0}")]
    Service(String),
}

/// Grants coupons to users.
#[async_trait]
pub trait CouponIssuer: Send + Sync {
    async fn grant_coupon(
        &self,
        user_id: &str,
        coupon_id: &str,
        source_id: &str,
    ) -> Result<(), CouponError>;
}

#[derive(Debug, Serialize)]
struct GrantRequest<'a> {
    user_id: &'a str,
    coupon_id: &'a str,
    /// Lets the coupon service deduplicate retried grants
    source_id: &'a str,
}

/// HTTP client for the coupon service.
///
/// POST {base_url}/coupons/grant
/// x-internal-token: {token}
///
/// 409 Conflict means the user already owns the coupon.
pub struct HttpCouponIssuer {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpCouponIssuer {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl CouponIssuer for HttpCouponIssuer {
    async fn grant_coupon(
        &self,
        user_id: &str,
        coupon_id: &str,
        source_id: &str,
    ) -> Result<(), CouponError> {
        let url = format!("{}/coupons/grant", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-internal-token", &self.token)
            .json(&GrantRequest {
                user_id,
                coupon_id,
                source_id,
            })
            .send()
            .await
            .map_err(|e| CouponError::Service(format!("Grant request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 409 {
            return Err(CouponError::AlreadyOwned);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CouponError::Service(format!("HTTP {}: {}", status, body)))
    }
}

/// Used when no coupon service is configured.
pub struct DisabledCouponIssuer;

#[async_trait]
impl CouponIssuer for DisabledCouponIssuer {
    async fn grant_coupon(
        &self,
        _user_id: &str,
        _coupon_id: &str,
        _source_id: &str,
    ) -> Result<(), CouponError> {
        Err(CouponError::Disabled)
    }
}
