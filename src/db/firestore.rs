// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`RewardsStore`].
//!
//! Provides typed operations for:
//! - Point ledger entries (create-only, keyed by idempotence key)
//! - Attendance records (create-only, keyed by user and date)
//! - Roulette rewards and spin records
//! - Referral codes, edges and terminal-state markers
//!
//! Create-only writes use an `Exists(false)` precondition so Firestore
//! rejects duplicates server-side. The attendance "procedure" commits the
//! record and its ledger credits in one transaction.

use crate::db::{collections, RewardsStore, StoreError, StoreResult};
use crate::models::attendance::date_key;
use crate::models::{
    AttendanceRecord, AttendanceResult, AttendanceRules, LedgerEntry, ReferralCode, ReferralEdge,
    ReferralStatus, RouletteReward, RouletteSpinRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use firestore::errors::FirestoreError;
use firestore::{FirestoreQueryDirection, FirestoreWritePrecondition};
use serde::{Deserialize, Serialize};

/// Marker written once when a referral edge reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReferralOutcome {
    edge_id: String,
    status: ReferralStatus,
    settled_at: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> StoreResult<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> StoreResult<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return [`StoreError::Unavailable`].
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> StoreResult<&firestore::FirestoreDb> {
        self.client.as_ref().ok_or_else(|| {
            StoreError::Unavailable("Database not connected (offline mode)".to_string())
        })
    }

    /// Write any ledger credits missing for an existing check-in.
    ///
    /// A record written without its credits (by a fallback check-in that
    /// died before crediting) is completed here; credits that already
    /// exist are left alone.
    async fn restore_credits(&self, record: &AttendanceRecord, now: &str) -> StoreResult<()> {
        for entry in record.ledger_entries(now) {
            match self.insert_ledger_entry(&entry).await {
                Ok(()) => {
                    tracing::info!(
                        user_id = %record.user_id,
                        entry_id = %entry.id,
                        "Restored missing check-in credit"
                    );
                }
                Err(StoreError::Conflict) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ─── Generic Helpers ─────────────────────────────────────────

    async fn get_doc<T>(&self, collection: &'static str, id: &str) -> StoreResult<Option<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| map_query_error(collection, e))
    }

    /// Create a document, failing with [`StoreError::Conflict`] if it exists.
    async fn create_doc<T>(&self, collection: &'static str, id: &str, obj: &T) -> StoreResult<()>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(id)
            .object(obj)
            .execute()
            .await
            .map_err(map_write_error)?;
        Ok(())
    }
}

// ─── Error Mapping ───────────────────────────────────────────────

/// Map a read/query error.
///
/// A query that needs an index the deployment has not created fails with
/// FAILED_PRECONDITION; that is how an unmigrated deployment shows up.
fn map_query_error(collection: &'static str, err: FirestoreError) -> StoreError {
    let msg = err.to_string();
    match err {
        FirestoreError::NetworkError(_) => StoreError::Unavailable(msg),
        FirestoreError::DatabaseError(ref db_err) if db_err.retry_possible => {
            StoreError::Unavailable(msg)
        }
        _ if is_failed_precondition(&msg) => {
            tracing::warn!(collection, error = %msg, "Collection not provisioned");
            StoreError::SchemaMissing(collection)
        }
        _ => StoreError::Backend(msg),
    }
}

/// Map a write/commit error. Precondition failures are duplicate writes.
fn map_write_error(err: FirestoreError) -> StoreError {
    let msg = err.to_string();
    match err {
        FirestoreError::DataConflictError(_) => StoreError::Conflict,
        FirestoreError::NetworkError(_) => StoreError::Unavailable(msg),
        _ if msg.contains("AlreadyExists")
            || msg.contains("ALREADY_EXISTS")
            || is_failed_precondition(&msg) =>
        {
            StoreError::Conflict
        }
        FirestoreError::DatabaseError(ref db_err) if db_err.retry_possible => {
            StoreError::Unavailable(msg)
        }
        _ => StoreError::Backend(msg),
    }
}

fn is_failed_precondition(msg: &str) -> bool {
    msg.contains("FailedPrecondition") || msg.contains("FAILED_PRECONDITION")
}

#[async_trait]
impl RewardsStore for FirestoreDb {
    // ─── Ledger Operations ───────────────────────────────────────

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        self.create_doc(collections::LEDGER, &entry.id, entry).await
    }

    async fn get_ledger_entry(&self, id: &str) -> StoreResult<Option<LedgerEntry>> {
        self.get_doc(collections::LEDGER, id).await
    }

    async fn list_ledger_entries(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::LEDGER)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::LEDGER, e))
    }

    // ─── Attendance Operations ───────────────────────────────────

    async fn get_attendance(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        self.get_doc(collections::ATTENDANCE, &AttendanceRecord::key(user_id, date))
            .await
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        self.create_doc(collections::ATTENDANCE, &record.id, record)
            .await
    }

    async fn list_attendance(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let user_id = user_id.to_string();
        let from = from.map(date_key);
        let to = to.map(date_key);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::ATTENDANCE)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    from.clone()
                        .and_then(|d| q.field("check_date").greater_than_or_equal(d)),
                    to.clone()
                        .and_then(|d| q.field("check_date").less_than_or_equal(d)),
                ])
            })
            .order_by([("check_date", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ATTENDANCE, e))
    }

    /// Check in atomically: the record and its ledger credits are committed
    /// in one transaction, each guarded by a create-only precondition.
    ///
    /// If a concurrent request commits first, the precondition fails and the
    /// winner's record is returned as an already-checked result.
    async fn check_attendance(
        &self,
        user_id: &str,
        today: NaiveDate,
        rules: &AttendanceRules,
        now: &str,
    ) -> StoreResult<AttendanceResult> {
        if let Some(existing) = self.get_attendance(user_id, today).await? {
            self.restore_credits(&existing, now).await?;
            return Ok(AttendanceResult::already_checked(&existing));
        }

        let yesterday = match today.pred_opt() {
            Some(d) => self.get_attendance(user_id, d).await?,
            None => None,
        };
        let record = rules.new_record(user_id, today, yesterday.as_ref(), now);
        let entries = record.ledger_entries(now);

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::ATTENDANCE)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&record.id)
            .object(&record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add attendance to transaction: {}", e))
            })?;

        for entry in &entries {
            client
                .fluent()
                .update()
                .in_col(collections::LEDGER)
                .precondition(FirestoreWritePrecondition::Exists(false))
                .document_id(&entry.id)
                .object(entry)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    StoreError::Backend(format!("Failed to add credit to transaction: {}", e))
                })?;
        }

        match transaction.commit().await.map_err(map_write_error) {
            Ok(_) => {
                tracing::info!(
                    user_id,
                    streak_days = record.streak_days,
                    bonus_points = record.bonus_points,
                    "Attendance committed atomically"
                );
                Ok(AttendanceResult::accepted(&record))
            }
            Err(StoreError::Conflict) => {
                tracing::debug!(user_id, "Concurrent check-in won the commit");
                let winner = self.get_attendance(user_id, today).await?.ok_or_else(|| {
                    StoreError::Unavailable("check-in conflict but no record found".to_string())
                })?;
                self.restore_credits(&winner, now).await?;
                Ok(AttendanceResult::already_checked(&winner))
            }
            Err(e) => Err(e),
        }
    }

    // The read procedures are answered by the fallback queries; Firestore
    // has no cheaper server-side aggregate for them.

    // ─── Roulette Operations ─────────────────────────────────────

    async fn list_active_rewards(&self) -> StoreResult<Vec<RouletteReward>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROULETTE_REWARDS)
            .filter(|q| q.for_all([q.field("is_active").eq(true)]))
            .order_by([("display_order", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ROULETTE_REWARDS, e))
    }

    async fn list_all_rewards(&self) -> StoreResult<Vec<RouletteReward>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROULETTE_REWARDS)
            .order_by([("display_order", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ROULETTE_REWARDS, e))
    }

    async fn get_reward(&self, id: &str) -> StoreResult<Option<RouletteReward>> {
        self.get_doc(collections::ROULETTE_REWARDS, id).await
    }

    async fn upsert_reward(&self, reward: &RouletteReward) -> StoreResult<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ROULETTE_REWARDS)
            .document_id(&reward.id)
            .object(reward)
            .execute()
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn list_spins_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<RouletteSpinRecord>> {
        let user_id = user_id.to_string();
        let day = date_key(date);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROULETTE_SPINS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("spin_date").eq(day.clone()),
                ])
            })
            .order_by([("slot", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ROULETTE_SPINS, e))
    }

    async fn list_spins(&self, user_id: &str) -> StoreResult<Vec<RouletteSpinRecord>> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROULETTE_SPINS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ROULETTE_SPINS, e))
    }

    async fn list_all_spins(&self) -> StoreResult<Vec<RouletteSpinRecord>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROULETTE_SPINS)
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::ROULETTE_SPINS, e))
    }

    async fn insert_spin(&self, record: &RouletteSpinRecord) -> StoreResult<()> {
        self.create_doc(collections::ROULETTE_SPINS, &record.id, record)
            .await
    }

    // ─── Referral Operations ─────────────────────────────────────

    async fn get_referral_code(&self, code: &str) -> StoreResult<Option<ReferralCode>> {
        self.get_doc(collections::REFERRAL_CODES, code).await
    }

    async fn get_referral_code_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Option<ReferralCode>> {
        self.get_doc(
            collections::REFERRAL_CODE_OWNERS,
            &urlencoding::encode(user_id),
        )
        .await
    }

    async fn insert_referral_code(&self, code: &ReferralCode) -> StoreResult<()> {
        self.create_doc(collections::REFERRAL_CODES, &code.code, code)
            .await
    }

    async fn insert_referral_code_owner(&self, code: &ReferralCode) -> StoreResult<()> {
        self.create_doc(
            collections::REFERRAL_CODE_OWNERS,
            &urlencoding::encode(&code.user_id),
            code,
        )
        .await
    }

    async fn get_referral_edge(&self, referred_id: &str) -> StoreResult<Option<ReferralEdge>> {
        self.get_doc(collections::REFERRALS, &ReferralEdge::key(referred_id))
            .await
    }

    async fn insert_referral_edge(&self, edge: &ReferralEdge) -> StoreResult<()> {
        self.create_doc(collections::REFERRALS, &edge.id, edge).await
    }

    async fn list_referrals_by_referrer(
        &self,
        referrer_id: &str,
    ) -> StoreResult<Vec<ReferralEdge>> {
        let referrer_id = referrer_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REFERRALS)
            .filter(move |q| q.for_all([q.field("referrer_id").eq(referrer_id.clone())]))
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::REFERRALS, e))
    }

    async fn list_pending_referrals_before(
        &self,
        created_before: &str,
    ) -> StoreResult<Vec<ReferralEdge>> {
        let created_before = created_before.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REFERRALS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq("pending"),
                    q.field("created_at").less_than(created_before.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| map_query_error(collections::REFERRALS, e))
    }

    /// Settle an edge: the create-only outcome marker and the edge update
    /// commit together, so only the first terminal transition wins.
    async fn settle_referral(&self, edge: &ReferralEdge) -> StoreResult<()> {
        if !edge.status.is_terminal() {
            return Err(StoreError::Backend(
                "settle_referral requires a terminal status".to_string(),
            ));
        }

        let outcome = ReferralOutcome {
            edge_id: edge.id.clone(),
            status: edge.status,
            settled_at: edge
                .completed_at
                .clone()
                .or_else(|| edge.expired_at.clone())
                .unwrap_or_default(),
        };

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::REFERRAL_OUTCOMES)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&edge.id)
            .object(&outcome)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add outcome to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::REFERRALS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&edge.id)
            .object(edge)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add edge to transaction: {}", e))
            })?;

        transaction.commit().await.map_err(map_write_error)?;

        tracing::info!(
            edge_id = %edge.id,
            status = ?edge.status,
            "Referral settled"
        );

        Ok(())
    }
}
