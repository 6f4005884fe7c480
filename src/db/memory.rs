// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store for local development and tests.
//!
//! All tables live behind one lock, so the attendance procedures run
//! atomically the same way a server-side procedure would. Failure switches
//! let tests exercise the fallback path, unprovisioned collections and
//! transient outages.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::db::{collections, procedures, RewardsStore, StoreError, StoreResult};
use crate::models::attendance::date_key;
use crate::models::{
    AttendanceRecord, AttendanceResult, AttendanceRules, AttendanceStats, LedgerEntry,
    MonthlyAttendance, ReferralCode, ReferralEdge, ReferralStatus, RouletteReward,
    RouletteSpinRecord,
};

#[derive(Default)]
struct Tables {
    ledger: BTreeMap<String, LedgerEntry>,
    attendance: BTreeMap<String, AttendanceRecord>,
    rewards: BTreeMap<String, RouletteReward>,
    spins: BTreeMap<String, RouletteSpinRecord>,
    referral_codes: BTreeMap<String, ReferralCode>,
    referral_code_owners: BTreeMap<String, ReferralCode>,
    referrals: BTreeMap<String, ReferralEdge>,
}

/// Mock store that keeps every collection in memory.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    procedures_enabled: RwLock<bool>,
    unavailable: RwLock<bool>,
    missing_collections: RwLock<HashSet<&'static str>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            procedures_enabled: RwLock::new(true),
            unavailable: RwLock::new(false),
            missing_collections: RwLock::new(HashSet::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store without server-side procedures (forces the fallback path).
    pub fn without_procedures() -> Self {
        Self {
            procedures_enabled: RwLock::new(false),
            ..Self::default()
        }
    }

    pub async fn set_procedures_enabled(&self, enabled: bool) {
        *self.procedures_enabled.write().await = enabled;
    }

    /// Make every call fail with a transient error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Simulate a deployment where `collection` was never provisioned.
    pub async fn drop_collection(&self, collection: &'static str) {
        self.missing_collections.write().await.insert(collection);
    }

    async fn check(&self, collection: &'static str) -> StoreResult<()> {
        if *self.unavailable.read().await {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        if self.missing_collections.read().await.contains(collection) {
            return Err(StoreError::SchemaMissing(collection));
        }
        Ok(())
    }

    async fn check_procedure(&self, name: &'static str) -> StoreResult<()> {
        if !*self.procedures_enabled.read().await {
            return Err(StoreError::ProcedureMissing(name));
        }
        self.check(collections::ATTENDANCE).await
    }
}

fn insert_new<T>(table: &mut BTreeMap<String, T>, id: &str, value: T) -> StoreResult<()> {
    if table.contains_key(id) {
        return Err(StoreError::Conflict);
    }
    table.insert(id.to_string(), value);
    Ok(())
}

fn in_range(record: &AttendanceRecord, from: &Option<String>, to: &Option<String>) -> bool {
    from.as_ref().map_or(true, |f| record.check_date >= *f)
        && to.as_ref().map_or(true, |t| record.check_date <= *t)
}

fn user_attendance(tables: &Tables, user_id: &str) -> Vec<AttendanceRecord> {
    tables
        .attendance
        .values()
        .filter(|r| r.user_id == user_id)
        .cloned()
        .collect()
}

#[async_trait]
impl RewardsStore for MemoryStore {
    // ─── Ledger ──────────────────────────────────────────────────

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        self.check(collections::LEDGER).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.ledger, &entry.id, entry.clone())
    }

    async fn get_ledger_entry(&self, id: &str) -> StoreResult<Option<LedgerEntry>> {
        self.check(collections::LEDGER).await?;
        Ok(self.tables.read().await.ledger.get(id).cloned())
    }

    async fn list_ledger_entries(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        self.check(collections::LEDGER).await?;
        let tables = self.tables.read().await;
        let mut entries: Vec<_> = tables
            .ledger
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    // ─── Attendance ──────────────────────────────────────────────

    async fn get_attendance(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        self.check(collections::ATTENDANCE).await?;
        let id = AttendanceRecord::key(user_id, date);
        Ok(self.tables.read().await.attendance.get(&id).cloned())
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        self.check(collections::ATTENDANCE).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.attendance, &record.id, record.clone())
    }

    async fn list_attendance(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        self.check(collections::ATTENDANCE).await?;
        let from = from.map(date_key);
        let to = to.map(date_key);
        let tables = self.tables.read().await;
        let mut records: Vec<_> = user_attendance(&tables, user_id)
            .into_iter()
            .filter(|r| in_range(r, &from, &to))
            .collect();
        records.sort_by(|a, b| a.check_date.cmp(&b.check_date));
        Ok(records)
    }

    async fn check_attendance(
        &self,
        user_id: &str,
        today: NaiveDate,
        rules: &AttendanceRules,
        now: &str,
    ) -> StoreResult<AttendanceResult> {
        self.check_procedure(procedures::CHECK_ATTENDANCE).await?;
        self.check(collections::LEDGER).await?;

        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .attendance
            .get(&AttendanceRecord::key(user_id, today))
            .cloned()
        {
            // Complete a check-in whose credits were never written
            for entry in existing.ledger_entries(now) {
                tables.ledger.entry(entry.id.clone()).or_insert(entry);
            }
            return Ok(AttendanceResult::already_checked(&existing));
        }

        let yesterday = today
            .pred_opt()
            .and_then(|d| tables.attendance.get(&AttendanceRecord::key(user_id, d)))
            .cloned();
        let record = rules.new_record(user_id, today, yesterday.as_ref(), now);

        for entry in record.ledger_entries(now) {
            tables.ledger.entry(entry.id.clone()).or_insert(entry);
        }
        tables.attendance.insert(record.id.clone(), record.clone());

        Ok(AttendanceResult::accepted(&record))
    }

    async fn get_monthly_attendance(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<MonthlyAttendance>> {
        self.check_procedure(procedures::GET_MONTHLY_ATTENDANCE)
            .await?;
        let prefix = format!("{:04}-{:02}-", year, month);
        let tables = self.tables.read().await;
        let mut records: Vec<_> = user_attendance(&tables, user_id)
            .into_iter()
            .filter(|r| r.check_date.starts_with(&prefix))
            .collect();
        records.sort_by(|a, b| a.check_date.cmp(&b.check_date));
        Ok(records.iter().map(MonthlyAttendance::from).collect())
    }

    async fn get_attendance_stats(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> StoreResult<AttendanceStats> {
        self.check_procedure(procedures::GET_ATTENDANCE_STATS)
            .await?;
        let tables = self.tables.read().await;
        Ok(AttendanceStats::from_records(
            &user_attendance(&tables, user_id),
            today,
        ))
    }

    async fn has_checked_today(&self, user_id: &str, today: NaiveDate) -> StoreResult<bool> {
        self.check_procedure(procedures::HAS_CHECKED_TODAY).await?;
        let id = AttendanceRecord::key(user_id, today);
        Ok(self.tables.read().await.attendance.contains_key(&id))
    }

    // ─── Roulette ────────────────────────────────────────────────

    async fn list_active_rewards(&self) -> StoreResult<Vec<RouletteReward>> {
        self.check(collections::ROULETTE_REWARDS).await?;
        let tables = self.tables.read().await;
        let mut rewards: Vec<_> = tables
            .rewards
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rewards.sort_by_key(|r| r.display_order);
        Ok(rewards)
    }

    async fn list_all_rewards(&self) -> StoreResult<Vec<RouletteReward>> {
        self.check(collections::ROULETTE_REWARDS).await?;
        let tables = self.tables.read().await;
        let mut rewards: Vec<_> = tables.rewards.values().cloned().collect();
        rewards.sort_by_key(|r| r.display_order);
        Ok(rewards)
    }

    async fn get_reward(&self, id: &str) -> StoreResult<Option<RouletteReward>> {
        self.check(collections::ROULETTE_REWARDS).await?;
        Ok(self.tables.read().await.rewards.get(id).cloned())
    }

    async fn upsert_reward(&self, reward: &RouletteReward) -> StoreResult<()> {
        self.check(collections::ROULETTE_REWARDS).await?;
        let mut tables = self.tables.write().await;
        tables.rewards.insert(reward.id.clone(), reward.clone());
        Ok(())
    }

    async fn list_spins_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<RouletteSpinRecord>> {
        self.check(collections::ROULETTE_SPINS).await?;
        let day = date_key(date);
        let tables = self.tables.read().await;
        let mut spins: Vec<_> = tables
            .spins
            .values()
            .filter(|s| s.user_id == user_id && s.spin_date == day)
            .cloned()
            .collect();
        spins.sort_by_key(|s| s.slot);
        Ok(spins)
    }

    async fn list_spins(&self, user_id: &str) -> StoreResult<Vec<RouletteSpinRecord>> {
        self.check(collections::ROULETTE_SPINS).await?;
        let tables = self.tables.read().await;
        let mut spins: Vec<_> = tables
            .spins
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        spins.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(spins)
    }

    async fn list_all_spins(&self) -> StoreResult<Vec<RouletteSpinRecord>> {
        self.check(collections::ROULETTE_SPINS).await?;
        Ok(self.tables.read().await.spins.values().cloned().collect())
    }

    async fn insert_spin(&self, record: &RouletteSpinRecord) -> StoreResult<()> {
        self.check(collections::ROULETTE_SPINS).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.spins, &record.id, record.clone())
    }

    // ─── Referrals ───────────────────────────────────────────────

    async fn get_referral_code(&self, code: &str) -> StoreResult<Option<ReferralCode>> {
        self.check(collections::REFERRAL_CODES).await?;
        Ok(self.tables.read().await.referral_codes.get(code).cloned())
    }

    async fn get_referral_code_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Option<ReferralCode>> {
        self.check(collections::REFERRAL_CODE_OWNERS).await?;
        Ok(self
            .tables
            .read()
            .await
            .referral_code_owners
            .get(user_id)
            .cloned())
    }

    async fn insert_referral_code(&self, code: &ReferralCode) -> StoreResult<()> {
        self.check(collections::REFERRAL_CODES).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.referral_codes, &code.code, code.clone())
    }

    async fn insert_referral_code_owner(&self, code: &ReferralCode) -> StoreResult<()> {
        self.check(collections::REFERRAL_CODE_OWNERS).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.referral_code_owners, &code.user_id, code.clone())
    }

    async fn get_referral_edge(&self, referred_id: &str) -> StoreResult<Option<ReferralEdge>> {
        self.check(collections::REFERRALS).await?;
        let id = ReferralEdge::key(referred_id);
        Ok(self.tables.read().await.referrals.get(&id).cloned())
    }

    async fn insert_referral_edge(&self, edge: &ReferralEdge) -> StoreResult<()> {
        self.check(collections::REFERRALS).await?;
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.referrals, &edge.id, edge.clone())
    }

    async fn list_referrals_by_referrer(
        &self,
        referrer_id: &str,
    ) -> StoreResult<Vec<ReferralEdge>> {
        self.check(collections::REFERRALS).await?;
        let tables = self.tables.read().await;
        let mut edges: Vec<_> = tables
            .referrals
            .values()
            .filter(|e| e.referrer_id == referrer_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(edges)
    }

    async fn list_pending_referrals_before(
        &self,
        created_before: &str,
    ) -> StoreResult<Vec<ReferralEdge>> {
        self.check(collections::REFERRALS).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .values()
            .filter(|e| {
                e.status == ReferralStatus::Pending && e.created_at.as_str() < created_before
            })
            .cloned()
            .collect())
    }

    async fn settle_referral(&self, edge: &ReferralEdge) -> StoreResult<()> {
        self.check(collections::REFERRALS).await?;
        if !edge.status.is_terminal() {
            return Err(StoreError::Backend(
                "settle_referral requires a terminal status".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        match tables.referrals.get(&edge.id) {
            Some(current) if current.status.is_terminal() => Err(StoreError::Conflict),
            Some(_) => {
                tables.referrals.insert(edge.id.clone(), edge.clone());
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "referral {} does not exist",
                edge.id
            ))),
        }
    }
}
