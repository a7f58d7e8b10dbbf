// src/profile/store.rs

//! SQLite-backed implementation of the profile store contract.
//!
//! All mutations are single-statement upserts, so concurrent writers to the
//! same record cannot lose updates; the pool serializes the writes.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::profile::types::{ProfileField, ProfileRecord, SobriquetEntry};
use crate::profile::{group_key, migration};

pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migration::run_migrations(&self.pool).await
    }

    /// Creates the record if absent and idempotently links the given platform
    /// account. Existing data is never clobbered. Returns whether a new
    /// record was created.
    pub async fn ensure_profile_exists(
        &self,
        profile_id: &str,
        person_key_ref: &str,
        account: Option<(&str, &str)>,
    ) -> Result<bool> {
        if profile_id.is_empty() {
            bail!("profile id is empty");
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO profiles (id, person_key_ref)
            VALUES (?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(profile_id)
        .bind(person_key_ref)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            debug!("created profile record {}", profile_id);
        }

        if let Some((platform, user_id)) = account {
            let linked = sqlx::query(
                r#"
                INSERT INTO profile_accounts (profile_id, platform, user_id)
                VALUES (?, ?, ?)
                ON CONFLICT(profile_id, platform, user_id) DO NOTHING
                "#,
            )
            .bind(profile_id)
            .bind(platform)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if linked > 0 {
                self.touch(profile_id).await?;
                debug!(
                    "linked account {}:{} to profile {}",
                    platform, user_id, profile_id
                );
            }
        }

        Ok(inserted > 0)
    }

    /// Increments the `(group, nickname)` usage count by exactly one,
    /// creating the entry at 1 on first observation. Returns `false` (not an
    /// error) when the record does not exist yet.
    pub async fn increment_sobriquet_count(
        &self,
        profile_id: &str,
        platform: &str,
        group_id: &str,
        name: &str,
    ) -> Result<bool> {
        if profile_id.is_empty() {
            bail!("profile id is empty");
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE id = ?)")
            .bind(profile_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            warn!(
                "cannot count sobriquet '{}': profile {} does not exist",
                name, profile_id
            );
            return Ok(false);
        }

        let key = group_key(platform, group_id);
        sqlx::query(
            r#"
            INSERT INTO group_sobriquets (profile_id, group_key, name, count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(profile_id, group_key, name) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(profile_id)
        .bind(&key)
        .bind(name)
        .execute(&self.pool)
        .await?;

        self.touch(profile_id).await?;
        debug!(
            "counted sobriquet '{}' for profile {} in group {}",
            name, profile_id, key
        );
        Ok(true)
    }

    /// Nickname entries for one profile in one group, in first-observed
    /// order. Missing profile or group yields an empty list.
    pub async fn group_sobriquets(
        &self,
        profile_id: &str,
        group_key: &str,
    ) -> Result<Vec<SobriquetEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT name, count
            FROM group_sobriquets
            WHERE profile_id = ? AND group_key = ?
            ORDER BY rowid
            "#,
        )
        .bind(profile_id)
        .bind(group_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SobriquetEntry {
                name: row.get("name"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Loads a record, or only the requested top-level fields (the id and
    /// person key ref are always present). Returns `None` when the record is
    /// absent, which is distinct from a record with empty collections.
    pub async fn get_profile(
        &self,
        profile_id: &str,
        fields: Option<&[ProfileField]>,
    ) -> Result<Option<ProfileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, person_key_ref, identity, personality, impression
            FROM profiles
            WHERE id = ?
            "#,
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let wants = |field: ProfileField| fields.is_none_or(|f| f.contains(&field));

        let mut record = ProfileRecord {
            id: row.get("id"),
            person_key_ref: row.get("person_key_ref"),
            ..ProfileRecord::default()
        };

        if wants(ProfileField::Identity) {
            record.identity = row.get("identity");
        }
        if wants(ProfileField::Personality) {
            record.personality = row.get("personality");
        }
        if wants(ProfileField::Impression) {
            record.impression = row.get("impression");
        }

        if wants(ProfileField::Accounts) {
            let rows = sqlx::query(
                "SELECT platform, user_id FROM profile_accounts WHERE profile_id = ? ORDER BY rowid",
            )
            .bind(profile_id)
            .fetch_all(&self.pool)
            .await?;

            let mut accounts: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for row in rows {
                let platform: String = row.get("platform");
                let user_id: String = row.get("user_id");
                accounts.entry(platform).or_default().push(user_id);
            }
            record.platform_accounts = Some(accounts);
        }

        if wants(ProfileField::Sobriquets) {
            let rows = sqlx::query(
                r#"
                SELECT group_key, name, count
                FROM group_sobriquets
                WHERE profile_id = ?
                ORDER BY rowid
                "#,
            )
            .bind(profile_id)
            .fetch_all(&self.pool)
            .await?;

            let mut by_group: HashMap<String, Vec<SobriquetEntry>> = HashMap::new();
            for row in rows {
                let key: String = row.get("group_key");
                by_group.entry(key).or_default().push(SobriquetEntry {
                    name: row.get("name"),
                    count: row.get("count"),
                });
            }
            record.sobriquets_by_group = Some(by_group);
        }

        Ok(Some(record))
    }

    async fn touch(&self, profile_id: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(profile_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
