// fraudwall/src/store/blocklist.rs
//
// Authoritative persisted blocklist with hashed-value index.
// Lookup is always by (type, SHA-256(value)); the cache layer holds
// positive hits only, so a miss falls through to the database and
// deactivations take effect within one cache TTL. Negative results are
// never cached.

use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::events::{sha256_hex, BlocklistEntry, BlocklistType, Severity};
use crate::store::cache::CacheStore;

pub struct BlocklistStore {
    pool: PgPool,
}

impl BlocklistStore {
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cache-through lookup. Returns the entry only when it is active and
    /// unexpired right now.
    pub async fn lookup(
        &self,
        cache:      &CacheStore,
        entry_type: BlocklistType,
        value:      &str,
    ) -> Option<BlocklistEntry> {
        let now = Utc::now();

        if let Some(entry) = cache.blocklist_cached(entry_type, value).await {
            if entry.is_effective(now) {
                return Some(entry);
            }
            // Cached copy went stale (expiry passed); fall through.
        }

        match self.lookup_db(entry_type, value).await {
            Ok(Some(entry)) if entry.is_effective(now) => {
                cache.cache_blocklist_hit(&entry).await;
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("blocklist lookup degraded for type {}: {}", entry_type, e);
                None
            }
        }
    }

    async fn lookup_db(&self, entry_type: BlocklistType, value: &str) -> Result<Option<BlocklistEntry>> {
        let value_hash = sha256_hex(value);
        let row = sqlx::query(
            r#"SELECT id, entry_type, value, value_hash, reason, severity, source,
                      is_active, expires_at, match_count, last_match_at, created_at
               FROM fraud_blocklist
               WHERE entry_type = $1 AND value_hash = $2 AND is_active = TRUE"#,
        )
        .bind(entry_type.as_str())
        .bind(&value_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_entry).transpose()
    }

    /// At-least-once match accounting; a small duplicate count under
    /// redelivery is acceptable.
    pub async fn record_match(&self, entry: &BlocklistEntry) -> Result<()> {
        sqlx::query(
            r#"UPDATE fraud_blocklist
               SET match_count = match_count + 1, last_match_at = NOW()
               WHERE id = $1"#,
        )
        .bind(entry.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add(&self, entry: &BlocklistEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO fraud_blocklist
                 (id, entry_type, value, value_hash, reason, severity, source,
                  is_active, expires_at, match_count, last_match_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               ON CONFLICT (entry_type, value_hash) DO UPDATE
                 SET is_active = EXCLUDED.is_active,
                     reason    = EXCLUDED.reason,
                     severity  = EXCLUDED.severity,
                     expires_at = EXCLUDED.expires_at"#,
        )
        .bind(entry.id)
        .bind(entry.entry_type.as_str())
        .bind(&entry.value)
        .bind(&entry.value_hash)
        .bind(&entry.reason)
        .bind(entry.severity.as_str())
        .bind(&entry.source)
        .bind(entry.is_active)
        .bind(entry.expires_at)
        .bind(entry.match_count)
        .bind(entry.last_match_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE fraud_blocklist SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All currently effective entries, used by the feed exporter.
    pub async fn active_entries(&self) -> Result<Vec<BlocklistEntry>> {
        let rows = sqlx::query(
            r#"SELECT id, entry_type, value, value_hash, reason, severity, source,
                      is_active, expires_at, match_count, last_match_at, created_at
               FROM fraud_blocklist
               WHERE is_active = TRUE AND (expires_at IS NULL OR expires_at > NOW())"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> Result<BlocklistEntry> {
    let type_raw: String = row.try_get("entry_type")?;
    let entry_type = BlocklistType::parse(&type_raw)
        .ok_or_else(|| EngineError::DatabaseUnavailable(format!("unknown blocklist type {}", type_raw)))?;
    let severity_raw: String = row.try_get("severity")?;

    Ok(BlocklistEntry {
        id:            row.try_get("id")?,
        entry_type,
        value:         row.try_get("value")?,
        value_hash:    row.try_get("value_hash")?,
        reason:        row.try_get("reason")?,
        severity:      Severity::parse(&severity_raw),
        source:        row.try_get("source")?,
        is_active:     row.try_get("is_active")?,
        expires_at:    row.try_get("expires_at")?,
        match_count:   row.try_get("match_count")?,
        last_match_at: row.try_get("last_match_at")?,
        created_at:    row.try_get("created_at")?,
    })
}
