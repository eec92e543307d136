// fraudwall/src/store/cache.rs
//
// Redis-backed hot-path store: sliding-window velocity counters, user
// history, device / recipient info, blocklist cache, idempotency markers.
//
// Every operation fails open: a transport error returns None / zeros and
// the caller emits a degraded factor instead of aborting the pipeline.
// Writes are single-key atomic or pipelined; there are no multi-key
// transactions, so horizontal scaling stays correct as workers come and go.
//
// Key layout (prefix configurable, "fw:" by default):
//   fw:vel:{user}:{5m|1h|24h}:n     INCR counter, TTL = window
//   fw:vel:{user}:{5m|1h|24h}:amt   INCRBYFLOAT sum, TTL = window
//   fw:vel:{user}:5m:rcp            SADD recipient set, TTL 300s (lossy)
//   fw:hist:{user}                  JSON UserHistory
//   fw:dev:{hash16}                 JSON DeviceInfo
//   fw:rcp:{hash16}                 JSON RecipientInfo
//   fw:bl:{type}:{hash16}           JSON BlocklistEntry (positive hits only)
//   fw:idem:{txid}                  JSON IdempotencyMarker
//   fw:an:{txid}                    JSON FraudAnalysis
//
// Device and blocklist keys are indexed by SHA-256 truncated to 16 hex
// chars; raw fingerprints and blocklist values never enter the keyspace.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::errors::{EngineError, Result};
use crate::events::{
    cache_key_hash, BlocklistEntry, BlocklistType, DeviceInfo, FraudAnalysis,
    IdempotencyMarker, LastGeo, RecipientInfo, UserHistory, VelocityReading,
    VelocitySnapshot, VelocityWindow,
};

// The travel-feasibility check only ever compares against the most recent
// transfer, so a day of retention is plenty.
const LAST_GEO_TTL_SECS: u64 = 86_400;

pub struct CacheStore {
    conn: ConnectionManager,
    cfg:  CacheConfig,
}

impl CacheStore {
    pub async fn connect(cfg: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(cfg.url.as_str())
            .map_err(|e| EngineError::CacheUnavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client).await
            .map_err(|e| EngineError::CacheUnavailable(e.to_string()))?;
        Ok(Self { conn, cfg: cfg.clone() })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.cfg.key_prefix, suffix)
    }

    fn vel_key(&self, user_id: &str, window: VelocityWindow, part: &str) -> String {
        self.key(&format!("vel:{}:{}:{}", user_id, window.key_tag(), part))
    }

    // ── Velocity counters ─────────────────────────────────────────────────────

    /// Current readings without counting anything.
    pub async fn get_velocity(&self, user_id: &str) -> VelocitySnapshot {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for window in VelocityWindow::ALL {
            pipe.get(self.vel_key(user_id, window, "n"))
                .get(self.vel_key(user_id, window, "amt"));
        }
        pipe.scard(self.vel_key(user_id, VelocityWindow::FiveMin, "rcp"));

        type Row = (
            Option<u64>, Option<f64>,
            Option<u64>, Option<f64>,
            Option<u64>, Option<f64>,
            u64,
        );
        match pipe.query_async::<_, Row>(&mut conn).await {
            Ok((n5, a5, n1, a1, n24, a24, rcp)) => VelocitySnapshot {
                five_min:             reading(n5, a5),
                one_hour:             reading(n1, a1),
                twenty_four_hours:    reading(n24, a24),
                unique_recipients_5m: rcp,
                available:            true,
            },
            Err(e) => {
                warn!("velocity read failed for {}: {}", user_id, e);
                VelocitySnapshot::default()
            }
        }
    }

    /// Count the current event into all three windows atomically and
    /// return the post-increment readings. Each window key carries a TTL
    /// equal to its own length, so counters slide by expiry.
    pub async fn incr_velocity(
        &self,
        user_id:      &str,
        amount:       f64,
        recipient_id: &str,
    ) -> VelocitySnapshot {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for window in VelocityWindow::ALL {
            let ttl = window.secs() as i64;
            let n_key   = self.vel_key(user_id, window, "n");
            let amt_key = self.vel_key(user_id, window, "amt");
            pipe.incr(&n_key, 1u64)
                .expire(&n_key, ttl).ignore()
                .cmd("INCRBYFLOAT").arg(&amt_key).arg(amount)
                .expire(&amt_key, ttl).ignore();
        }
        let rcp_key = self.vel_key(user_id, VelocityWindow::FiveMin, "rcp");
        pipe.sadd(&rcp_key, recipient_id).ignore()
            .expire(&rcp_key, self.cfg.recipient_set_ttl_secs as i64).ignore()
            .scard(&rcp_key);

        type Row = (u64, f64, u64, f64, u64, f64, u64);
        match pipe.query_async::<_, Row>(&mut conn).await {
            Ok((n5, a5, n1, a1, n24, a24, rcp)) => VelocitySnapshot {
                five_min:             VelocityReading { count: n5,  total_amount: a5 },
                one_hour:             VelocityReading { count: n1,  total_amount: a1 },
                twenty_four_hours:    VelocityReading { count: n24, total_amount: a24 },
                unique_recipients_5m: rcp,
                available:            true,
            },
            Err(e) => {
                warn!("velocity increment failed for {}: {}", user_id, e);
                VelocitySnapshot::default()
            }
        }
    }

    // ── User history ──────────────────────────────────────────────────────────

    pub async fn get_user_history(&self, user_id: &str) -> Option<UserHistory> {
        self.get_json(&self.key(&format!("hist:{}", user_id))).await
    }

    pub async fn set_user_history(&self, user_id: &str, history: &UserHistory) {
        self.set_json(&self.key(&format!("hist:{}", user_id)), history, self.cfg.history_ttl_secs).await;
    }

    /// Called after every completed analysis so the next event rebuilds a
    /// snapshot that includes it.
    pub async fn invalidate_user_history(&self, user_id: &str) {
        let mut conn = self.conn.clone();
        let key = self.key(&format!("hist:{}", user_id));
        if let Err(e) = conn.del::<_, ()>(&key).await {
            warn!("history invalidation failed for {}: {}", user_id, e);
        }
    }

    // ── Device / recipient info ───────────────────────────────────────────────

    pub async fn get_device_info(&self, fingerprint: &str) -> Option<DeviceInfo> {
        self.get_json(&self.key(&format!("dev:{}", cache_key_hash(fingerprint)))).await
    }

    pub async fn set_device_info(&self, fingerprint: &str, info: &DeviceInfo) {
        let key = self.key(&format!("dev:{}", cache_key_hash(fingerprint)));
        self.set_json(&key, info, self.cfg.device_ttl_secs).await;
    }

    pub async fn get_recipient_info(&self, recipient_id: &str) -> Option<RecipientInfo> {
        self.get_json(&self.key(&format!("rcp:{}", cache_key_hash(recipient_id)))).await
    }

    pub async fn set_recipient_info(&self, recipient_id: &str, info: &RecipientInfo) {
        let key = self.key(&format!("rcp:{}", cache_key_hash(recipient_id)));
        self.set_json(&key, info, self.cfg.recipient_ttl_secs).await;
    }

    // ── Last known location ───────────────────────────────────────────────────

    pub async fn get_last_geo(&self, user_id: &str) -> Option<LastGeo> {
        self.get_json(&self.key(&format!("geo:{}", user_id))).await
    }

    pub async fn set_last_geo(&self, user_id: &str, geo: &LastGeo) {
        let key = self.key(&format!("geo:{}", user_id));
        self.set_json(&key, geo, LAST_GEO_TTL_SECS).await;
    }

    // ── Blocklist cache ───────────────────────────────────────────────────────

    // Positive hits only. A miss always falls through to the database, so
    // deactivations take effect within the cache TTL.

    pub async fn blocklist_cached(&self, entry_type: BlocklistType, value: &str) -> Option<BlocklistEntry> {
        let key = self.key(&format!("bl:{}:{}", entry_type.as_str(), cache_key_hash(value)));
        self.get_json(&key).await
    }

    pub async fn cache_blocklist_hit(&self, entry: &BlocklistEntry) {
        // Keyed from the stored value_hash, not the plaintext: feed-imported
        // entries carry no plaintext at all. The first 16 hex chars of the
        // full hash equal cache_key_hash() of the original value.
        let short = entry.value_hash.get(..16).unwrap_or(&entry.value_hash);
        let key = self.key(&format!("bl:{}:{}", entry.entry_type.as_str(), short));
        // The cached copy matches by hash alone; the plaintext stays in the
        // database only.
        let mut scrubbed = entry.clone();
        scrubbed.value = String::new();
        self.set_json(&key, &scrubbed, self.cfg.blocklist_ttl_secs).await;
    }

    // ── Idempotency marker ────────────────────────────────────────────────────

    pub async fn idempotency_marker(&self, transaction_id: Uuid) -> Option<IdempotencyMarker> {
        self.get_json(&self.key(&format!("idem:{}", transaction_id))).await
    }

    pub async fn set_idempotency_marker(&self, transaction_id: Uuid, marker: &IdempotencyMarker) {
        let key = self.key(&format!("idem:{}", transaction_id));
        self.set_json(&key, marker, self.cfg.idempotency_ttl_secs).await;
    }

    // ── Cached analysis ───────────────────────────────────────────────────────

    pub async fn cached_analysis(&self, transaction_id: Uuid) -> Option<FraudAnalysis> {
        self.get_json(&self.key(&format!("an:{}", transaction_id))).await
    }

    pub async fn cache_analysis(&self, analysis: &FraudAnalysis) {
        let key = self.key(&format!("an:{}", analysis.transaction_id));
        self.set_json(&key, analysis, self.cfg.analysis_ttl_secs).await;
    }

    // ── JSON helpers ──────────────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("corrupt cache entry at {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("cache read failed at {}: {}", key, e);
                None
            }
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("cache serialize failed at {}: {}", key, e);
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await {
            warn!("cache write failed at {}: {}", key, e);
        } else {
            debug!("cache SET {} EX {}", key, ttl_secs);
        }
    }
}

fn reading(count: Option<u64>, amount: Option<f64>) -> VelocityReading {
    VelocityReading {
        count:        count.unwrap_or(0),
        total_amount: amount.unwrap_or(0.0),
    }
}
