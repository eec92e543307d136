// fraudwall/src/store/feed.rs
//
// Cross-system blocklist propagation feed.
//
// Format: signed NDJSON, one FeedEntry per line.
// Signing: HMAC-SHA256(canonical_record_json, shared_key).
//
// Records carry only the value hash, never the plaintext: the blocklist
// matches by (type, value_hash), so the receiving side needs nothing more.
// Entries with invalid signatures are silently dropped; entries already
// past their expiry are skipped on import.
//
// Import is operator-driven (an explicit CLI flag), never automatic.

use anyhow::Result;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::events::{BlocklistEntry, BlocklistType, Severity};

type HmacSha256 = Hmac<sha2::Sha256>;

const SCHEMA_VERSION: &str = "fraudwall/blocklist/v1";

// ── Feed records ──────────────────────────────────────────────────────────────

/// Hash-only projection of a blocklist entry, safe to share.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub entry_type: BlocklistType,
    pub value_hash: String,
    pub reason:     String,
    pub severity:   Severity,
    pub source:     String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FeedRecord {
    pub fn from_entry(entry: &BlocklistEntry) -> Self {
        Self {
            entry_type: entry.entry_type,
            value_hash: entry.value_hash.clone(),
            reason:     entry.reason.clone(),
            severity:   entry.severity,
            source:     entry.source.clone(),
            expires_at: entry.expires_at,
        }
    }

    /// Rehydrate into a storable entry. The plaintext column stays empty;
    /// matching never needs it.
    pub fn into_entry(self, origin: &str) -> BlocklistEntry {
        BlocklistEntry {
            id:            Uuid::new_v4(),
            entry_type:    self.entry_type,
            value:         String::new(),
            value_hash:    self.value_hash,
            reason:        self.reason,
            severity:      self.severity,
            source:        format!("feed:{}", origin),
            is_active:     true,
            expires_at:    self.expires_at,
            match_count:   0,
            last_match_at: None,
            created_at:    Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub schema_version: String,
    pub origin:         String,   // producing system, e.g. "fraudwall-eu1"
    pub record:         FeedRecord,
    pub signature:      String,   // hex(HMAC-SHA256(canonical_json, key))
    pub exported_at:    DateTime<Utc>,
}

impl FeedEntry {
    pub fn new(record: FeedRecord, origin: impl Into<String>, signing_key: &[u8]) -> Self {
        let canonical = serde_json::to_string(&record).unwrap_or_default();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            origin:         origin.into(),
            signature:      hmac_sign(canonical.as_bytes(), signing_key),
            record,
            exported_at:    Utc::now(),
        }
    }

    /// Verify the HMAC signature. Constant-time comparison.
    pub fn verify(&self, key: &[u8]) -> bool {
        let canonical = serde_json::to_string(&self.record).unwrap_or_default();
        let expected  = hmac_sign(canonical.as_bytes(), key);
        let a = expected.as_bytes();
        let b = self.signature.as_bytes();
        if a.len() != b.len() { return false; }
        a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }

    pub fn is_expired(&self) -> bool {
        self.record.expires_at.map(|e| e <= Utc::now()).unwrap_or(false)
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default() + "\n"
    }
}

// ── Export ────────────────────────────────────────────────────────────────────

pub struct FeedExporter {
    origin:      String,
    signing_key: Vec<u8>,
}

impl FeedExporter {
    pub fn new(origin: impl Into<String>, signing_key: Vec<u8>) -> Self {
        Self { origin: origin.into(), signing_key }
    }

    pub fn export_ndjson(&self, entries: &[BlocklistEntry]) -> String {
        entries.iter()
            .map(|e| FeedEntry::new(FeedRecord::from_entry(e), &self.origin, &self.signing_key).to_jsonl())
            .collect()
    }

    pub async fn export_to_file(&self, entries: &[BlocklistEntry], path: &Path) -> Result<usize> {
        let ndjson = self.export_ndjson(entries);
        tokio::fs::write(path, ndjson.as_bytes()).await?;
        Ok(entries.len())
    }
}

// ── Import ────────────────────────────────────────────────────────────────────

pub struct FeedImporter {
    verification_key: Vec<u8>,
}

impl FeedImporter {
    pub fn new(verification_key: Vec<u8>) -> Self {
        Self { verification_key }
    }

    /// Parse and verify an NDJSON feed string. Returns only entries with a
    /// valid signature that have not yet expired.
    pub fn parse(&self, ndjson: &str) -> Vec<FeedEntry> {
        ndjson.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() { return None; }
                serde_json::from_str::<FeedEntry>(line).ok()
            })
            .filter(|e| {
                e.schema_version == SCHEMA_VERSION
                    && e.verify(&self.verification_key)
                    && !e.is_expired()
            })
            .collect()
    }

    pub async fn parse_file(&self, path: &Path) -> Result<Vec<FeedEntry>> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(self.parse(&content))
    }
}

// ── HMAC helper ───────────────────────────────────────────────────────────────

fn hmac_sign(data: &[u8], key: &[u8]) -> String {
    // Empty key degrades to a fixed dev key so local runs still round-trip.
    let effective_key = if key.is_empty() { b"fraudwall_dev_key".as_ref() } else { key };
    let mut mac = HmacSha256::new_from_slice(effective_key)
        .expect("HMAC key length error");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}
