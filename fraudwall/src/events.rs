// fraudwall/src/events.rs
//
// Shared event types and all domain types flowing through Fraudwall.
// Wire format is camelCase JSON; the inbound envelope mirrors what the
// transfer service publishes on banking.transfers.created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ── Inbound events ────────────────────────────────────────────────────────────

/// Envelope of a newly created transfer, consumed once per transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub event_type:     String,          // "TransactionCreated"
    pub event_id:       String,
    pub timestamp:      DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload:        TransactionPayload,
}

fn default_version() -> String { "1.0".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub transaction_id:         Uuid,
    pub user_id:                String,
    pub source_account_id:      String,
    pub destination_account_id: String,
    pub recipient_id:           String,
    pub amount:                 f64,
    pub currency:               String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographic:             Option<GeoData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device:                 Option<DeviceData>,
    // Loosely typed bag carried through unparsed; specific keys are
    // consulted lazily where needed.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata:               serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoData {
    pub ip:        Option<String>,
    pub latitude:  Option<f64>,
    pub longitude: Option<f64>,
    pub country:   Option<String>,
    pub city:      Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceData {
    pub fingerprint: Option<String>,
    pub user_agent:  Option<String>,
    pub device_id:   Option<String>,
    pub device_type: Option<String>,
}

impl TransactionEvent {
    /// Ingress validation. Failures here are poison pills: skipped with a
    /// warning, never re-queued.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_type != "TransactionCreated" {
            return Err(format!("unexpected eventType {}", self.event_type));
        }
        if self.payload.user_id.is_empty() {
            return Err("missing userId".into());
        }
        if self.payload.recipient_id.is_empty() {
            return Err("missing recipientId".into());
        }
        if self.payload.destination_account_id.is_empty() {
            return Err("missing destinationAccountId".into());
        }
        if !(self.payload.amount > 0.0) || !self.payload.amount.is_finite() {
            return Err(format!("non-positive amount {}", self.payload.amount));
        }
        if self.payload.currency.len() != 3 {
            return Err(format!("bad currency {}", self.payload.currency));
        }
        Ok(())
    }
}

// ── Risk factors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisMethod {
    Velocity,
    Amount,
    Geographic,
    Recipient,
    Time,
    Device,
    MlModel,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Velocity   => "VELOCITY",
            Self::Amount     => "AMOUNT",
            Self::Geographic => "GEOGRAPHIC",
            Self::Recipient  => "RECIPIENT",
            Self::Time       => "TIME",
            Self::Device     => "DEVICE",
            Self::MlModel    => "ML_MODEL",
        }
    }
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One analyzer's contribution. contributed_score is always raw * weight;
/// the constructors keep that invariant so it cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub method:            AnalysisMethod,
    pub raw_score:         f64,
    pub weight:            f64,
    pub contributed_score: f64,
    pub reason:            String,
    #[serde(default)]
    pub details:           HashMap<String, serde_json::Value>,
}

impl RiskFactor {
    pub fn new(
        method:  AnalysisMethod,
        raw:     f64,
        weight:  f64,
        reason:  impl Into<String>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        let raw    = raw.clamp(0.0, 1.0);
        let weight = weight.max(0.0);
        Self {
            method,
            raw_score:         round4(raw),
            weight,
            contributed_score: round4(raw * weight),
            reason:            reason.into(),
            details,
        }
    }

    /// Neutral factor emitted when an analyzer fails or times out.
    pub fn unavailable(method: AnalysisMethod, weight: f64) -> Self {
        Self::new(method, 0.0, weight, "Analysis unavailable", HashMap::new())
    }

    /// Hard override used by the blocklist gate: full contribution
    /// regardless of the configured weight.
    pub fn blocklist_override(method: AnalysisMethod, reason: impl Into<String>) -> Self {
        Self {
            method,
            raw_score:         1.0,
            weight:            1.0,
            contributed_score: 1.0,
            reason:            reason.into(),
            details:           HashMap::new(),
        }
    }
}

pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision { Approve, Suspicious, Reject }

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve    => write!(f, "APPROVE"),
            Self::Suspicious => write!(f, "SUSPICIOUS"),
            Self::Reject     => write!(f, "REJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence { High, Medium, Low }

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus { Pending, Completed, Failed, Timeout }

/// Immutable audit record, one row per transaction_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAnalysis {
    pub analysis_id:            Uuid,
    pub transaction_id:         Uuid,
    pub user_id:                String,
    pub final_score:            f64,
    pub decision:               Decision,
    pub confidence:             Confidence,
    pub status:                 AnalysisStatus,
    pub risk_factors:           Vec<RiskFactor>,
    pub model_version:          String,
    pub analysis_time_ms:       u64,
    pub timestamp:              DateTime<Utc>,
    pub requires_manual_review: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub component_scores:       HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id:         Option<String>,
}

// ── Blocklist ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlocklistType { Account, Device, Ip, Recipient, Email, Phone }

impl BlocklistType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account   => "ACCOUNT",
            Self::Device    => "DEVICE",
            Self::Ip        => "IP",
            Self::Recipient => "RECIPIENT",
            Self::Email     => "EMAIL",
            Self::Phone     => "PHONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCOUNT"   => Some(Self::Account),
            "DEVICE"    => Some(Self::Device),
            "IP"        => Some(Self::Ip),
            "RECIPIENT" => Some(Self::Recipient),
            "EMAIL"     => Some(Self::Email),
            "PHONE"     => Some(Self::Phone),
            _           => None,
        }
    }
}

impl std::fmt::Display for BlocklistType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity { Low, Medium, High, Critical }

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "LOW",
            Self::Medium   => "MEDIUM",
            Self::High     => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "LOW"      => Self::Low,
            "HIGH"     => Self::High,
            "CRITICAL" => Self::Critical,
            _          => Self::Medium,
        }
    }
}

/// Persisted blocklist entry. Matching is always by (type, value_hash);
/// the plaintext value is never required for a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistEntry {
    pub id:            Uuid,
    pub entry_type:    BlocklistType,
    pub value:         String,
    pub value_hash:    String,          // hex(SHA-256(value))
    pub reason:        String,
    pub severity:      Severity,
    pub source:        String,
    pub is_active:     bool,
    pub expires_at:    Option<DateTime<Utc>>,
    pub match_count:   i64,
    pub last_match_at: Option<DateTime<Utc>>,
    pub created_at:    DateTime<Utc>,
}

impl BlocklistEntry {
    /// Active now: flagged active and not past expiry.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|e| e > now).unwrap_or(true)
    }
}

// ── User history ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalTransaction {
    pub amount:             f64,
    pub recipient_id:       String,
    pub country:            Option<String>,
    pub device_fingerprint: Option<String>,
    pub timestamp:          DateTime<Utc>,
    pub fraud_score:        Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_transactions:  u64,
    pub average_amount:      f64,
    pub max_amount:          f64,
    pub min_amount:          f64,
    pub std_deviation:       f64,
    pub unique_recipients:   u64,
    pub unique_countries:    u64,
    pub unique_devices:      u64,
    pub account_created_at:  Option<DateTime<Utc>>,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

/// Derived snapshot of the user's last-N transactions plus aggregates.
/// Cached with a configured TTL and invalidated on each completed analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHistory {
    pub transactions: Vec<HistoricalTransaction>,
    pub stats:        UserStats,
}

impl UserHistory {
    /// Zero history for users never seen before. Analyzers tolerate this.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn most_recent(&self) -> Option<&HistoricalTransaction> {
        self.transactions.first()
    }
}

// ── Velocity counters ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityWindow { FiveMin, OneHour, TwentyFourHours }

impl VelocityWindow {
    pub const ALL: [VelocityWindow; 3] =
        [Self::FiveMin, Self::OneHour, Self::TwentyFourHours];

    pub fn secs(&self) -> u64 {
        match self {
            Self::FiveMin         => 5 * 60,
            Self::OneHour         => 60 * 60,
            Self::TwentyFourHours => 24 * 60 * 60,
        }
    }

    pub fn key_tag(&self) -> &'static str {
        match self {
            Self::FiveMin         => "5m",
            Self::OneHour         => "1h",
            Self::TwentyFourHours => "24h",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VelocityReading {
    pub count:        u64,
    pub total_amount: f64,
}

/// All three window readings after the current event has been counted,
/// plus the lossy 5-minute distinct-recipient cardinality.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocitySnapshot {
    pub five_min:             VelocityReading,
    pub one_hour:             VelocityReading,
    pub twenty_four_hours:    VelocityReading,
    pub unique_recipients_5m: u64,
    /// False when the cache was unreachable and the readings are zeros.
    pub available:            bool,
}

// ── Cached per-entity info ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub trust_score: f64,
    pub first_seen:  DateTime<Utc>,
    pub last_seen:   DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInfo {
    pub risk_score:       f64,
    pub first_seen:       DateTime<Utc>,
    pub tx_count:         u64,
    pub verified:         bool,
    pub country:          Option<String>,
    pub account_age_days: Option<i64>,
}

/// Location of the user's most recent transfer, kept per user so the next
/// analysis can check travel feasibility with coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastGeo {
    pub country:   String,
    pub latitude:  Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Memoized outcome keyed by transaction_id. Re-delivery inside the TTL
/// window returns this instead of re-publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyMarker {
    pub decision:  Decision,
    pub score:     f64,
    pub timestamp: DateTime<Utc>,
}

// ── Outbound events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    FraudAnalysisComplete,
    FraudSuspected,
    ManualReviewRequired,
    BlocklistMatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FraudAnalysisComplete => "FraudAnalysisComplete",
            Self::FraudSuspected        => "FraudSuspected",
            Self::ManualReviewRequired  => "ManualReviewRequired",
            Self::BlocklistMatch        => "BlocklistMatch",
        }
    }
}

/// Outbound JSON envelope shared by every fraud topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P> {
    pub event_type:     String,
    pub event_id:       Uuid,
    pub timestamp:      DateTime<Utc>,
    pub version:        String,
    pub service:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload:        P,
}

impl<P: Serialize> Envelope<P> {
    pub fn new(kind: EventKind, service: &str, correlation_id: Option<String>, payload: P) -> Self {
        Self {
            event_type:     kind.as_str().to_string(),
            event_id:       Uuid::new_v4(),
            timestamp:      Utc::now(),
            version:        "1.0".to_string(),
            service:        service.to_string(),
            correlation_id,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAnalysisResult {
    pub analysis_id:            Uuid,
    pub transaction_id:         Uuid,
    pub user_id:                String,
    pub final_score:            f64,
    pub decision:               Decision,
    pub confidence:             Confidence,
    pub status:                 AnalysisStatus,
    pub requires_manual_review: bool,
    pub model_version:          String,
    pub analysis_time_ms:       u64,
    pub risk_factors:           Vec<RiskFactor>,
    // Present only on blocklist-triggered rejects; never the plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_value_hash:     Option<String>,
}

impl FraudAnalysisResult {
    pub fn from_analysis(a: &FraudAnalysis, matched_value_hash: Option<String>) -> Self {
        Self {
            analysis_id:            a.analysis_id,
            transaction_id:         a.transaction_id,
            user_id:                a.user_id.clone(),
            final_score:            a.final_score,
            decision:               a.decision,
            confidence:             a.confidence,
            status:                 a.status,
            requires_manual_review: a.requires_manual_review,
            model_version:          a.model_version.clone(),
            analysis_time_ms:       a.analysis_time_ms,
            risk_factors:           a.risk_factors.clone(),
            matched_value_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPriority { High, Medium }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualReviewRequest {
    pub analysis_id:    Uuid,
    pub transaction_id: Uuid,
    pub user_id:        String,
    pub final_score:    f64,
    pub decision:       Decision,
    pub priority:       ReviewPriority,
    pub top_reasons:    Vec<String>,
}

impl ManualReviewRequest {
    pub fn from_analysis(a: &FraudAnalysis, high_priority_min: f64) -> Self {
        let priority = if a.final_score > high_priority_min {
            ReviewPriority::High
        } else {
            ReviewPriority::Medium
        };
        let top_reasons = a.risk_factors.iter()
            .filter(|f| f.contributed_score > 0.0)
            .map(|f| format!("{}: {}", f.method, f.reason))
            .take(5)
            .collect();
        Self {
            analysis_id:    a.analysis_id,
            transaction_id: a.transaction_id,
            user_id:        a.user_id.clone(),
            final_score:    a.final_score,
            decision:       a.decision,
            priority,
            top_reasons,
        }
    }
}

// ── Hashing helpers ───────────────────────────────────────────────────────────

/// Full SHA-256 hex digest, used as the blocklist index key.
pub fn sha256_hex(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(value.as_bytes());
    hex::encode(h.finalize())
}

/// Truncated 16-hex-char digest for cache keys, so raw fingerprints and
/// blocklist values never appear in the cache keyspace.
pub fn cache_key_hash(value: &str) -> String {
    sha256_hex(value)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event_json() -> &'static str {
        r#"{
            "eventType": "TransactionCreated",
            "eventId": "evt-1001",
            "timestamp": "2026-03-14T09:26:53Z",
            "version": "1.0",
            "correlationId": "corr-77",
            "payload": {
                "transactionId": "6f2c1a34-9d1e-4f6a-8f2e-0b8d5c1a2b3c",
                "userId": "user-42",
                "sourceAccountId": "acct-src-1",
                "destinationAccountId": "acct-dst-9",
                "recipientId": "rcp-7",
                "amount": 110.0,
                "currency": "USD",
                "geographic": { "ip": "203.0.113.7", "latitude": 40.7, "longitude": -74.0, "country": "US", "city": "New York" },
                "device": { "fingerprint": "a1b2c3d4e5f60718", "userAgent": "Mozilla/5.0 (X11; Linux x86_64)", "deviceId": "dev-1", "deviceType": "mobile" }
            }
        }"#
    }

    #[test]
    fn inbound_event_parses_camel_case() {
        let ev: TransactionEvent = serde_json::from_str(sample_event_json()).unwrap();
        assert_eq!(ev.event_type, "TransactionCreated");
        assert_eq!(ev.payload.user_id, "user-42");
        assert_eq!(ev.payload.amount, 110.0);
        assert_eq!(ev.payload.geographic.as_ref().unwrap().country.as_deref(), Some("US"));
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn validation_rejects_non_positive_amount() {
        let mut ev: TransactionEvent = serde_json::from_str(sample_event_json()).unwrap();
        ev.payload.amount = 0.0;
        assert!(ev.validate().is_err());
        ev.payload.amount = -5.0;
        assert!(ev.validate().is_err());
    }

    #[test]
    fn validation_rejects_missing_identifiers() {
        let mut ev: TransactionEvent = serde_json::from_str(sample_event_json()).unwrap();
        ev.payload.recipient_id.clear();
        assert!(ev.validate().is_err());
    }

    #[test]
    fn risk_factor_contribution_is_product() {
        let f = RiskFactor::new(AnalysisMethod::Amount, 0.4, 0.25, "test", HashMap::new());
        assert!((f.contributed_score - 0.1).abs() < 1e-9);
        let f = RiskFactor::new(AnalysisMethod::Amount, 1.7, 0.25, "clamped", HashMap::new());
        assert_eq!(f.raw_score, 1.0);
        assert_eq!(f.contributed_score, 0.25);
    }

    #[test]
    fn blocklist_override_contributes_full_score() {
        let f = RiskFactor::blocklist_override(AnalysisMethod::Recipient, "blocklisted recipient");
        assert_eq!(f.contributed_score, 1.0);
        assert_eq!(f.weight, 1.0);
    }

    #[test]
    fn blocklist_entry_expiry() {
        let now = Utc::now();
        let mut entry = BlocklistEntry {
            id:            Uuid::new_v4(),
            entry_type:    BlocklistType::Recipient,
            value:         "rcp-7".into(),
            value_hash:    sha256_hex("rcp-7"),
            reason:        "mule account".into(),
            severity:      Severity::High,
            source:        "aml-team".into(),
            is_active:     true,
            expires_at:    Some(now - chrono::Duration::hours(1)),
            match_count:   0,
            last_match_at: None,
            created_at:    now,
        };
        assert!(!entry.is_effective(now));
        entry.expires_at = None;
        assert!(entry.is_effective(now));
        entry.is_active = false;
        assert!(!entry.is_effective(now));
    }

    #[test]
    fn cache_key_hash_is_truncated_and_stable() {
        let h = cache_key_hash("fingerprint-abc");
        assert_eq!(h.len(), 16);
        assert_eq!(h, cache_key_hash("fingerprint-abc"));
        assert_ne!(h, cache_key_hash("fingerprint-abd"));
        // Never the plaintext.
        assert!(!h.contains("fingerprint"));
    }

    #[test]
    fn envelope_serializes_wire_fields() {
        let payload = ManualReviewRequest {
            analysis_id:    Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            user_id:        "user-42".into(),
            final_score:    0.91,
            decision:       Decision::Reject,
            priority:       ReviewPriority::High,
            top_reasons:    vec!["RECIPIENT: blocklisted".into()],
        };
        let env = Envelope::new(EventKind::ManualReviewRequired, "fraudwall", Some("corr-77".into()), payload);
        let v: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(v["eventType"], "ManualReviewRequired");
        assert_eq!(v["version"], "1.0");
        assert_eq!(v["service"], "fraudwall");
        assert_eq!(v["correlationId"], "corr-77");
        assert_eq!(v["payload"]["priority"], "HIGH");
        assert_eq!(v["payload"]["decision"], "REJECT");
    }

    #[test]
    fn velocity_window_ttls() {
        assert_eq!(VelocityWindow::FiveMin.secs(), 300);
        assert_eq!(VelocityWindow::OneHour.secs(), 3600);
        assert_eq!(VelocityWindow::TwentyFourHours.secs(), 86400);
    }
}
