// fraudwall/src/analyzers/recipient.rs
//
// New / untrusted recipient heuristics. The blocklist short-circuit for
// recipients and destination accounts happens in the orchestrator's
// pre-scoring gate, so by the time this analyzer runs the recipient is
// known not to be blocklisted.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

use crate::config::{GeoConfig, RecipientConfig};
use crate::context::UserContext;
use crate::errors::Result;
use crate::events::{AnalysisMethod, RecipientInfo, RiskFactor, TransactionEvent};

const RAW_CAP:              f64 = 0.45;
const FIRST_EVER:           f64 = 0.15;
const RECENTLY_FIRST_SEEN:  f64 = 0.10;
const RISKY_RECIPIENT_MULT: f64 = 0.20;
const RISKY_RECIPIENT_MIN:  f64 = 0.30;
const YOUNG_ACCOUNT:        f64 = 0.10;
const HIGH_RISK_COUNTRY:    f64 = 0.08;
const UNVERIFIED:           f64 = 0.05;
const NEW_RECIPIENT_BURST:  f64 = 0.12;

const YOUNG_ACCOUNT_DAYS:  i64   = 30;
const NEW_RECIPIENT_PRIOR: u64   = 3;
const BURST_DISTINCT_MIN:  usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecipientFindings {
    pub is_new_recipient:     bool,
    pub recipient_risk_score: f64,
    pub recipient_tx_count:   u64,
}

pub async fn analyze(
    event:   &TransactionEvent,
    ctx:     &UserContext,
    info:    Option<RecipientInfo>,
    cfg:     &RecipientConfig,
    geo_cfg: &GeoConfig,
    weight:  f64,
) -> Result<(RiskFactor, RecipientFindings)> {
    let recipient_id = &event.payload.recipient_id;
    let mut raw      = 0.0;
    let mut reasons  = Vec::new();
    let mut findings = RecipientFindings::default();

    let prior_tx: u64 = ctx.history.transactions.iter()
        .filter(|t| &t.recipient_id == recipient_id)
        .count() as u64;
    findings.recipient_tx_count = info.as_ref().map(|i| i.tx_count).unwrap_or(prior_tx);

    // ── First transfer to this recipient ──────────────────────────────────────
    if prior_tx == 0 && !ctx.trusted_recipients.contains(recipient_id) {
        raw += FIRST_EVER;
        findings.is_new_recipient = true;
        reasons.push("first transfer to this recipient".into());
    }

    // ── Recently first-seen with little traffic ───────────────────────────────
    let first_seen = info.as_ref().map(|i| i.first_seen).or_else(|| {
        ctx.history.transactions.iter()
            .filter(|t| &t.recipient_id == recipient_id)
            .map(|t| t.timestamp)
            .min()
    });
    if let Some(first) = first_seen {
        let age_days = (Utc::now() - first).num_days();
        if age_days < cfg.new_recipient_days && findings.recipient_tx_count < NEW_RECIPIENT_PRIOR {
            raw += RECENTLY_FIRST_SEEN;
            reasons.push(format!("recipient first seen {} days ago", age_days));
        }
    }

    if let Some(ref info) = info {
        findings.recipient_risk_score = info.risk_score;

        if info.risk_score > RISKY_RECIPIENT_MIN {
            raw += RISKY_RECIPIENT_MULT * info.risk_score;
            reasons.push(format!("recipient risk score {:.2}", info.risk_score));
        }
        if matches!(info.account_age_days, Some(age) if age < YOUNG_ACCOUNT_DAYS) {
            raw += YOUNG_ACCOUNT;
            reasons.push("recipient account under 30 days old".into());
        }
        if let Some(ref country) = info.country {
            if geo_cfg.risk_uplift(country).is_some() {
                raw += HIGH_RISK_COUNTRY;
                reasons.push(format!("recipient in high-risk country {}", country));
            }
        }
        if !info.verified {
            raw += UNVERIFIED;
            reasons.push("recipient not verified".into());
        }
    }

    // ── Burst of new recipients across the last 24h ───────────────────────────
    let distinct_new = new_recipients_last_24h(ctx);
    if distinct_new >= BURST_DISTINCT_MIN {
        raw += NEW_RECIPIENT_BURST;
        reasons.push(format!("{} new recipients in 24h", distinct_new));
    }

    let reason = if reasons.is_empty() {
        "Recipient established for this user".to_string()
    } else {
        reasons.join("; ")
    };

    let details = [
        ("recipientTxCount".to_string(), json!(findings.recipient_tx_count)),
        ("isNewRecipient".to_string(),   json!(findings.is_new_recipient)),
        ("newRecipients24h".to_string(), json!(distinct_new)),
    ].into_iter().collect::<HashMap<_, _>>();

    let factor = RiskFactor::new(AnalysisMethod::Recipient, raw.min(RAW_CAP), weight, reason, details);
    Ok((factor, findings))
}

/// Distinct recipients whose first appearance in the history snapshot
/// falls inside the trailing 24 hours.
fn new_recipients_last_24h(ctx: &UserContext) -> usize {
    let cutoff = Utc::now() - chrono::Duration::hours(24);
    let mut first_seen: HashMap<&str, chrono::DateTime<Utc>> = HashMap::new();
    for tx in &ctx.history.transactions {
        let e = first_seen.entry(tx.recipient_id.as_str()).or_insert(tx.timestamp);
        if tx.timestamp < *e { *e = tx.timestamp; }
    }
    first_seen.values().filter(|t| **t >= cutoff).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_history;
    use crate::events::HistoricalTransaction;
    use chrono::Duration;

    fn event_to(recipient: &str) -> TransactionEvent {
        serde_json::from_str(&format!(
            r#"{{
                "eventType": "TransactionCreated", "eventId": "e1",
                "timestamp": "{}",
                "payload": {{
                    "transactionId": "6f2c1a34-9d1e-4f6a-8f2e-0b8d5c1a2b3c",
                    "userId": "u1", "sourceAccountId": "s", "destinationAccountId": "d",
                    "recipientId": "{}", "amount": 100.0, "currency": "USD"
                }}
            }}"#,
            Utc::now().to_rfc3339(), recipient
        )).unwrap()
    }

    fn tx(recipient: &str, hours_ago: i64) -> HistoricalTransaction {
        HistoricalTransaction {
            amount:             100.0,
            recipient_id:       recipient.to_string(),
            country:            Some("US".into()),
            device_fingerprint: Some("d1".into()),
            timestamp:          Utc::now() - Duration::hours(hours_ago),
            fraud_score:        Some(0.0),
        }
    }

    #[tokio::test]
    async fn first_ever_recipient_flagged() {
        let ctx = UserContext::from_history(build_history(vec![tx("old", 100)], None));
        let (factor, findings) = analyze(
            &event_to("brand-new"), &ctx, None,
            &RecipientConfig::default(), &GeoConfig::default(), 0.15,
        ).await.unwrap();
        assert!(findings.is_new_recipient);
        assert!((factor.raw_score - FIRST_EVER).abs() < 1e-9);
    }

    #[tokio::test]
    async fn trusted_recipient_scores_zero() {
        let ctx = UserContext::from_history(build_history(
            vec![tx("steady", 700), tx("steady", 500), tx("steady", 300)], None,
        ));
        let (factor, findings) = analyze(
            &event_to("steady"), &ctx, None,
            &RecipientConfig::default(), &GeoConfig::default(), 0.15,
        ).await.unwrap();
        assert!(!findings.is_new_recipient);
        assert_eq!(factor.raw_score, 0.0);
    }

    #[tokio::test]
    async fn risky_unverified_young_recipient() {
        let ctx = UserContext::empty();
        let info = RecipientInfo {
            risk_score:       0.6,
            first_seen:       Utc::now() - Duration::days(100),
            tx_count:         10,
            verified:         false,
            country:          Some("NG".into()),
            account_age_days: Some(5),
        };
        let (factor, findings) = analyze(
            &event_to("sketchy"), &ctx, Some(info),
            &RecipientConfig::default(), &GeoConfig::default(), 0.15,
        ).await.unwrap();
        assert!((findings.recipient_risk_score - 0.6).abs() < 1e-9);
        // first-ever 0.15 + risk 0.2*0.6 + young 0.10 + country 0.08 +
        // unverified 0.05 = 0.50, capped at 0.45.
        assert_eq!(factor.raw_score, RAW_CAP);
    }

    #[tokio::test]
    async fn burst_of_new_recipients() {
        let ctx = UserContext::from_history(build_history(
            vec![tx("a", 1), tx("b", 2), tx("c", 3), tx("seasoned", 800)], None,
        ));
        let (factor, _) = analyze(
            &event_to("seasoned"), &ctx, None,
            &RecipientConfig::default(), &GeoConfig::default(), 0.15,
        ).await.unwrap();
        // "seasoned" itself is old; the three 24h newcomers fire the burst.
        assert!((factor.raw_score - NEW_RECIPIENT_BURST).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recently_seen_recipient_with_few_transfers() {
        let ctx = UserContext::from_history(build_history(vec![tx("fresh", 48)], None));
        let (factor, _) = analyze(
            &event_to("fresh"), &ctx, None,
            &RecipientConfig::default(), &GeoConfig::default(), 0.15,
        ).await.unwrap();
        // Known from history (not first-ever) but first seen 2 days ago with
        // a single prior transfer.
        assert!((factor.raw_score - RECENTLY_FIRST_SEEN).abs() < 1e-9);
    }
}
