// fraudwall/src/analyzers/device.rs
//
// New-device and user-agent heuristics plus fingerprint quality checks.
// Automation frameworks leak through the user-agent string; synthetic
// fingerprints leak through low character diversity. The fingerprint
// blocklist short-circuit lives in the orchestrator's pre-scoring gate.

use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::context::UserContext;
use crate::errors::Result;
use crate::events::{AnalysisMethod, DeviceInfo, RiskFactor, TransactionEvent};

const RAW_CAP:         f64 = 0.40;
const NEUTRAL_UNKNOWN: f64 = 0.12;  // neither fingerprint nor user-agent

const UNKNOWN_DEVICE:     f64 = 0.12;
const FIRST_EVER_DEVICE:  f64 = 0.06;
const LOW_TRUST_MULT:     f64 = 0.15;
const LOW_TRUST_MAX:      f64 = 0.50;
const AUTOMATION_UA:      f64 = 0.25;
const ANCIENT_BROWSER:    f64 = 0.08;
const UNUSUAL_LINUX:      f64 = 0.05;
const SHORT_UA:           f64 = 0.15;
const ANONYMIZER_UA:      f64 = 0.10;
const PATTERN_DISRUPTION: f64 = 0.10;
const FP_SHORT:           f64 = 0.15;
const FP_LOW_DIVERSITY:   f64 = 0.20;
const FP_DEGENERATE:      f64 = 0.25;

const AUTOMATION_MARKERS: &[&str] = &[
    "headlesschrome", "phantomjs", "selenium", "puppeteer",
    "playwright", "crawl", "bot", "spider",
];
const ANONYMIZER_MARKERS: &[&str] = &["proxy", "vpn", "tor", "anonymous"];

const MIN_UA_LEN:          usize = 20;
const MIN_FP_LEN:          usize = 16;
const MIN_FP_UNIQUE_CHARS: usize = 4;
const STABLE_DEVICE_MAX:   usize = 2;
const STABLE_HISTORY_MIN:  u64   = 50;
const MIN_CHROME_MAJOR:    u32   = 70;
const MIN_FIREFOX_MAJOR:   u32   = 60;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFindings {
    pub is_new_device: bool,
    pub trust_score:   f64,
}

pub async fn analyze(
    event:  &TransactionEvent,
    ctx:    &UserContext,
    info:   Option<DeviceInfo>,
    weight: f64,
) -> Result<(RiskFactor, DeviceFindings)> {
    let device      = event.payload.device.as_ref();
    let fingerprint = device.and_then(|d| d.fingerprint.as_deref());
    let user_agent  = device.and_then(|d| d.user_agent.as_deref());

    let mut findings = DeviceFindings { is_new_device: false, trust_score: 1.0 };

    if fingerprint.is_none() && user_agent.is_none() {
        let factor = RiskFactor::new(
            AnalysisMethod::Device, NEUTRAL_UNKNOWN, weight,
            "No device signal supplied",
            HashMap::new(),
        );
        findings.trust_score = 0.5;
        return Ok((factor, findings));
    }

    let mut raw     = 0.0;
    let mut reasons = Vec::new();

    // ── Fingerprint vs known-device set ───────────────────────────────────────
    if let Some(fp) = fingerprint {
        if !ctx.known_devices.contains(fp) {
            findings.is_new_device = true;
            if ctx.known_devices.is_empty() {
                raw += FIRST_EVER_DEVICE;
                reasons.push("first recorded device".into());
            } else {
                raw += UNKNOWN_DEVICE;
                reasons.push("device not seen before".into());
            }
        }

        if let Some(ref info) = info {
            findings.trust_score = info.trust_score;
            if info.trust_score < LOW_TRUST_MAX {
                raw += (1.0 - info.trust_score) * LOW_TRUST_MULT;
                reasons.push(format!("device trust {:.2}", info.trust_score));
            }
        }

        // Long-tenured users with at most two devices abruptly presenting
        // a new one.
        if findings.is_new_device
            && ctx.known_devices.len() <= STABLE_DEVICE_MAX
            && ctx.history.stats.total_transactions >= STABLE_HISTORY_MIN
        {
            raw += PATTERN_DISRUPTION;
            reasons.push("new device breaks a long stable pattern".into());
        }

        for (bump, why) in fingerprint_quality(fp) {
            raw += bump;
            reasons.push(why);
        }
    }

    // ── User-agent heuristics ─────────────────────────────────────────────────
    if let Some(ua) = user_agent {
        let ua_lower = ua.to_lowercase();

        if AUTOMATION_MARKERS.iter().any(|m| ua_lower.contains(m)) {
            raw += AUTOMATION_UA;
            reasons.push("automation framework user-agent".into());
        }
        if ANONYMIZER_MARKERS.iter().any(|m| ua_lower.contains(m)) {
            raw += ANONYMIZER_UA;
            reasons.push("anonymizer marker in user-agent".into());
        }
        if ua.len() < MIN_UA_LEN {
            raw += SHORT_UA;
            reasons.push("abnormally short user-agent".into());
        }

        match (browser_major(&ua_lower, "chrome/"), browser_major(&ua_lower, "firefox/")) {
            (Some(v), _) if v < MIN_CHROME_MAJOR => {
                raw += ANCIENT_BROWSER;
                reasons.push(format!("chrome {} long out of support", v));
            }
            (_, Some(v)) if v < MIN_FIREFOX_MAJOR => {
                raw += ANCIENT_BROWSER;
                reasons.push(format!("firefox {} long out of support", v));
            }
            (chrome, firefox) => {
                if ua_lower.contains("linux") && chrome.is_none() && firefox.is_none() {
                    raw += UNUSUAL_LINUX;
                    reasons.push("uncommon linux browser".into());
                }
            }
        }
    }

    let reason = if reasons.is_empty() {
        "Device consistent with user history".to_string()
    } else {
        reasons.join("; ")
    };

    let details = [
        ("isNewDevice".to_string(),  json!(findings.is_new_device)),
        ("trustScore".to_string(),   json!(findings.trust_score)),
        ("knownDevices".to_string(), json!(ctx.known_devices.len())),
    ].into_iter().collect();

    let factor = RiskFactor::new(AnalysisMethod::Device, raw.min(RAW_CAP), weight, reason, details);
    Ok((factor, findings))
}

/// Length and diversity checks on the fingerprint itself. Degenerate
/// strings outrank plain low diversity; short strings flag independently.
fn fingerprint_quality(fp: &str) -> Vec<(f64, String)> {
    let mut hits = Vec::new();

    if fp.len() < MIN_FP_LEN {
        hits.push((FP_SHORT, format!("fingerprint only {} chars", fp.len())));
    }

    let unique: HashSet<char> = fp.chars().collect();
    let all_same = unique.len() == 1;
    let all_zero = !fp.is_empty() && fp.chars().all(|c| c == '0');
    if all_same || all_zero {
        hits.push((FP_DEGENERATE, "degenerate fingerprint".into()));
    } else if unique.len() < MIN_FP_UNIQUE_CHARS {
        hits.push((FP_LOW_DIVERSITY, format!("{} distinct fingerprint chars", unique.len())));
    }

    hits
}

/// Extract the major version following a marker like "chrome/".
fn browser_major(ua_lower: &str, marker: &str) -> Option<u32> {
    let idx = ua_lower.find(marker)? + marker.len();
    let rest = &ua_lower[idx..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_history;
    use crate::events::HistoricalTransaction;
    use chrono::Utc;

    fn event(fingerprint: Option<&str>, ua: Option<&str>) -> TransactionEvent {
        let device = match (fingerprint, ua) {
            (None, None) => "null".to_string(),
            (fp, ua) => format!(
                r#"{{ "fingerprint": {}, "userAgent": {} }}"#,
                fp.map(|v| format!("\"{}\"", v)).unwrap_or("null".into()),
                ua.map(|v| format!("\"{}\"", v)).unwrap_or("null".into()),
            ),
        };
        serde_json::from_str(&format!(
            r#"{{
                "eventType": "TransactionCreated", "eventId": "e1",
                "timestamp": "{}",
                "payload": {{
                    "transactionId": "6f2c1a34-9d1e-4f6a-8f2e-0b8d5c1a2b3c",
                    "userId": "u1", "sourceAccountId": "s", "destinationAccountId": "d",
                    "recipientId": "r", "amount": 100.0, "currency": "USD",
                    "device": {}
                }}
            }}"#,
            Utc::now().to_rfc3339(), device
        )).unwrap()
    }

    fn ctx_with_devices(devices: &[&str], total_tx: u64) -> UserContext {
        let txs = devices.iter().map(|d| HistoricalTransaction {
            amount:             100.0,
            recipient_id:       "r".into(),
            country:            Some("US".into()),
            device_fingerprint: Some(d.to_string()),
            timestamp:          Utc::now(),
            fraud_score:        Some(0.0),
        }).collect();
        let mut ctx = UserContext::from_history(build_history(txs, None));
        ctx.history.stats.total_transactions = total_tx;
        ctx
    }

    const GOOD_FP: &str = "a1b2c3d4e5f60718fe";
    const GOOD_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0.0.0 Safari/537.36";

    #[tokio::test]
    async fn absent_device_is_neutral_unknown() {
        let (factor, _) = analyze(&event(None, None), &UserContext::empty(), None, 0.15)
            .await.unwrap();
        assert!((factor.raw_score - NEUTRAL_UNKNOWN).abs() < 1e-9);
    }

    #[tokio::test]
    async fn known_device_clean_ua_scores_zero() {
        let ctx = ctx_with_devices(&[GOOD_FP], 20);
        let (factor, findings) = analyze(&event(Some(GOOD_FP), Some(GOOD_UA)), &ctx, None, 0.15)
            .await.unwrap();
        assert!(!findings.is_new_device);
        assert_eq!(factor.raw_score, 0.0);
    }

    #[tokio::test]
    async fn new_device_against_known_set() {
        let ctx = ctx_with_devices(&["otherdevicefp1234"], 20);
        let (factor, findings) = analyze(&event(Some(GOOD_FP), Some(GOOD_UA)), &ctx, None, 0.15)
            .await.unwrap();
        assert!(findings.is_new_device);
        assert!((factor.raw_score - UNKNOWN_DEVICE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn first_ever_device_scores_lower() {
        let (factor, findings) = analyze(
            &event(Some(GOOD_FP), Some(GOOD_UA)), &UserContext::empty(), None, 0.15,
        ).await.unwrap();
        assert!(findings.is_new_device);
        assert!((factor.raw_score - FIRST_EVER_DEVICE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn automation_user_agent() {
        let ua = "Mozilla/5.0 HeadlessChrome/120.0.0.0 Safari/537.36";
        let ctx = ctx_with_devices(&[GOOD_FP], 20);
        let (factor, _) = analyze(&event(Some(GOOD_FP), Some(ua)), &ctx, None, 0.15)
            .await.unwrap();
        assert!((factor.raw_score - AUTOMATION_UA).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ancient_chrome_flagged() {
        let ua = "Mozilla/5.0 (Windows NT 6.1) Chrome/49.0.2623.112 Safari/537.36";
        let ctx = ctx_with_devices(&[GOOD_FP], 20);
        let (factor, _) = analyze(&event(Some(GOOD_FP), Some(ua)), &ctx, None, 0.15)
            .await.unwrap();
        assert!((factor.raw_score - ANCIENT_BROWSER).abs() < 1e-9);
    }

    #[tokio::test]
    async fn degenerate_fingerprint() {
        let ctx = ctx_with_devices(&["0000000000000000"], 20);
        let (factor, _) = analyze(&event(Some("0000000000000000"), Some(GOOD_UA)), &ctx, None, 0.15)
            .await.unwrap();
        // Known device, but all-zero fingerprint fires the degeneracy rule.
        assert!((factor.raw_score - FP_DEGENERATE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn short_low_diversity_fingerprint_stacks() {
        let (factor, _) = analyze(
            &event(Some("ababab"), Some(GOOD_UA)), &UserContext::empty(), None, 0.15,
        ).await.unwrap();
        // first-ever 0.06 + short 0.15 + two distinct chars 0.20 = 0.41, capped.
        assert_eq!(factor.raw_score, RAW_CAP);
    }

    #[tokio::test]
    async fn low_trust_device() {
        let ctx = ctx_with_devices(&[GOOD_FP], 20);
        let info = DeviceInfo {
            trust_score: 0.2,
            first_seen:  Utc::now(),
            last_seen:   Utc::now(),
        };
        let (factor, findings) = analyze(&event(Some(GOOD_FP), Some(GOOD_UA)), &ctx, Some(info), 0.15)
            .await.unwrap();
        assert!((findings.trust_score - 0.2).abs() < 1e-9);
        assert!((factor.raw_score - 0.8 * LOW_TRUST_MULT).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stable_pattern_disruption() {
        let ctx = ctx_with_devices(&["devicefpabcdef12", "devicefpabcdef34"], 80);
        let (factor, _) = analyze(&event(Some(GOOD_FP), Some(GOOD_UA)), &ctx, None, 0.15)
            .await.unwrap();
        // unknown device 0.12 + disruption 0.10.
        assert!((factor.raw_score - (UNKNOWN_DEVICE + PATTERN_DISRUPTION)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pattern_disruption_covers_first_recorded_fingerprint() {
        // Fifty prior transfers, none with a fingerprint on record: the
        // first device submission still counts as a pattern break.
        let ctx = ctx_with_devices(&[], 80);
        let (factor, findings) = analyze(&event(Some(GOOD_FP), Some(GOOD_UA)), &ctx, None, 0.15)
            .await.unwrap();
        assert!(findings.is_new_device);
        assert!((factor.raw_score - (FIRST_EVER_DEVICE + PATTERN_DISRUPTION)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn short_anonymizer_ua() {
        let ctx = ctx_with_devices(&[GOOD_FP], 20);
        let (factor, _) = analyze(&event(Some(GOOD_FP), Some("tor-client/1.0")), &ctx, None, 0.15)
            .await.unwrap();
        // anonymizer 0.10 + short 0.15 + unusual non-browser 0.00 (no linux).
        assert!((factor.raw_score - (ANONYMIZER_UA + SHORT_UA)).abs() < 1e-9);
    }
}
