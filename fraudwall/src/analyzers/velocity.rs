// fraudwall/src/analyzers/velocity.rs
//
// Velocity analyzer: 5-minute / 1-hour / 24-hour counts and amount sums.
// Reads the current counters, then counts this event into all three
// windows atomically; thresholds are evaluated against the post-increment
// readings. Counters live only in the shared cache, so the numbers stay
// correct as worker pods come and go.

use serde_json::json;
use std::collections::HashMap;

use crate::config::VelocityConfig;
use crate::errors::Result;
use crate::events::{AnalysisMethod, RiskFactor, TransactionEvent, VelocitySnapshot};
use crate::store::CacheStore;

// Above-threshold contributions scale with the overshoot, up to 2x.
const OVERSHOOT_CAP:   f64 = 2.0;
const SPIKE_BONUS:     f64 = 0.12;
const DIVERSE_BONUS:   f64 = 0.10;
const RAW_CAP:         f64 = 0.45;
const DIVERSE_MIN_TX:  u64 = 3;
const DIVERSE_MIN_RCP: u64 = 3;
const SPIKE_MULTIPLE:  f64 = 10.0;

pub async fn analyze(
    event:  &TransactionEvent,
    cache:  &CacheStore,
    cfg:    &VelocityConfig,
    weight: f64,
) -> Result<(RiskFactor, VelocitySnapshot)> {
    let user_id = &event.payload.user_id;
    let amount  = event.payload.amount;

    let before = cache.get_velocity(user_id).await;
    let after  = cache.incr_velocity(user_id, amount, &event.payload.recipient_id).await;

    if !after.available {
        // Cache down: no counters to reason about, degrade to neutral.
        let factor = RiskFactor::new(
            AnalysisMethod::Velocity, 0.0, weight,
            "No velocity data",
            HashMap::new(),
        );
        return Ok((factor, after));
    }

    let (raw, reasons) = score(&before, &after, amount, cfg);
    let reason = if reasons.is_empty() {
        "Transaction velocity within normal bounds".to_string()
    } else {
        reasons.join("; ")
    };

    let details = [
        ("count5m".to_string(),             json!(after.five_min.count)),
        ("count1h".to_string(),             json!(after.one_hour.count)),
        ("count24h".to_string(),            json!(after.twenty_four_hours.count)),
        ("amount5m".to_string(),            json!(after.five_min.total_amount)),
        ("amount24h".to_string(),           json!(after.twenty_four_hours.total_amount)),
        ("uniqueRecipients5m".to_string(),  json!(after.unique_recipients_5m)),
    ].into_iter().collect();

    Ok((RiskFactor::new(AnalysisMethod::Velocity, raw, weight, reason, details), after))
}

/// Pure scoring over the pre/post readings.
pub fn score(
    before: &VelocitySnapshot,
    after:  &VelocitySnapshot,
    amount: f64,
    cfg:    &VelocityConfig,
) -> (f64, Vec<String>) {
    let mut raw     = 0.0;
    let mut reasons = Vec::new();

    let windows = [
        (after.five_min.count,          cfg.threshold_5m,  cfg.weight_5m,  "5m"),
        (after.one_hour.count,          cfg.threshold_1h,  cfg.weight_1h,  "1h"),
        (after.twenty_four_hours.count, cfg.threshold_24h, cfg.weight_24h, "24h"),
    ];
    for (count, threshold, w, tag) in windows {
        if threshold > 0 && count >= threshold {
            let overshoot = (count as f64 / threshold as f64).min(OVERSHOOT_CAP);
            raw += w * overshoot;
            reasons.push(format!("{} transfers in {} (threshold {})", count, tag, threshold));
        }
    }

    // Amount spike: this window's spend dwarfs the 24h per-transfer average.
    let count24 = before.twenty_four_hours.count;
    if count24 > 0 {
        let avg24 = before.twenty_four_hours.total_amount / count24 as f64;
        if before.five_min.total_amount + amount > SPIKE_MULTIPLE * avg24 {
            raw += SPIKE_BONUS;
            reasons.push(format!("5m spend spike vs 24h average {:.2}", avg24));
        }
    }

    // Rapid fan-out to distinct recipients inside the 5m window.
    if after.five_min.count >= DIVERSE_MIN_TX && after.unique_recipients_5m >= DIVERSE_MIN_RCP {
        raw += DIVERSE_BONUS;
        reasons.push(format!("{} distinct recipients in 5m", after.unique_recipients_5m));
    }

    (raw.min(RAW_CAP), reasons)
}
