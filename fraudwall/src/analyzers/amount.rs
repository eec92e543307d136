// fraudwall/src/analyzers/amount.rs
//
// Statistical anomaly against the user's own amount distribution, plus
// round-number and structuring heuristics. History-relative rules need at
// least MIN_HISTORY transactions and a non-zero standard deviation;
// absolute rules always apply.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

use crate::config::AmountConfig;
use crate::errors::Result;
use crate::events::{AnalysisMethod, RiskFactor, TransactionEvent, UserHistory};

const RAW_CAP:     f64 = 0.40;
const MIN_HISTORY: u64 = 5;

// Exact round figures favored by mules and test transfers.
const ROUND_EXACT: &[f64] = &[1000.0, 2000.0, 5000.0, 10_000.0, 20_000.0, 50_000.0, 100_000.0];

// US CTR reporting threshold and common sub-threshold bands.
const CTR_BAND:  (f64, f64) = (9000.0, 10_000.0);
const SUB_BAND_1: (f64, f64) = (4800.0, 5000.0);
const SUB_BAND_2: (f64, f64) = (2900.0, 3000.0);

const NEW_ACCOUNT_DAYS:       i64 = 30;
const NEW_ACCOUNT_AMOUNT_MIN: f64 = 1000.0;

pub async fn analyze(
    event:   &TransactionEvent,
    history: &UserHistory,
    cfg:     &AmountConfig,
    weight:  f64,
) -> Result<RiskFactor> {
    let (raw, reasons) = score(event.payload.amount, history, cfg);
    let reason = if reasons.is_empty() {
        "Amount consistent with user history".to_string()
    } else {
        reasons.join("; ")
    };

    let details = [
        ("amount".to_string(),       json!(event.payload.amount)),
        ("historyAvg".to_string(),   json!(history.stats.average_amount)),
        ("historyMax".to_string(),   json!(history.stats.max_amount)),
        ("historyCount".to_string(), json!(history.stats.total_transactions)),
    ].into_iter().collect::<HashMap<_, _>>();

    Ok(RiskFactor::new(AnalysisMethod::Amount, raw, weight, reason, details))
}

pub fn score(amount: f64, history: &UserHistory, cfg: &AmountConfig) -> (f64, Vec<String>) {
    let mut raw     = 0.0;
    let mut reasons = Vec::new();
    let stats       = &history.stats;
    let has_history = stats.total_transactions >= MIN_HISTORY && stats.std_deviation > 0.0;

    // ── History-relative rules ────────────────────────────────────────────────
    if has_history {
        let avg = stats.average_amount;
        if avg > 0.0 {
            if amount >= 2.0 * cfg.unusual_multiplier * avg {
                raw += 0.20;
                reasons.push(format!("{:.0}x the user's average amount", amount / avg));
            } else if amount >= cfg.unusual_multiplier * avg {
                raw += 0.12;
                reasons.push(format!("{:.1}x the user's average amount", amount / avg));
            }
        }

        if amount > 2.0 * stats.max_amount {
            raw += 0.15;
            reasons.push("more than double the historical maximum".into());
        } else if amount > 1.5 * stats.max_amount {
            raw += 0.08;
            reasons.push("exceeds 1.5x the historical maximum".into());
        }

        let z = (amount - avg) / stats.std_deviation;
        if z >= 4.0 {
            raw += 0.18;
            reasons.push(format!("z-score {:.1}", z));
        } else if z >= 3.0 {
            raw += 0.12;
            reasons.push(format!("z-score {:.1}", z));
        } else if z >= 2.0 {
            raw += 0.06;
            reasons.push(format!("z-score {:.1}", z));
        }
    }

    // ── Absolute size ─────────────────────────────────────────────────────────
    if amount >= 10.0 * cfg.large_transfer_min {
        raw += 0.12;
        reasons.push("very large transfer".into());
    } else if amount >= 5.0 * cfg.large_transfer_min {
        raw += 0.08;
        reasons.push("large transfer".into());
    } else if amount >= cfg.large_transfer_min {
        raw += 0.04;
        reasons.push("above large-transfer floor".into());
    }

    // ── Round figures ─────────────────────────────────────────────────────────
    if ROUND_EXACT.iter().any(|r| (amount - r).abs() < f64::EPSILON) {
        raw += 0.05;
        reasons.push(format!("exact round figure {:.0}", amount));
    } else if amount >= 500.0 && amount % 100.0 == 0.0 {
        raw += 0.03;
        reasons.push("round hundreds".into());
    }

    // ── Structuring bands ─────────────────────────────────────────────────────
    if amount >= CTR_BAND.0 && amount < CTR_BAND.1 {
        raw += 0.15;
        reasons.push("just below the CTR reporting threshold".into());
    } else if amount >= SUB_BAND_1.0 && amount < SUB_BAND_1.1 {
        raw += 0.08;
        reasons.push("just below 5000".into());
    } else if amount >= SUB_BAND_2.0 && amount < SUB_BAND_2.1 {
        raw += 0.05;
        reasons.push("just below 3000".into());
    }

    // ── Young account moving real money ───────────────────────────────────────
    if let Some(created) = stats.account_created_at {
        let age_days = (Utc::now() - created).num_days();
        if age_days < NEW_ACCOUNT_DAYS && amount > NEW_ACCOUNT_AMOUNT_MIN {
            raw += 0.08;
            reasons.push(format!("account only {} days old", age_days));
        }
    }

    (raw.min(RAW_CAP), reasons)
}
