// fraudwall/src/analyzers/time.rs
//
// Hour and day-of-week pattern deviation, late-night and weekend checks.
// Preferred hours and days are mined from the user's history: an hour
// qualifies at a 10% share, a day at 5%, both requiring at least ten
// historical transactions. Hours are UTC throughout.

use chrono::{Datelike, Timelike, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::context::UserContext;
use crate::errors::Result;
use crate::events::{AnalysisMethod, RiskFactor, TransactionEvent, UserHistory};

const RAW_CAP: f64 = 0.25;

const QUIET_HOURS_NO_PROFILE: f64 = 0.06;
const FAR_FROM_PREFERRED:     f64 = 0.10;
const OFF_PREFERRED:          f64 = 0.05;
const ODD_DAY_WEEKEND:        f64 = 0.06;
const ODD_DAY:                f64 = 0.04;
const DEEP_NIGHT:             f64 = 0.08;
const MIDNIGHT:               f64 = 0.04;
const WEEKEND_BURST:          f64 = 0.08;
const HOLIDAY:                f64 = 0.04;
const NIGHT_ACTIVITY_BURST:   f64 = 0.10;

const MIN_PROFILE_TX:      usize = 10;
const HOUR_SHARE_MIN:      f64   = 0.10;
const DAY_SHARE_MIN:       f64   = 0.05;
const WEEKEND_HISTORY_MIN: u64   = 50;
const BURST_TX_LAST_HOUR:  usize = 3;

// Fixed-date holiday set: Jan 1, Jul 4, Dec 25, Dec 31.
const HOLIDAYS: &[(u32, u32)] = &[(1, 1), (7, 4), (12, 25), (12, 31)];

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeFindings {
    pub hour_of_day:     u32,
    pub day_of_week:     u32,   // 0 = Sunday
    pub is_unusual_hour: bool,
}

pub async fn analyze(
    event:  &TransactionEvent,
    ctx:    &UserContext,
    weight: f64,
) -> Result<(RiskFactor, TimeFindings)> {
    let ts   = event.timestamp;
    let hour = ts.hour();
    let day  = ts.weekday().num_days_from_sunday();

    let mut raw      = 0.0;
    let mut reasons  = Vec::new();
    let mut findings = TimeFindings { hour_of_day: hour, day_of_week: day, is_unusual_hour: false };

    let profile = TimeProfile::from_history(&ctx.history);

    // ── Hour deviation ────────────────────────────────────────────────────────
    if profile.preferred_hours.is_empty() {
        if (1..=5).contains(&hour) {
            raw += QUIET_HOURS_NO_PROFILE;
            findings.is_unusual_hour = true;
            reasons.push(format!("unprofiled user at {:02}:00", hour));
        }
    } else {
        let dist = profile.preferred_hours.iter()
            .map(|&p| circular_hour_distance(hour, p))
            .min()
            .unwrap_or(0);
        if dist >= 6 {
            raw += FAR_FROM_PREFERRED;
            findings.is_unusual_hour = true;
            reasons.push(format!("{}h from any preferred hour", dist));
        } else if dist >= 3 {
            raw += OFF_PREFERRED;
            findings.is_unusual_hour = true;
            reasons.push(format!("{}h from preferred hours", dist));
        }
    }

    // ── Day deviation ─────────────────────────────────────────────────────────
    let is_weekend = day == 0 || day == 6;
    if !profile.preferred_days.is_empty() && !profile.preferred_days.contains(&day) {
        let weekday_only = profile.preferred_days.iter().all(|&d| d != 0 && d != 6);
        if is_weekend && weekday_only {
            raw += ODD_DAY_WEEKEND;
            reasons.push("weekend transfer from a weekday-only user".into());
        } else {
            raw += ODD_DAY;
            reasons.push("transfer outside the usual days".into());
        }
    }

    // ── Late night ────────────────────────────────────────────────────────────
    if (2..=5).contains(&hour) {
        raw += DEEP_NIGHT;
        reasons.push(format!("deep-night transfer at {:02}:00", hour));
    } else if hour <= 1 {
        raw += MIDNIGHT;
        reasons.push("around-midnight transfer".into());
    }

    // ── Weekend burst after a weekday-only record ─────────────────────────────
    if is_weekend
        && ctx.history.stats.total_transactions >= WEEKEND_HISTORY_MIN
        && !ctx.history.transactions.iter().any(|t| {
            let d = t.timestamp.weekday().num_days_from_sunday();
            d == 0 || d == 6
        })
    {
        raw += WEEKEND_BURST;
        reasons.push("first weekend activity on a seasoned account".into());
    }

    // ── Holiday ───────────────────────────────────────────────────────────────
    if HOLIDAYS.contains(&(ts.month(), ts.day())) {
        raw += HOLIDAY;
        reasons.push("holiday transfer".into());
    }

    // ── Burst at an unusual hour ──────────────────────────────────────────────
    if (1..=5).contains(&hour) {
        let hour_ago = ts - chrono::Duration::hours(1);
        let recent = ctx.history.transactions.iter()
            .filter(|t| t.timestamp >= hour_ago && t.timestamp <= ts)
            .count();
        if recent >= BURST_TX_LAST_HOUR {
            raw += NIGHT_ACTIVITY_BURST;
            reasons.push(format!("{} transfers within the night hour", recent));
        }
    }

    let reason = if reasons.is_empty() {
        "Timing consistent with user pattern".to_string()
    } else {
        reasons.join("; ")
    };

    let details = [
        ("hourOfDay".to_string(),      json!(hour)),
        ("dayOfWeek".to_string(),      json!(day)),
        ("preferredHours".to_string(), json!(profile.preferred_hours.iter().collect::<Vec<_>>())),
    ].into_iter().collect::<HashMap<_, _>>();

    let factor = RiskFactor::new(AnalysisMethod::Time, raw.min(RAW_CAP), weight, reason, details);
    Ok((factor, findings))
}

// ── Preference profile ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TimeProfile {
    pub preferred_hours: HashSet<u32>,
    pub preferred_days:  HashSet<u32>,
}

impl TimeProfile {
    pub fn from_history(history: &UserHistory) -> Self {
        let n = history.transactions.len();
        if n < MIN_PROFILE_TX {
            return Self::default();
        }

        let mut hour_counts = [0usize; 24];
        let mut day_counts  = [0usize; 7];
        for tx in &history.transactions {
            hour_counts[tx.timestamp.hour() as usize] += 1;
            day_counts[tx.timestamp.weekday().num_days_from_sunday() as usize] += 1;
        }

        let preferred_hours = hour_counts.iter().enumerate()
            .filter(|(_, &c)| c as f64 / n as f64 >= HOUR_SHARE_MIN)
            .map(|(h, _)| h as u32)
            .collect();
        let preferred_days = day_counts.iter().enumerate()
            .filter(|(_, &c)| c as f64 / n as f64 >= DAY_SHARE_MIN)
            .map(|(d, _)| d as u32)
            .collect();

        Self { preferred_hours, preferred_days }
    }
}

/// Shortest distance between two hours on the 24h circle.
pub fn circular_hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b);
    d.min(24 - d)
}
