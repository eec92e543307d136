// fraudwall/src/ml/features.rs
//
// The 26-feature vector consumed by the ML scorer. Order is part of the
// model contract: to_array() must stay in sync with the training export.
// Built after the rule analyzers finish, since several features come from
// their outputs.

use chrono::Utc;

use crate::analyzers::device::DeviceFindings;
use crate::analyzers::geographic::GeoFindings;
use crate::analyzers::recipient::RecipientFindings;
use crate::analyzers::time::TimeFindings;
use crate::context::UserContext;
use crate::events::{TransactionEvent, VelocitySnapshot};

pub const FEATURE_COUNT: usize = 26;

// History transactions scored at or above this count as prior fraud flags.
const PRIOR_FLAG_MIN: f64 = 0.70;

#[derive(Debug, Clone, Default)]
pub struct FeatureVector {
    pub tx_count_five_min:         f64,
    pub tx_count_one_hour:         f64,
    pub tx_count_twenty_four_hrs:  f64,
    pub amount_five_min:           f64,
    pub amount_one_hour:           f64,
    pub amount_twenty_four_hrs:    f64,
    pub amount:                    f64,
    pub amount_ratio_to_avg:       f64,
    pub amount_ratio_to_max:       f64,
    pub amount_z_score:            f64,
    pub is_new_country:            f64,
    pub distance_from_last_tx_km:  f64,
    pub impossible_travel:         f64,
    pub hour_of_day:               f64,
    pub day_of_week:               f64,
    pub is_unusual_hour:           f64,
    pub time_since_last_tx_ms:     f64,
    pub is_new_recipient:          f64,
    pub recipient_risk_score:      f64,
    pub recipient_tx_count:        f64,
    pub is_new_device:             f64,
    pub device_trust_score:        f64,
    pub account_age_days:          f64,
    pub total_tx_count:            f64,
    pub avg_tx_amount:             f64,
    pub previous_fraud_flags:      f64,
}

impl FeatureVector {
    pub fn build(
        event:     &TransactionEvent,
        ctx:       &UserContext,
        velocity:  &VelocitySnapshot,
        geo:       &GeoFindings,
        time:      &TimeFindings,
        recipient: &RecipientFindings,
        device:    &DeviceFindings,
    ) -> Self {
        let stats  = &ctx.history.stats;
        let amount = event.payload.amount;

        let ratio_to_avg = if stats.average_amount > 0.0 { amount / stats.average_amount } else { 0.0 };
        let ratio_to_max = if stats.max_amount > 0.0 { amount / stats.max_amount } else { 0.0 };
        let z_score = if stats.std_deviation > 0.0 {
            (amount - stats.average_amount) / stats.std_deviation
        } else {
            0.0
        };

        let time_since_last = stats.last_transaction_at
            .map(|t| (event.timestamp - t).num_milliseconds().max(0) as f64)
            .unwrap_or(0.0);
        let account_age = stats.account_created_at
            .map(|t| (Utc::now() - t).num_days().max(0) as f64)
            .unwrap_or(0.0);
        let prior_flags = ctx.history.transactions.iter()
            .filter(|t| t.fraud_score.map(|s| s >= PRIOR_FLAG_MIN).unwrap_or(false))
            .count() as f64;

        Self {
            tx_count_five_min:        velocity.five_min.count as f64,
            tx_count_one_hour:        velocity.one_hour.count as f64,
            tx_count_twenty_four_hrs: velocity.twenty_four_hours.count as f64,
            amount_five_min:          velocity.five_min.total_amount,
            amount_one_hour:          velocity.one_hour.total_amount,
            amount_twenty_four_hrs:   velocity.twenty_four_hours.total_amount,
            amount,
            amount_ratio_to_avg:      ratio_to_avg,
            amount_ratio_to_max:      ratio_to_max,
            amount_z_score:           z_score,
            is_new_country:           flag(geo.is_new_country),
            distance_from_last_tx_km: geo.distance_km.unwrap_or(0.0),
            impossible_travel:        flag(geo.impossible_travel),
            hour_of_day:              time.hour_of_day as f64,
            day_of_week:              time.day_of_week as f64,
            is_unusual_hour:          flag(time.is_unusual_hour),
            time_since_last_tx_ms:    time_since_last,
            is_new_recipient:         flag(recipient.is_new_recipient),
            recipient_risk_score:     recipient.recipient_risk_score,
            recipient_tx_count:       recipient.recipient_tx_count as f64,
            is_new_device:            flag(device.is_new_device),
            device_trust_score:       device.trust_score,
            account_age_days:         account_age,
            total_tx_count:           stats.total_transactions as f64,
            avg_tx_amount:            stats.average_amount,
            previous_fraud_flags:     prior_flags,
        }
    }

    /// Fixed model-contract ordering.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.tx_count_five_min,
            self.tx_count_one_hour,
            self.tx_count_twenty_four_hrs,
            self.amount_five_min,
            self.amount_one_hour,
            self.amount_twenty_four_hrs,
            self.amount,
            self.amount_ratio_to_avg,
            self.amount_ratio_to_max,
            self.amount_z_score,
            self.is_new_country,
            self.distance_from_last_tx_km,
            self.impossible_travel,
            self.hour_of_day,
            self.day_of_week,
            self.is_unusual_hour,
            self.time_since_last_tx_ms,
            self.is_new_recipient,
            self.recipient_risk_score,
            self.recipient_tx_count,
            self.is_new_device,
            self.device_trust_score,
            self.account_age_days,
            self.total_tx_count,
            self.avg_tx_amount,
            self.previous_fraud_flags,
        ]
    }
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
