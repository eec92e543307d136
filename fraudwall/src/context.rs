// fraudwall/src/context.rs
//
// Per-user scoring context assembled by the orchestrator before fan-out.
// New users get a synthesized zero history; every analyzer tolerates
// empty sets.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::events::{HistoricalTransaction, UserHistory, UserStats};

#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub history:            UserHistory,
    pub known_devices:      HashSet<String>,
    pub known_countries:    HashSet<String>,
    pub trusted_recipients: HashSet<String>,
}

// A recipient becomes trusted after this many prior transfers.
const TRUSTED_RECIPIENT_MIN_TX: usize = 3;

impl UserContext {
    /// Context for a user with no recorded history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the known sets from the history snapshot.
    pub fn from_history(history: UserHistory) -> Self {
        let mut known_devices   = HashSet::new();
        let mut known_countries = HashSet::new();
        let mut recipient_counts: HashMap<&str, usize> = HashMap::new();

        for tx in &history.transactions {
            if let Some(ref fp) = tx.device_fingerprint {
                known_devices.insert(fp.clone());
            }
            if let Some(ref c) = tx.country {
                known_countries.insert(c.clone());
            }
            *recipient_counts.entry(tx.recipient_id.as_str()).or_default() += 1;
        }

        let trusted_recipients = recipient_counts.into_iter()
            .filter(|(_, n)| *n >= TRUSTED_RECIPIENT_MIN_TX)
            .map(|(r, _)| r.to_string())
            .collect();

        Self { history, known_devices, known_countries, trusted_recipients }
    }
}

/// Build a UserHistory snapshot from persisted transaction facets,
/// newest first. Statistics cover everything in the slice.
pub fn build_history(
    mut transactions:   Vec<HistoricalTransaction>,
    account_created_at: Option<DateTime<Utc>>,
) -> UserHistory {
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let n = transactions.len();
    if n == 0 {
        return UserHistory {
            transactions,
            stats: UserStats { account_created_at, ..UserStats::default() },
        };
    }

    let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();
    let sum: f64  = amounts.iter().sum();
    let mean      = sum / n as f64;
    let variance  = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n as f64;

    let unique_recipients = transactions.iter()
        .map(|t| t.recipient_id.as_str()).collect::<HashSet<_>>().len() as u64;
    let unique_countries = transactions.iter()
        .filter_map(|t| t.country.as_deref()).collect::<HashSet<_>>().len() as u64;
    let unique_devices = transactions.iter()
        .filter_map(|t| t.device_fingerprint.as_deref()).collect::<HashSet<_>>().len() as u64;

    let stats = UserStats {
        total_transactions:  n as u64,
        average_amount:      mean,
        max_amount:          amounts.iter().cloned().fold(f64::MIN, f64::max),
        min_amount:          amounts.iter().cloned().fold(f64::MAX, f64::min),
        std_deviation:       variance.sqrt(),
        unique_recipients,
        unique_countries,
        unique_devices,
        account_created_at,
        last_transaction_at: transactions.first().map(|t| t.timestamp),
    };

    UserHistory { transactions, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tx(amount: f64, recipient: &str, country: &str, device: &str, hours_ago: i64) -> HistoricalTransaction {
        HistoricalTransaction {
            amount,
            recipient_id:       recipient.to_string(),
            country:            Some(country.to_string()),
            device_fingerprint: Some(device.to_string()),
            timestamp:          Utc::now() - Duration::hours(hours_ago),
            fraud_score:        Some(0.1),
        }
    }

    #[test]
    fn stats_over_known_amounts() {
        let txs = vec![
            tx(100.0, "r1", "US", "d1", 1),
            tx(200.0, "r1", "US", "d1", 2),
            tx(300.0, "r2", "DE", "d2", 3),
        ];
        let h = build_history(txs, None);
        assert_eq!(h.stats.total_transactions, 3);
        assert!((h.stats.average_amount - 200.0).abs() < 1e-9);
        assert_eq!(h.stats.max_amount, 300.0);
        assert_eq!(h.stats.min_amount, 100.0);
        assert_eq!(h.stats.unique_recipients, 2);
        assert_eq!(h.stats.unique_countries, 2);
        assert_eq!(h.stats.unique_devices, 2);
        // Population std dev of {100, 200, 300}.
        assert!((h.stats.std_deviation - 81.64965809).abs() < 1e-6);
    }

    #[test]
    fn history_sorted_newest_first() {
        let txs = vec![tx(1.0, "r", "US", "d", 5), tx(2.0, "r", "US", "d", 1)];
        let h = build_history(txs, None);
        assert_eq!(h.transactions[0].amount, 2.0);
        assert_eq!(h.most_recent().unwrap().amount, 2.0);
    }

    #[test]
    fn trusted_recipients_need_three_transfers() {
        let txs = vec![
            tx(1.0, "often", "US", "d", 1),
            tx(1.0, "often", "US", "d", 2),
            tx(1.0, "often", "US", "d", 3),
            tx(1.0, "rare", "US", "d", 4),
        ];
        let ctx = UserContext::from_history(build_history(txs, None));
        assert!(ctx.trusted_recipients.contains("often"));
        assert!(!ctx.trusted_recipients.contains("rare"));
    }

    #[test]
    fn empty_context_tolerated() {
        let ctx = UserContext::empty();
        assert!(ctx.known_devices.is_empty());
        assert_eq!(ctx.history.stats.total_transactions, 0);
    }
}
