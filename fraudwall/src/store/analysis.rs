// fraudwall/src/store/analysis.rs
//
// Append-only audit store. One row per transaction_id, enforced by the
// unique key; a redelivered transaction inserts nothing. Each row also
// carries the transaction facets (amount, recipient, country, device) the
// history synthesizer needs, so UserHistory can be rebuilt from this
// table alone.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::errors::Result;
use crate::events::{
    FraudAnalysis, HistoricalTransaction, ManualReviewRequest, TransactionEvent, UserHistory,
};

const HISTORY_LIMIT: i64 = 100;

pub struct AnalysisStore {
    pool: PgPool,
}

impl AnalysisStore {
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the audit row. Conflict on transaction_id is a no-op: the
    /// first completed analysis wins and redelivery adds nothing.
    pub async fn insert(&self, analysis: &FraudAnalysis, event: &TransactionEvent) -> Result<()> {
        let factors = serde_json::to_value(&analysis.risk_factors).unwrap_or_default();
        let components = serde_json::to_value(&analysis.component_scores).unwrap_or_default();
        let geo_country = event.payload.geographic.as_ref().and_then(|g| g.country.clone());
        let fingerprint = event.payload.device.as_ref().and_then(|d| d.fingerprint.clone());

        sqlx::query(
            r#"INSERT INTO fraud_analyses
                 (analysis_id, transaction_id, user_id, final_score, decision,
                  confidence, status, risk_factors, model_version, analysis_time_ms,
                  requires_manual_review, component_scores, correlation_id,
                  amount, recipient_id, country, device_fingerprint, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                       $11, $12, $13, $14, $15, $16, $17, $18)
               ON CONFLICT (transaction_id) DO NOTHING"#,
        )
        .bind(analysis.analysis_id)
        .bind(analysis.transaction_id)
        .bind(&analysis.user_id)
        .bind(analysis.final_score)
        .bind(analysis.decision.to_string())
        .bind(format!("{:?}", analysis.confidence).to_uppercase())
        .bind(format!("{:?}", analysis.status).to_uppercase())
        .bind(factors)
        .bind(&analysis.model_version)
        .bind(analysis.analysis_time_ms as i64)
        .bind(analysis.requires_manual_review)
        .bind(components)
        .bind(&analysis.correlation_id)
        .bind(event.payload.amount)
        .bind(&event.payload.recipient_id)
        .bind(geo_country)
        .bind(fingerprint)
        .bind(analysis.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_manual_review(&self, review: &ManualReviewRequest) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO manual_reviews
                 (analysis_id, transaction_id, user_id, final_score, decision,
                  priority, top_reasons, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, 'OPEN', NOW())
               ON CONFLICT (transaction_id) DO NOTHING"#,
        )
        .bind(review.analysis_id)
        .bind(review.transaction_id)
        .bind(&review.user_id)
        .bind(review.final_score)
        .bind(review.decision.to_string())
        .bind(format!("{:?}", review.priority).to_uppercase())
        .bind(serde_json::to_value(&review.top_reasons).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last-100 transaction facets for the user, newest first, plus the
    /// earliest row timestamp as the account-age proxy.
    pub async fn load_user_history(&self, user_id: &str) -> Result<UserHistory> {
        let rows = sqlx::query(
            r#"SELECT amount, recipient_id, country, device_fingerprint,
                      created_at, final_score
               FROM fraud_analyses
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            transactions.push(HistoricalTransaction {
                amount:             row.try_get("amount")?,
                recipient_id:       row.try_get("recipient_id")?,
                country:            row.try_get("country")?,
                device_fingerprint: row.try_get("device_fingerprint")?,
                timestamp:          row.try_get("created_at")?,
                fraud_score:        row.try_get("final_score")?,
            });
        }

        let account_created_at: Option<DateTime<Utc>> = sqlx::query(
            "SELECT MIN(created_at) AS first_seen FROM fraud_analyses WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("first_seen")?;

        Ok(crate::context::build_history(transactions, account_created_at))
    }
}
