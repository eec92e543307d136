// fraudwall/src/engine/orchestrator.rs
//
// The per-transaction pipeline:
//
//   idempotency check -> blocklist gate -> context load -> parallel
//   scoring under the hard deadline -> ML -> aggregation -> persist ->
//   publish -> idempotency marker
//
// Anything recoverable degrades: a dead cache yields an empty context, a
// dead database skips persistence, a publish failure is logged. The only
// outcome that drops a decision is a poison-pill event rejected by the
// ingress layer before this code runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzers::{self, geographic::GeoIntel};
use crate::config::AppConfig;
use crate::context::UserContext;
use crate::engine::aggregation::{aggregate, component_scores};
use crate::errors::Result;
use crate::events::{
    AnalysisMethod, AnalysisStatus, BlocklistEntry, BlocklistType, Decision, DeviceInfo,
    FraudAnalysis, IdempotencyMarker, ManualReviewRequest, RecipientInfo, RiskFactor,
    TransactionEvent, UserHistory,
};
use crate::metrics::Metrics;
use crate::ml::{FeatureVector, MlOutcome, MlScorer};
use crate::bus::egress::Egress;
use crate::store::{AnalysisStore, BlocklistStore, CacheStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    /// Idempotency marker present: no side effects.
    Duplicate,
    Completed { decision: Decision, final_score: f64 },
}

pub struct Orchestrator {
    pub(crate) cache:     Arc<CacheStore>,
    pub(crate) blocklist: Arc<BlocklistStore>,
    pub(crate) analyses:  Arc<AnalysisStore>,
    pub(crate) scorer:    Arc<MlScorer>,
    pub(crate) egress:    Arc<Egress>,
    pub(crate) intel:     Arc<dyn GeoIntel>,
    pub(crate) cfg:       Arc<AppConfig>,
    pub(crate) metrics:   Arc<Metrics>,
}

impl Orchestrator {
    pub async fn process(&self, event: &TransactionEvent) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let tx_id = event.payload.transaction_id;

        // ── 1. Idempotency ────────────────────────────────────────────────────
        if let Some(marker) = self.cache.idempotency_marker(tx_id).await {
            debug!("duplicate delivery of {} ({} at {})", tx_id, marker.decision, marker.timestamp);
            self.metrics.duplicates.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(ProcessOutcome::Duplicate);
        }
        // The marker write can be lost to a cache hiccup while the analysis
        // survives; treat a cached analysis the same and re-mark.
        if let Some(prior) = self.cache.cached_analysis(tx_id).await {
            debug!("duplicate delivery of {} (cached analysis {})", tx_id, prior.analysis_id);
            let marker = IdempotencyMarker {
                decision:  prior.decision,
                score:     prior.final_score,
                timestamp: prior.timestamp,
            };
            self.cache.set_idempotency_marker(tx_id, &marker).await;
            self.metrics.duplicates.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(ProcessOutcome::Duplicate);
        }

        // ── 2. Blocklist gate ─────────────────────────────────────────────────
        // A hit outranks every other signal and terminates scoring.
        if let Some((entry, method)) = self.blocklist_gate(event).await {
            return Ok(self.reject_from_blocklist(event, entry, method, started).await);
        }

        // ── 3. Context ────────────────────────────────────────────────────────
        let ctx = self.load_context(&event.payload.user_id).await;

        // ── 4. Scoring under the hard deadline ────────────────────────────────
        let pad = analyzers::scratchpad();
        let deadline = Duration::from_millis(self.cfg.runtime.processing_timeout_ms);

        let scoring = async {
            let output = analyzers::run_all(event, &ctx, &self.cache, self.intel.as_ref(), &self.cfg, &pad).await;
            let features = FeatureVector::build(
                event, &ctx, &output.velocity, &output.geo, &output.time,
                &output.recipient, &output.device,
            );
            let ml = self.scorer.score(&features).await;
            pad.lock().push(MlScorer::to_factor(&ml));
            (output, ml)
        };

        let (status, ml) = match tokio::time::timeout(deadline, scoring).await {
            Ok((output, ml)) => {
                if !output.velocity.available {
                    self.metrics.degraded_cache.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                (AnalysisStatus::Completed, Some(ml))
            }
            Err(_) => {
                warn!("analysis of {} blew the {}ms deadline, deciding on partial factors",
                      tx_id, deadline.as_millis());
                self.metrics.timeouts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                (AnalysisStatus::Timeout, None)
            }
        };

        let factors: Vec<RiskFactor> = pad.lock().clone();

        // ── 5. Aggregation & decision ─────────────────────────────────────────
        let verdict = aggregate(&factors, &self.cfg.thresholds, ml.as_ref());

        let analysis = self.build_analysis(event, factors, &verdict, status, ml.as_ref(), started);

        // ── 6..8. Persist, publish, marker ────────────────────────────────────
        self.finish(event, &analysis, None).await;
        self.update_entity_caches(event, &analysis).await;

        Ok(ProcessOutcome::Completed {
            decision:    analysis.decision,
            final_score: analysis.final_score,
        })
    }

    // ── Blocklist gate ────────────────────────────────────────────────────────

    async fn blocklist_gate(&self, event: &TransactionEvent) -> Option<(BlocklistEntry, AnalysisMethod)> {
        let p = &event.payload;

        let checks: [(BlocklistType, Option<&str>, AnalysisMethod); 3] = [
            (BlocklistType::Recipient, Some(p.recipient_id.as_str()), AnalysisMethod::Recipient),
            (BlocklistType::Account, Some(p.destination_account_id.as_str()), AnalysisMethod::Recipient),
            (BlocklistType::Device,
             p.device.as_ref().and_then(|d| d.fingerprint.as_deref()),
             AnalysisMethod::Device),
        ];

        for (entry_type, value, method) in checks {
            let Some(value) = value else { continue };
            if let Some(entry) = self.blocklist.lookup(&self.cache, entry_type, value).await {
                info!("blocklist hit: {} {} for tx {}",
                      entry.entry_type, &entry.value_hash[..12], p.transaction_id);
                return Some((entry, method));
            }
        }
        None
    }

    async fn reject_from_blocklist(
        &self,
        event:   &TransactionEvent,
        entry:   BlocklistEntry,
        method:  AnalysisMethod,
        started: Instant,
    ) -> ProcessOutcome {
        self.metrics.blocklist_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if let Err(e) = self.blocklist.record_match(&entry).await {
            warn!("blocklist match accounting failed: {}", e);
        }

        let factor = RiskFactor::blocklist_override(
            method,
            format!("Blocklisted {}: {}", entry.entry_type, entry.reason),
        );
        let verdict = aggregate(&[factor.clone()], &self.cfg.thresholds, None);

        let mut analysis = self.build_analysis(
            event, vec![factor], &verdict, AnalysisStatus::Completed, None, started,
        );
        // The gate is policy, not a model readout.
        analysis.confidence = crate::events::Confidence::High;

        self.finish(event, &analysis, Some(entry.value_hash.clone())).await;

        ProcessOutcome::Completed {
            decision:    Decision::Reject,
            final_score: analysis.final_score,
        }
    }

    // ── Context loading ───────────────────────────────────────────────────────

    async fn load_context(&self, user_id: &str) -> UserContext {
        if let Some(history) = self.cache.get_user_history(user_id).await {
            return UserContext::from_history(history);
        }

        match self.analyses.load_user_history(user_id).await {
            Ok(history) => {
                self.cache.set_user_history(user_id, &history).await;
                UserContext::from_history(history)
            }
            Err(e) => {
                warn!("history load degraded for {}: {}", user_id, e);
                UserContext::from_history(UserHistory::empty())
            }
        }
    }

    // ── Assembly ──────────────────────────────────────────────────────────────

    fn build_analysis(
        &self,
        event:   &TransactionEvent,
        factors: Vec<RiskFactor>,
        verdict: &crate::engine::aggregation::Verdict,
        status:  AnalysisStatus,
        ml:      Option<&MlOutcome>,
        started: Instant,
    ) -> FraudAnalysis {
        let model_version = ml
            .map(|m| m.model_version.clone())
            .unwrap_or_else(|| self.scorer.model_version().to_string());

        FraudAnalysis {
            analysis_id:            Uuid::new_v4(),
            transaction_id:         event.payload.transaction_id,
            user_id:                event.payload.user_id.clone(),
            final_score:            verdict.final_score,
            decision:               verdict.decision,
            confidence:             verdict.confidence,
            status,
            component_scores:       component_scores(&factors),
            risk_factors:           factors,
            model_version,
            analysis_time_ms:       started.elapsed().as_millis() as u64,
            timestamp:              Utc::now(),
            requires_manual_review: verdict.requires_manual_review,
            correlation_id:         event.correlation_id.clone(),
        }
    }

    /// Persist, publish and mark. Persistence failures never block the
    /// publish: the bus message is the authoritative record.
    async fn finish(&self, event: &TransactionEvent, analysis: &FraudAnalysis, blocklist_hash: Option<String>) {
        if let Err(e) = self.analyses.insert(analysis, event).await {
            warn!("analysis persistence skipped for {}: {}", analysis.transaction_id, e);
            self.metrics.persist_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        if analysis.requires_manual_review {
            let review = ManualReviewRequest::from_analysis(analysis, self.cfg.thresholds.high_priority_min);
            if let Err(e) = self.analyses.insert_manual_review(&review).await {
                warn!("manual review persistence skipped for {}: {}", analysis.transaction_id, e);
                self.metrics.persist_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        self.egress.publish_for_analysis(analysis, blocklist_hash).await;

        let marker = IdempotencyMarker {
            decision:  analysis.decision,
            score:     analysis.final_score,
            timestamp: analysis.timestamp,
        };
        self.cache.set_idempotency_marker(analysis.transaction_id, &marker).await;
        self.cache.cache_analysis(analysis).await;
        self.cache.invalidate_user_history(&analysis.user_id).await;

        self.metrics.events_processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.metrics.record_decision(analysis.decision);
        self.metrics.record_score(analysis.final_score);
        self.metrics.record_analysis_ms(analysis.analysis_time_ms);
        for factor in &analysis.risk_factors {
            self.metrics.record_analyzer_score(factor.method.as_str(), factor.raw_score);
        }

        info!(
            "tx {} user {} score {:.4} {} ({:?}, {}ms)",
            analysis.transaction_id, analysis.user_id, analysis.final_score,
            analysis.decision, analysis.status, analysis.analysis_time_ms,
        );
    }

    // ── Entity cache upkeep ───────────────────────────────────────────────────

    // Keeps the device trust and recipient profiles the analyzers read
    // fresh after each decision. Pure cache state; safe to lose.
    async fn update_entity_caches(&self, event: &TransactionEvent, analysis: &FraudAnalysis) {
        let now = Utc::now();

        if let Some(fp) = event.payload.device.as_ref().and_then(|d| d.fingerprint.as_deref()) {
            let updated = match self.cache.get_device_info(fp).await {
                Some(mut info) => {
                    info.last_seen = now;
                    info.trust_score = adjust_trust(info.trust_score, analysis.decision);
                    info
                }
                None => DeviceInfo {
                    trust_score: initial_trust(analysis.decision),
                    first_seen:  now,
                    last_seen:   now,
                },
            };
            self.cache.set_device_info(fp, &updated).await;
        }

        let recipient_id = &event.payload.recipient_id;
        let updated = match self.cache.get_recipient_info(recipient_id).await {
            Some(mut info) => {
                info.tx_count += 1;
                info.risk_score = 0.8 * info.risk_score + 0.2 * analysis.final_score;
                info
            }
            None => RecipientInfo {
                risk_score:       0.3 * analysis.final_score,
                first_seen:       now,
                tx_count:         1,
                verified:         false,
                country:          None,
                account_age_days: None,
            },
        };
        self.cache.set_recipient_info(recipient_id, &updated).await;
    }
}

fn adjust_trust(trust: f64, decision: Decision) -> f64 {
    match decision {
        Decision::Approve    => (trust + 0.02).min(1.0),
        Decision::Suspicious => trust * 0.90,
        Decision::Reject     => trust * 0.50,
    }
}

fn initial_trust(decision: Decision) -> f64 {
    match decision {
        Decision::Approve => 0.60,
        _                 => 0.30,
    }
}
