// fraudwall/src/bus/egress.rs
//
// Outbound event publication.
//
// Messages are keyed by transaction_id (per-key ordering), GZIP-compressed,
// and carry event-type / event-version / source-service / correlation-id
// headers. The producer is configured idempotent. A publish failure is
// logged and counted; the pipeline still succeeds, because at-least-once
// delivery is supplied by redelivery of the uncommitted inbound offset.
//
// Publication rules by decision:
//   APPROVE     -> analysis topic        (FraudAnalysisComplete)
//   SUSPICIOUS  -> suspected topic       (FraudSuspected)
//                  + manual review topic (ManualReviewRequired)
//   REJECT      -> suspected topic       (FraudSuspected, or BlocklistMatch
//                  with the hashed value when a blocklist entry triggered)
//                  + manual review topic (ManualReviewRequired)
//
// Offline modes (tail / replay) swap the Kafka producer for per-topic
// JSONL files in the output directory.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DecisionThresholds, KafkaConfig};
use crate::errors::{EngineError, Result};
use crate::events::{
    Decision, Envelope, EventKind, FraudAnalysis, FraudAnalysisResult, ManualReviewRequest,
};
use crate::metrics::Metrics;

const EVENT_VERSION: &str = "1.0";

enum Sink {
    Kafka {
        producer:   FutureProducer,
        timeout_ms: u64,
    },
    // Offline modes: one JSONL file per topic, payload uncompressed for
    // direct inspection.
    Jsonl {
        out: PathBuf,
    },
}

pub struct Egress {
    sink:              Sink,
    topics:            KafkaConfig,
    service_name:      String,
    high_priority_min: f64,
    metrics:           Arc<Metrics>,
}

impl Egress {
    pub fn kafka(
        cfg:          &KafkaConfig,
        service_name: &str,
        thresholds:   &DecisionThresholds,
        metrics:      Arc<Metrics>,
    ) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", cfg.publish_timeout_ms.to_string())
            .set("retries", "5")
            .create()
            .map_err(|e| EngineError::PublishFailed {
                topic:   "producer".into(),
                message: e.to_string(),
            })?;
        info!("kafka producer ready, brokers={}", cfg.brokers);

        Ok(Self {
            sink: Sink::Kafka { producer, timeout_ms: cfg.publish_timeout_ms },
            topics:            cfg.clone(),
            service_name:      service_name.to_string(),
            high_priority_min: thresholds.high_priority_min,
            metrics,
        })
    }

    pub fn jsonl(
        output_dir:   impl Into<PathBuf>,
        cfg:          &KafkaConfig,
        service_name: &str,
        thresholds:   &DecisionThresholds,
        metrics:      Arc<Metrics>,
    ) -> Result<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out).map_err(|e| EngineError::PublishFailed {
            topic:   "jsonl".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            sink:              Sink::Jsonl { out },
            topics:            cfg.clone(),
            service_name:      service_name.to_string(),
            high_priority_min: thresholds.high_priority_min,
            metrics,
        })
    }

    /// Emit zero-to-three events matched to the decision. Individual
    /// failures are logged and counted, never propagated.
    pub async fn publish_for_analysis(
        &self,
        analysis:           &FraudAnalysis,
        blocklist_hash:     Option<String>,
    ) -> usize {
        let mut published = 0usize;
        let key = analysis.transaction_id.to_string();
        let result = FraudAnalysisResult::from_analysis(analysis, blocklist_hash.clone());

        match analysis.decision {
            Decision::Approve => {
                published += self
                    .emit(&self.topics.analysis_topic, EventKind::FraudAnalysisComplete,
                          &key, analysis.correlation_id.clone(), &result)
                    .await as usize;
            }
            Decision::Suspicious | Decision::Reject => {
                let kind = if blocklist_hash.is_some() {
                    EventKind::BlocklistMatch
                } else {
                    EventKind::FraudSuspected
                };
                published += self
                    .emit(&self.topics.suspected_topic, kind,
                          &key, analysis.correlation_id.clone(), &result)
                    .await as usize;

                let review = ManualReviewRequest::from_analysis(analysis, self.high_priority_min);
                published += self
                    .emit(&self.topics.manual_review_topic, EventKind::ManualReviewRequired,
                          &key, analysis.correlation_id.clone(), &review)
                    .await as usize;
            }
        }

        published
    }

    async fn emit<P: Serialize>(
        &self,
        topic:          &str,
        kind:           EventKind,
        key:            &str,
        correlation_id: Option<String>,
        payload:        &P,
    ) -> bool {
        let envelope = Envelope::new(kind, &self.service_name, correlation_id.clone(), payload);
        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!("envelope serialization failed for {}: {}", topic, e);
                self.metrics.publish_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return false;
            }
        };

        let sent = match &self.sink {
            Sink::Kafka { producer, timeout_ms } => {
                let compressed = gzip(&body);
                let headers = OwnedHeaders::new()
                    .insert(Header { key: "event-type",     value: Some(kind.as_str()) })
                    .insert(Header { key: "event-version",  value: Some(EVENT_VERSION) })
                    .insert(Header { key: "source-service", value: Some(self.service_name.as_str()) })
                    .insert(Header { key: "correlation-id", value: correlation_id.as_deref() });

                let record = FutureRecord::to(topic)
                    .key(key)
                    .payload(&compressed)
                    .headers(headers);

                match producer.send(record, Timeout::After(Duration::from_millis(*timeout_ms))).await {
                    Ok((partition, offset)) => {
                        debug!("published {} to {} partition={} offset={}", kind.as_str(), topic, partition, offset);
                        true
                    }
                    Err((e, _)) => {
                        warn!("publish to {} failed: {}", topic, e);
                        false
                    }
                }
            }
            Sink::Jsonl { out } => {
                let path = out.join(format!("{}.jsonl", topic));
                let mut line = body.clone();
                line.push(b'\n');
                match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
                    Ok(mut f) => {
                        use tokio::io::AsyncWriteExt;
                        f.write_all(&line).await.is_ok()
                    }
                    Err(e) => {
                        warn!("jsonl sink open {} failed: {}", path.display(), e);
                        false
                    }
                }
            }
        };

        if sent {
            self.metrics.published.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        } else {
            self.metrics.publish_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        sent
    }

    /// Flush pending Kafka deliveries; part of graceful shutdown.
    pub fn flush(&self, wait: Duration) {
        if let Sink::Kafka { producer, .. } = &self.sink {
            use rdkafka::producer::Producer;
            if let Err(e) = producer.flush(Timeout::After(wait)) {
                warn!("producer flush incomplete: {}", e);
            }
        }
    }
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AnalysisStatus, Confidence};
    use std::collections::HashMap;
    use std::io::Read;
    use uuid::Uuid;

    fn analysis(decision: Decision) -> FraudAnalysis {
        FraudAnalysis {
            analysis_id:            Uuid::new_v4(),
            transaction_id:         Uuid::new_v4(),
            user_id:                "u1".into(),
            final_score:            match decision {
                Decision::Approve    => 0.1,
                Decision::Suspicious => 0.6,
                Decision::Reject     => 0.9,
            },
            decision,
            confidence:             Confidence::Medium,
            status:                 AnalysisStatus::Completed,
            risk_factors:           Vec::new(),
            model_version:          "rule-based-v1".into(),
            analysis_time_ms:       12,
            timestamp:              chrono::Utc::now(),
            requires_manual_review: decision != Decision::Approve,
            component_scores:       HashMap::new(),
            correlation_id:         Some("corr-1".into()),
        }
    }

    fn jsonl_egress(dir: &std::path::Path) -> Egress {
        Egress::jsonl(
            dir, &KafkaConfig::default(), "fraudwall",
            &DecisionThresholds::default(), Metrics::new(),
        ).unwrap()
    }

    #[tokio::test]
    async fn approve_emits_one_analysis_event() {
        let dir = tempfile::tempdir().unwrap();
        let egress = jsonl_egress(dir.path());
        let n = egress.publish_for_analysis(&analysis(Decision::Approve), None).await;
        assert_eq!(n, 1);

        let content = std::fs::read_to_string(
            dir.path().join("banking.fraud.analysis.jsonl"),
        ).unwrap();
        assert!(content.contains("FraudAnalysisComplete"));
        assert!(!dir.path().join("banking.fraud.suspected.jsonl").exists());
    }

    #[tokio::test]
    async fn suspicious_emits_suspected_and_review() {
        let dir = tempfile::tempdir().unwrap();
        let egress = jsonl_egress(dir.path());
        let n = egress.publish_for_analysis(&analysis(Decision::Suspicious), None).await;
        assert_eq!(n, 2);

        let suspected = std::fs::read_to_string(
            dir.path().join("banking.fraud.suspected.jsonl"),
        ).unwrap();
        assert!(suspected.contains("FraudSuspected"));
        let review = std::fs::read_to_string(
            dir.path().join("banking.fraud.manual_review.jsonl"),
        ).unwrap();
        assert!(review.contains("ManualReviewRequired"));
        assert!(review.contains("\"priority\":\"MEDIUM\""));
    }

    #[tokio::test]
    async fn blocklist_reject_carries_hash_and_event_kind() {
        let dir = tempfile::tempdir().unwrap();
        let egress = jsonl_egress(dir.path());
        let n = egress
            .publish_for_analysis(&analysis(Decision::Reject), Some("ab12cd34".into()))
            .await;
        assert_eq!(n, 2);

        let suspected = std::fs::read_to_string(
            dir.path().join("banking.fraud.suspected.jsonl"),
        ).unwrap();
        assert!(suspected.contains("BlocklistMatch"));
        assert!(suspected.contains("ab12cd34"));
        let review = std::fs::read_to_string(
            dir.path().join("banking.fraud.manual_review.jsonl"),
        ).unwrap();
        assert!(review.contains("\"priority\":\"HIGH\""));
    }

    #[test]
    fn gzip_round_trip() {
        let body = br#"{"eventType":"FraudSuspected","payload":{}}"#;
        let compressed = gzip(body);
        assert!(compressed.len() > 2);
        // GZIP magic bytes.
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, body);
    }
}
