// fraudwall/src/bus/ingress.rs
//
// Ordered consumption with at-least-once semantics.
//
// Events route to workers by partition, so each partition is processed
// serially: the transfer service keys by userId, which gives serial
// analysis per user with no cross-user ordering guarantee. Offsets are
// stored only after the pipeline finishes (commit-after-publish); a crash
// between publish and commit redelivers, and the idempotency marker
// suppresses the duplicate.
//
// Malformed or invalid events are poison pills: logged, counted, and their
// offset stored so they are never re-queued.

use std::io::Read;
use std::sync::Arc;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::TopicPartitionList;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use anyhow::{Context, Result};

use crate::config::{KafkaConfig, RuntimeConfig};
use crate::engine::Orchestrator;
use crate::events::TransactionEvent;
use crate::load_shedder::LoadShedder;

// Sized above the shedder's high-water mark so backpressure engages only
// after shedding has already given up on low-priority traffic.
const WORKER_CHANNEL_CAP: usize = 16_384;

struct WorkItem {
    event:     TransactionEvent,
    partition: i32,
    offset:    i64,
}

pub struct Ingress {
    consumer: Arc<StreamConsumer>,
    kafka:    KafkaConfig,
    runtime:  RuntimeConfig,
}

impl Ingress {
    pub fn connect(kafka: &KafkaConfig, runtime: &RuntimeConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.brokers)
            .set("group.id", &kafka.group_id)
            .set("session.timeout.ms", kafka.session_timeout_ms.to_string())
            .set("enable.auto.commit", "true")
            // Offsets are stored manually after publish; auto-commit only
            // flushes what we have explicitly stored.
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .context("kafka consumer creation")?;

        consumer
            .subscribe(&[kafka.inbound_topic.as_str()])
            .context("inbound topic subscription")?;
        info!("consuming {} as group {}", kafka.inbound_topic, kafka.group_id);

        Ok(Self {
            consumer: Arc::new(consumer),
            kafka:    kafka.clone(),
            runtime:  runtime.clone(),
        })
    }

    /// Consume until shutdown flips, then drain the workers.
    pub async fn run(
        &self,
        orchestrator: Arc<Orchestrator>,
        shedder:      Arc<LoadShedder>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let n_workers = self.runtime.workers;
        let mut senders = Vec::with_capacity(n_workers);
        let mut workers = JoinSet::new();

        for worker_id in 0..n_workers {
            let (tx, rx) = mpsc::channel::<WorkItem>(WORKER_CHANNEL_CAP);
            senders.push(tx);
            workers.spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&orchestrator),
                Arc::clone(&shedder),
                Arc::clone(&self.consumer),
                self.kafka.inbound_topic.clone(),
            ));
        }

        let metrics = Arc::clone(&orchestrator.metrics);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingress pausing for shutdown");
                        break;
                    }
                }
                polled = self.consumer.recv() => {
                    match polled {
                        Ok(message) => self.dispatch(&message, &senders, &shedder, &metrics).await,
                        Err(e) => {
                            error!("consumer poll failed: {}", e);
                            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        }
                    }
                }
            }
        }

        // Drain: close the channels, let in-flight analyses finish.
        drop(senders);
        while workers.join_next().await.is_some() {}
        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            warn!("final offset commit failed: {}", e);
        }
        info!("ingress drained");
    }

    async fn dispatch(
        &self,
        message: &BorrowedMessage<'_>,
        senders: &[mpsc::Sender<WorkItem>],
        shedder: &LoadShedder,
        metrics: &crate::metrics::Metrics,
    ) {
        let partition = message.partition();
        let offset    = message.offset();

        let event = match parse_event(message.payload()) {
            Ok(event) => event,
            Err(e) => {
                // Poison pill: skip and store the offset so it never retries.
                warn!("dropping event at {}/{}: {}", partition, offset, e);
                self.store_offset(partition, offset);
                return;
            }
        };

        let idx = partition.unsigned_abs() as usize % senders.len();
        let sender = &senders[idx];

        let depth = WORKER_CHANNEL_CAP - sender.capacity();
        if !shedder.should_process(&event.payload.user_id, depth) {
            debug!("shed event {} at depth {}", event.event_id, depth);
            metrics.shed_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.store_offset(partition, offset);
            return;
        }

        if sender.send(WorkItem { event, partition, offset }).await.is_err() {
            warn!("worker {} channel closed, event at {}/{} redelivers", idx, partition, offset);
        }
    }

    fn store_offset(&self, partition: i32, offset: i64) {
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(
            &self.kafka.inbound_topic, partition, rdkafka::Offset::Offset(offset + 1),
        );
        if let Err(e) = self.consumer.store_offsets(&tpl) {
            warn!("offset store failed at {}/{}: {}", partition, offset, e);
        }
    }
}

async fn worker_loop(
    worker_id:    usize,
    mut rx:       mpsc::Receiver<WorkItem>,
    orchestrator: Arc<Orchestrator>,
    shedder:      Arc<LoadShedder>,
    consumer:     Arc<StreamConsumer>,
    topic:        String,
) {
    info!("worker {} up", worker_id);
    while let Some(item) = rx.recv().await {
        match orchestrator.process(&item.event).await {
            Ok(outcome) => {
                if let crate::engine::ProcessOutcome::Completed { decision, .. } = outcome {
                    shedder.record_decision(&item.event.payload.user_id, decision);
                }
            }
            Err(e) => {
                // Recoverable failures degrade inside the pipeline; anything
                // surfacing here is unexpected but must not wedge the worker.
                error!("worker {} pipeline error for {}: {}", worker_id, item.event.event_id, e);
            }
        }

        // Commit-after-publish: the offset is stored only now.
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(
            &topic, item.partition, rdkafka::Offset::Offset(item.offset + 1),
        );
        if let Err(e) = consumer.store_offsets(&tpl) {
            warn!("offset store failed at {}/{}: {}", item.partition, item.offset, e);
        }
    }
    info!("worker {} drained", worker_id);
}

/// Decode and validate an inbound payload. Producers may gzip bodies; both
/// plain and gzipped JSON are accepted.
pub fn parse_event(payload: Option<&[u8]>) -> std::result::Result<TransactionEvent, String> {
    let bytes = payload.ok_or("empty payload")?;

    let decoded: Vec<u8>;
    let json_bytes: &[u8] = if bytes.len() > 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| format!("gzip: {}", e))?;
        decoded = out;
        &decoded
    } else {
        bytes
    };

    let event: TransactionEvent =
        serde_json::from_slice(json_bytes).map_err(|e| format!("json: {}", e))?;
    event.validate()?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn valid_json() -> String {
        format!(
            r#"{{
                "eventType": "TransactionCreated", "eventId": "evt-1",
                "timestamp": "{}",
                "payload": {{
                    "transactionId": "6f2c1a34-9d1e-4f6a-8f2e-0b8d5c1a2b3c",
                    "userId": "u1", "sourceAccountId": "s", "destinationAccountId": "d",
                    "recipientId": "r", "amount": 42.0, "currency": "USD"
                }}
            }}"#,
            chrono::Utc::now().to_rfc3339()
        )
    }

    #[test]
    fn parses_plain_json() {
        let event = parse_event(Some(valid_json().as_bytes())).unwrap();
        assert_eq!(event.payload.amount, 42.0);
    }

    #[test]
    fn parses_gzipped_json() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(valid_json().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let event = parse_event(Some(&compressed)).unwrap();
        assert_eq!(event.payload.user_id, "u1");
    }

    #[test]
    fn rejects_poison_pills() {
        assert!(parse_event(None).is_err());
        assert!(parse_event(Some(b"not json")).is_err());

        let bad_amount = valid_json().replace("42.0", "-1.0");
        let err = parse_event(Some(bad_amount.as_bytes())).unwrap_err();
        assert!(err.contains("amount"));
    }
}
