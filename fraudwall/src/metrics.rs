// fraudwall/src/metrics.rs
//
// Process-wide operational counters, exported in Prometheus text format
// from a plain TCP listener.
//
//   fraudwall_events_processed_total      Counter
//   fraudwall_decisions_total{decision}   Counter
//   fraudwall_blocklist_hits_total        Counter
//   fraudwall_duplicates_total            Counter
//   fraudwall_timeouts_total              Counter
//   fraudwall_degraded_cache_total        Counter
//   fraudwall_persist_failures_total      Counter
//   fraudwall_publish_failures_total      Counter
//   fraudwall_published_total             Counter
//   fraudwall_shed_total                  Counter
//   fraudwall_score_bucket{le}            Histogram of final scores
//   fraudwall_analysis_ms_sum / _count    Latency accumulator

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::info;

use crate::events::Decision;

#[derive(Default)]
pub struct Metrics {
    pub events_processed: AtomicU64,
    pub approved:         AtomicU64,
    pub suspicious:       AtomicU64,
    pub rejected:         AtomicU64,
    pub blocklist_hits:   AtomicU64,
    pub duplicates:       AtomicU64,
    pub timeouts:         AtomicU64,
    pub degraded_cache:   AtomicU64,
    pub persist_failures: AtomicU64,
    pub publish_failures: AtomicU64,
    pub published:        AtomicU64,
    pub shed_total:       AtomicU64,
    pub analysis_ms_sum:  AtomicU64,
    pub analysis_count:   AtomicU64,
    // Final-score buckets [0.0,0.1) .. [0.9,1.0].
    pub score_buckets:    [AtomicU64; 10],
    // Mean raw score per analyzer, kept as (sum*10000, count).
    pub analyzer_scores:  parking_lot::Mutex<HashMap<&'static str, (u64, u64)>>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_decision(&self, decision: Decision) {
        match decision {
            Decision::Approve    => self.approved.fetch_add(1, Ordering::Relaxed),
            Decision::Suspicious => self.suspicious.fetch_add(1, Ordering::Relaxed),
            Decision::Reject     => self.rejected.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_score(&self, score: f64) {
        let idx = ((score * 10.0) as usize).min(9);
        self.score_buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_ms(&self, ms: u64) {
        self.analysis_ms_sum.fetch_add(ms, Ordering::Relaxed);
        self.analysis_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analyzer_score(&self, analyzer: &'static str, raw: f64) {
        let mut map = self.analyzer_scores.lock();
        let entry = map.entry(analyzer).or_insert((0, 0));
        entry.0 += (raw * 10_000.0) as u64;
        entry.1 += 1;
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        let mut counter = |name: &str, v: u64| {
            out.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, v));
        };
        counter("fraudwall_events_processed_total", self.events_processed.load(Ordering::Relaxed));
        counter("fraudwall_blocklist_hits_total",   self.blocklist_hits.load(Ordering::Relaxed));
        counter("fraudwall_duplicates_total",       self.duplicates.load(Ordering::Relaxed));
        counter("fraudwall_timeouts_total",         self.timeouts.load(Ordering::Relaxed));
        counter("fraudwall_degraded_cache_total",   self.degraded_cache.load(Ordering::Relaxed));
        counter("fraudwall_persist_failures_total", self.persist_failures.load(Ordering::Relaxed));
        counter("fraudwall_publish_failures_total", self.publish_failures.load(Ordering::Relaxed));
        counter("fraudwall_published_total",        self.published.load(Ordering::Relaxed));
        counter("fraudwall_shed_total",             self.shed_total.load(Ordering::Relaxed));

        out.push_str("# TYPE fraudwall_decisions_total counter\n");
        out.push_str(&format!("fraudwall_decisions_total{{decision=\"APPROVE\"}} {}\n",
            self.approved.load(Ordering::Relaxed)));
        out.push_str(&format!("fraudwall_decisions_total{{decision=\"SUSPICIOUS\"}} {}\n",
            self.suspicious.load(Ordering::Relaxed)));
        out.push_str(&format!("fraudwall_decisions_total{{decision=\"REJECT\"}} {}\n",
            self.rejected.load(Ordering::Relaxed)));

        out.push_str("# TYPE fraudwall_score_bucket counter\n");
        for (i, bucket) in self.score_buckets.iter().enumerate() {
            out.push_str(&format!(
                "fraudwall_score_bucket{{le=\"{:.1}\"}} {}\n",
                (i + 1) as f64 / 10.0,
                bucket.load(Ordering::Relaxed),
            ));
        }

        out.push_str(&format!(
            "# TYPE fraudwall_analysis_ms summary\nfraudwall_analysis_ms_sum {}\nfraudwall_analysis_ms_count {}\n",
            self.analysis_ms_sum.load(Ordering::Relaxed),
            self.analysis_count.load(Ordering::Relaxed),
        ));

        out.push_str("# TYPE fraudwall_analyzer_score_mean gauge\n");
        for (name, (sum, count)) in self.analyzer_scores.lock().iter() {
            let mean = if *count == 0 { 0.0 } else { *sum as f64 / 10_000.0 / *count as f64 };
            out.push_str(&format!(
                "fraudwall_analyzer_score_mean{{analyzer=\"{}\"}} {:.4}\n", name, mean,
            ));
        }

        out
    }

    /// Minimal HTTP responder for GET /metrics.
    pub async fn serve(self: Arc<Self>, port: u16) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = TcpListener::bind(addr).await?;
        info!("metrics listening on {}", addr);

        loop {
            let (mut socket, _) = listener.accept().await?;
            let body = self.render();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(), body,
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }
}
