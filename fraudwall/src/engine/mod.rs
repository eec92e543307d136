// fraudwall/src/engine/mod.rs
//
// Process-wide collaborator assembly. Everything is instantiated once at
// startup, in dependency order: metrics, cache, database pool, stores,
// model, egress, orchestrator. close() flushes pending publishes and
// releases connections after in-flight analyses have drained.

pub mod aggregation;
pub mod orchestrator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::analyzers::geographic::{GeoIntel, NoopGeoIntel};
use crate::bus::egress::Egress;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::metrics::Metrics;
use crate::ml::MlScorer;
use crate::store::{AnalysisStore, BlocklistStore, CacheStore};

pub use orchestrator::{Orchestrator, ProcessOutcome};

pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics:      Arc<Metrics>,
    egress:           Arc<Egress>,
    pool:             PgPool,
}

pub struct EngineBuilder {
    cfg:        AppConfig,
    offline_to: Option<PathBuf>,
    intel:      Arc<dyn GeoIntel>,
}

impl EngineBuilder {
    pub fn new(cfg: AppConfig) -> Self {
        Self {
            cfg,
            offline_to: None,
            intel:      Arc::new(NoopGeoIntel),
        }
    }

    /// Swap the Kafka producer for per-topic JSONL files (tail / replay).
    pub fn offline(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.offline_to = Some(output_dir.into());
        self
    }

    pub fn geo_intel(mut self, intel: Arc<dyn GeoIntel>) -> Self {
        self.intel = intel;
        self
    }

    pub async fn build(self) -> Result<Engine> {
        let cfg = Arc::new(self.cfg);
        let metrics = Metrics::new();

        // Model first: an integrity failure must refuse to serve before we
        // touch any infrastructure.
        let scorer = Arc::new(MlScorer::load(&cfg.ml)?);

        let cache = Arc::new(CacheStore::connect(&cfg.cache).await?);

        let pool = PgPoolOptions::new()
            .max_connections(cfg.database.max_connections)
            .connect(&cfg.database.url)
            .await?;
        info!("database pool ready ({} connections max)", cfg.database.max_connections);

        let blocklist = Arc::new(BlocklistStore::with_pool(pool.clone()));
        let analyses  = Arc::new(AnalysisStore::with_pool(pool.clone()));

        let egress = Arc::new(match self.offline_to {
            Some(dir) => Egress::jsonl(dir, &cfg.kafka, &cfg.runtime.service_name,
                                       &cfg.thresholds, Arc::clone(&metrics))?,
            None => Egress::kafka(&cfg.kafka, &cfg.runtime.service_name,
                                  &cfg.thresholds, Arc::clone(&metrics))?,
        });

        let orchestrator = Arc::new(Orchestrator {
            cache,
            blocklist,
            analyses,
            scorer,
            egress: Arc::clone(&egress),
            intel: self.intel,
            cfg,
            metrics: Arc::clone(&metrics),
        });

        Ok(Engine { orchestrator, metrics, egress, pool })
    }
}

impl Engine {
    /// Cooperative shutdown tail: the ingress is already paused and
    /// in-flight analyses drained by the caller.
    pub async fn close(&self, flush_wait: Duration) {
        self.egress.flush(flush_wait);
        self.pool.close().await;
        info!("engine closed");
    }
}
