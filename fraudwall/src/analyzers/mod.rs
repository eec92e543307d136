// fraudwall/src/analyzers/mod.rs
//
// Concurrent fan-out over the six rule analyzers. Every analyzer call is
// wrapped so a failure or timeout degrades to a zero-score factor instead
// of aborting the pipeline. Completed factors land in a shared scratchpad
// as they finish, so a blown overall deadline still has the partial
// results to decide from.

pub mod amount;
pub mod device;
pub mod geographic;
pub mod recipient;
pub mod time;
pub mod velocity;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::AppConfig;
use crate::context::UserContext;
use crate::errors::Result;
use crate::events::{AnalysisMethod, RiskFactor, TransactionEvent, VelocitySnapshot};
use crate::store::CacheStore;

use device::DeviceFindings;
use geographic::{GeoFindings, GeoIntel};
use recipient::RecipientFindings;
use time::TimeFindings;

/// Factors completed so far, shared with the orchestrator's deadline race.
pub type Scratchpad = Arc<Mutex<Vec<RiskFactor>>>;

pub fn scratchpad() -> Scratchpad {
    Arc::new(Mutex::new(Vec::with_capacity(8)))
}

/// Side outputs the ML feature builder needs from the rule analyzers.
#[derive(Debug, Default)]
pub struct AnalyzerOutput {
    pub velocity:  VelocitySnapshot,
    pub geo:       GeoFindings,
    pub time:      TimeFindings,
    pub recipient: RecipientFindings,
    pub device:    DeviceFindings,
}

/// Run all six analyzers concurrently. Factors are pushed into the
/// scratchpad in completion order; findings come back for feature building.
pub async fn run_all(
    event:      &TransactionEvent,
    ctx:        &UserContext,
    cache:      &CacheStore,
    intel:      &dyn GeoIntel,
    cfg:        &AppConfig,
    scratchpad: &Scratchpad,
) -> AnalyzerOutput {
    let weights = &cfg.weights;
    let cap_ms  = cfg.runtime.analyzer_timeout_ms;

    let velocity_fut = guarded(
        AnalysisMethod::Velocity, weights.velocity, cap_ms, scratchpad,
        velocity::analyze(event, cache, &cfg.velocity, weights.velocity),
    );

    let amount_fut = guarded_factor(
        AnalysisMethod::Amount, weights.amount, cap_ms, scratchpad,
        amount::analyze(event, &ctx.history, &cfg.amount, weights.amount),
    );

    let geo_fut = guarded(
        AnalysisMethod::Geographic, weights.geographic, cap_ms, scratchpad,
        async {
            let last = cache.get_last_geo(&event.payload.user_id).await;
            let out = geographic::analyze(event, ctx, last, intel, &cfg.geo, weights.geographic).await?;
            let resolved = out.1.resolved_country.clone();
            if let Some(current) = geographic::current_geo(event, resolved.as_deref()) {
                cache.set_last_geo(&event.payload.user_id, &current).await;
            }
            Ok(out)
        },
    );

    let recipient_fut = guarded(
        AnalysisMethod::Recipient, weights.recipient, cap_ms, scratchpad,
        async {
            let info = cache.get_recipient_info(&event.payload.recipient_id).await;
            recipient::analyze(event, ctx, info, &cfg.recipient, &cfg.geo, weights.recipient).await
        },
    );

    let device_fut = guarded(
        AnalysisMethod::Device, weights.device, cap_ms, scratchpad,
        async {
            let fp = event.payload.device.as_ref().and_then(|d| d.fingerprint.as_deref());
            let info = match fp {
                Some(fp) => cache.get_device_info(fp).await,
                None     => None,
            };
            device::analyze(event, ctx, info, weights.device).await
        },
    );

    let time_fut = guarded(
        AnalysisMethod::Time, weights.time, cap_ms, scratchpad,
        time::analyze(event, ctx, weights.time),
    );

    let (velocity, _, geo, recipient, device, time) = tokio::join!(
        velocity_fut, amount_fut, geo_fut, recipient_fut, device_fut, time_fut,
    );

    AnalyzerOutput { velocity, geo, time, recipient, device }
}

/// Wrap an analyzer returning (factor, findings): on error or timeout the
/// factor degrades to zero and the findings to their defaults.
async fn guarded<T, F>(
    method:     AnalysisMethod,
    weight:     f64,
    cap_ms:     u64,
    scratchpad: &Scratchpad,
    fut:        F,
) -> T
where
    T: Default,
    F: Future<Output = Result<(RiskFactor, T)>>,
{
    let outcome = tokio::time::timeout(std::time::Duration::from_millis(cap_ms), fut).await;
    let (factor, findings) = match outcome {
        Ok(Ok((factor, findings))) => (factor, findings),
        Ok(Err(e)) => {
            warn!("{} analyzer degraded: {}", method, e);
            (RiskFactor::unavailable(method, weight), T::default())
        }
        Err(_) => {
            warn!("{} analyzer exceeded {}ms", method, cap_ms);
            (RiskFactor::unavailable(method, weight), T::default())
        }
    };
    scratchpad.lock().push(factor);
    findings
}

async fn guarded_factor<F>(
    method:     AnalysisMethod,
    weight:     f64,
    cap_ms:     u64,
    scratchpad: &Scratchpad,
    fut:        F,
) where
    F: Future<Output = Result<RiskFactor>>,
{
    let outcome = tokio::time::timeout(std::time::Duration::from_millis(cap_ms), fut).await;
    let factor = match outcome {
        Ok(Ok(factor)) => factor,
        Ok(Err(e)) => {
            warn!("{} analyzer degraded: {}", method, e);
            RiskFactor::unavailable(method, weight)
        }
        Err(_) => {
            warn!("{} analyzer exceeded {}ms", method, cap_ms);
            RiskFactor::unavailable(method, weight)
        }
    };
    scratchpad.lock().push(factor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use std::collections::HashMap;

    #[tokio::test]
    async fn guarded_neutralizes_errors() {
        let pad = scratchpad();
        let findings: GeoFindings = guarded(
            AnalysisMethod::Geographic, 0.20, 1000, &pad,
            async {
                Err::<(RiskFactor, GeoFindings), _>(EngineError::AnalyzerFailed {
                    analyzer: "geographic",
                    message:  "boom".into(),
                })
            },
        ).await;
        assert!(!findings.impossible_travel);

        let factors = pad.lock();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].raw_score, 0.0);
        assert_eq!(factors[0].reason, "Analysis unavailable");
    }

    #[tokio::test]
    async fn guarded_neutralizes_timeouts() {
        let pad = scratchpad();
        let _: GeoFindings = guarded(
            AnalysisMethod::Geographic, 0.20, 10, &pad,
            async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok((RiskFactor::new(AnalysisMethod::Geographic, 0.5, 0.2, "late", HashMap::new()),
                    GeoFindings::default()))
            },
        ).await;
        let factors = pad.lock();
        assert_eq!(factors[0].contributed_score, 0.0);
    }

    #[tokio::test]
    async fn guarded_passes_through_success() {
        let pad = scratchpad();
        let findings: GeoFindings = guarded(
            AnalysisMethod::Geographic, 0.20, 1000, &pad,
            async {
                Ok((
                    RiskFactor::new(AnalysisMethod::Geographic, 0.35, 0.20, "travel", HashMap::new()),
                    GeoFindings { impossible_travel: true, ..GeoFindings::default() },
                ))
            },
        ).await;
        assert!(findings.impossible_travel);
        assert!((pad.lock()[0].contributed_score - 0.07).abs() < 1e-9);
    }
}
