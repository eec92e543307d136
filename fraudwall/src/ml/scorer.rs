// fraudwall/src/ml/scorer.rs
//
// Model loading policy and bounded inference.
//
//   1. Primary model file, SHA-256 validated when enabled. A hash mismatch
//      is a refusal to serve, fatal at startup.
//   2. Fallback model file.
//   3. Built-in rule-based model (version "rule-based-v1", confidence 0.7).
//
// Inference is deterministic for the same (model, features) and bounded by
// inference_timeout_ms; on timeout or internal error the outcome is the
// neutral 0.5 score with confidence 0.1 and a "-error" version suffix,
// which lands in SUSPICIOUS territory and draws a manual review.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::MlConfig;
use crate::errors::{EngineError, Result};
use crate::events::{AnalysisMethod, RiskFactor};
use crate::ml::features::{FeatureVector, FEATURE_COUNT};

pub const ML_WEIGHT:          f64 = 0.30;
const RULE_BASED_VERSION:     &str = "rule-based-v1";
const RULE_BASED_CONFIDENCE:  f64 = 0.70;
const ERROR_SCORE:            f64 = 0.50;
const ERROR_CONFIDENCE:       f64 = 0.10;
const RULE_BASED_CAP:         f64 = 0.95;

#[derive(Debug, Clone)]
pub struct MlOutcome {
    pub score:         f64,
    pub confidence:    f64,
    pub model_version: String,
}

// ── Model file format ─────────────────────────────────────────────────────────

// Exported by the training pipeline: a logistic model over the 26-feature
// vector, plus the confidence the evaluation run assigned it.
#[derive(Debug, Clone, Deserialize)]
struct ModelFile {
    version:    String,
    weights:    Vec<f64>,
    bias:       f64,
    confidence: f64,
}

#[derive(Debug)]
enum Backend {
    Logistic(ModelFile),
    RuleBased,
}

pub struct MlScorer {
    backend:       Backend,
    inference_cap: Duration,
}

impl MlScorer {
    /// Apply the loading policy. Only an integrity failure is an error;
    /// every other problem degrades to the next tier.
    pub fn load(cfg: &MlConfig) -> Result<Self> {
        let inference_cap = Duration::from_millis(cfg.inference_timeout_ms);

        if let Some(ref path) = cfg.model_path {
            match load_model_file(Path::new(path), cfg)? {
                Some(model) => {
                    info!("ml model {} loaded from {}", model.version, path);
                    return Ok(Self { backend: Backend::Logistic(model), inference_cap });
                }
                None => warn!("primary model unavailable at {}", path),
            }
        }

        if let Some(ref path) = cfg.fallback_model_path {
            // The fallback file is not hash-pinned; it ships with the image.
            match read_model(Path::new(path)) {
                Some(model) => {
                    info!("fallback ml model {} loaded from {}", model.version, path);
                    return Ok(Self { backend: Backend::Logistic(model), inference_cap });
                }
                None => warn!("fallback model unavailable at {}", path),
            }
        }

        info!("serving with built-in rule-based model");
        Ok(Self { backend: Backend::RuleBased, inference_cap })
    }

    pub fn model_version(&self) -> &str {
        match &self.backend {
            Backend::Logistic(m) => &m.version,
            Backend::RuleBased   => RULE_BASED_VERSION,
        }
    }

    /// Bounded inference. Never fails: every problem maps to the neutral
    /// error outcome.
    pub async fn score(&self, features: &FeatureVector) -> MlOutcome {
        let base = self.model_version().to_string();
        let computed = timeout(self.inference_cap, async {
            match &self.backend {
                Backend::Logistic(m) => logistic_score(m, features),
                Backend::RuleBased   => Some(MlOutcome {
                    score:         rule_based_score(features),
                    confidence:    RULE_BASED_CONFIDENCE,
                    model_version: RULE_BASED_VERSION.to_string(),
                }),
            }
        }).await;

        match computed {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                warn!("ml inference error, emitting neutral score");
                error_outcome(&base)
            }
            Err(_) => {
                warn!("ml inference exceeded {}ms, emitting neutral score", self.inference_cap.as_millis());
                error_outcome(&base)
            }
        }
    }

    pub fn to_factor(outcome: &MlOutcome) -> RiskFactor {
        let details: HashMap<String, serde_json::Value> = [
            ("modelVersion".to_string(), json!(outcome.model_version)),
            ("confidence".to_string(),   json!(outcome.confidence)),
        ].into_iter().collect();
        RiskFactor::new(
            AnalysisMethod::MlModel,
            outcome.score,
            ML_WEIGHT,
            format!("Model {} scored {:.2}", outcome.model_version, outcome.score),
            details,
        )
    }
}

fn error_outcome(base_version: &str) -> MlOutcome {
    MlOutcome {
        score:         ERROR_SCORE,
        confidence:    ERROR_CONFIDENCE,
        model_version: format!("{}-error", base_version),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Err only on an integrity violation; Ok(None) when the file is simply
/// missing or unreadable.
fn load_model_file(path: &Path, cfg: &MlConfig) -> Result<Option<ModelFile>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return Ok(None),
    };

    if cfg.hash_validation {
        let expected = cfg.expected_model_hash.as_deref().unwrap_or_default();
        let actual = hex::encode(Sha256::digest(&bytes));
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(EngineError::ModelIntegrity(format!(
                "model at {} hashes to {}, expected {}", path.display(), actual, expected
            )));
        }
    }

    Ok(parse_model(&bytes))
}

fn read_model(path: &Path) -> Option<ModelFile> {
    let bytes = std::fs::read(path).ok()?;
    parse_model(&bytes)
}

fn parse_model(bytes: &[u8]) -> Option<ModelFile> {
    let model: ModelFile = serde_json::from_slice(bytes).ok()?;
    if model.weights.len() != FEATURE_COUNT {
        warn!("model has {} weights, expected {}", model.weights.len(), FEATURE_COUNT);
        return None;
    }
    Some(model)
}

// ── Inference ─────────────────────────────────────────────────────────────────

fn logistic_score(model: &ModelFile, features: &FeatureVector) -> Option<MlOutcome> {
    let x = features.to_array();
    let margin: f64 = model.weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + model.bias;
    if !margin.is_finite() {
        return None;
    }
    let score = 1.0 / (1.0 + (-margin).exp());
    Some(MlOutcome {
        score,
        confidence:    model.confidence,
        model_version: model.version.clone(),
    })
}

/// The built-in model: explainable bounded heuristics over the same
/// feature vector the trained model consumes.
pub fn rule_based_score(f: &FeatureVector) -> f64 {
    let mut score = 0.0;
    if f.tx_count_five_min > 3.0      { score += 0.15; }
    if f.tx_count_one_hour > 10.0     { score += 0.10; }
    if f.amount_ratio_to_avg > 5.0    { score += 0.20; }
    if f.impossible_travel >= 1.0     { score += 0.30; }
    if f.is_new_recipient >= 1.0      { score += 0.10; }
    if f.is_new_device >= 1.0         { score += 0.10; }
    score += 0.15 * f.previous_fraud_flags.min(3.0);
    score.min(RULE_BASED_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer(backend: Backend) -> MlScorer {
        MlScorer { backend, inference_cap: Duration::from_millis(5000) }
    }

    #[test]
    fn rule_based_quiet_features_score_zero() {
        assert_eq!(rule_based_score(&FeatureVector::default()), 0.0);
    }

    #[test]
    fn rule_based_rules_accumulate() {
        let f = FeatureVector {
            tx_count_five_min:    4.0,
            tx_count_one_hour:    11.0,
            amount_ratio_to_avg:  6.0,
            impossible_travel:    1.0,
            is_new_recipient:     1.0,
            is_new_device:        1.0,
            previous_fraud_flags: 5.0,
            ..Default::default()
        };
        // 0.15 + 0.10 + 0.20 + 0.30 + 0.10 + 0.10 + 0.45 = 1.40, capped.
        assert_eq!(rule_based_score(&f), RULE_BASED_CAP);
    }

    #[test]
    fn rule_based_impossible_travel_baseline() {
        let f = FeatureVector { impossible_travel: 1.0, ..Default::default() };
        assert!((rule_based_score(&f) - 0.30).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rule_based_outcome_carries_version() {
        let s = scorer(Backend::RuleBased);
        let out = s.score(&FeatureVector::default()).await;
        assert_eq!(out.model_version, RULE_BASED_VERSION);
        assert!((out.confidence - RULE_BASED_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn ml_factor_weight() {
        let out = MlOutcome { score: 0.5, confidence: 0.7, model_version: "rule-based-v1".into() };
        let factor = MlScorer::to_factor(&out);
        assert!((factor.contributed_score - 0.15).abs() < 1e-9);
        assert_eq!(factor.weight, ML_WEIGHT);
    }

    fn model_json() -> String {
        let weights = vec![0.0f64; FEATURE_COUNT];
        serde_json::to_string(&serde_json::json!({
            "version": "fraud-ml-v2",
            "weights": weights,
            "bias": 0.0,
            "confidence": 0.9,
        })).unwrap()
    }

    #[test]
    fn load_validates_model_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, model_json()).unwrap();
        let good_hash = hex::encode(Sha256::digest(model_json().as_bytes()));

        let cfg = MlConfig {
            model_path:          Some(path.to_string_lossy().into_owned()),
            expected_model_hash: Some(good_hash),
            hash_validation:     true,
            ..MlConfig::default()
        };
        let scorer = MlScorer::load(&cfg).unwrap();
        assert_eq!(scorer.model_version(), "fraud-ml-v2");
    }

    #[test]
    fn hash_mismatch_refuses_to_serve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, model_json()).unwrap();

        let cfg = MlConfig {
            model_path:          Some(path.to_string_lossy().into_owned()),
            expected_model_hash: Some("deadbeef".into()),
            hash_validation:     true,
            ..MlConfig::default()
        };
        assert!(matches!(MlScorer::load(&cfg), Err(EngineError::ModelIntegrity(_))));
    }

    #[test]
    fn missing_model_falls_back_to_rules() {
        let cfg = MlConfig {
            model_path:          Some("/nonexistent/model.json".into()),
            fallback_model_path: Some("/nonexistent/fallback.json".into()),
            ..MlConfig::default()
        };
        let scorer = MlScorer::load(&cfg).unwrap();
        assert_eq!(scorer.model_version(), RULE_BASED_VERSION);
    }

    #[tokio::test]
    async fn zero_weight_model_scores_half() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, model_json()).unwrap();
        let cfg = MlConfig {
            model_path:      Some(path.to_string_lossy().into_owned()),
            hash_validation: false,
            ..MlConfig::default()
        };
        let scorer = MlScorer::load(&cfg).unwrap();
        let out = scorer.score(&FeatureVector::default()).await;
        // Sigmoid of a zero margin.
        assert!((out.score - 0.5).abs() < 1e-9);
        assert!((out.confidence - 0.9).abs() < 1e-9);
    }
}
