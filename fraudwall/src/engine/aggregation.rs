// fraudwall/src/engine/aggregation.rs
//
// Weighted aggregation and the threshold decision. The final score is the
// saturating sum of contributed scores; a full-weight contribution from
// the recipient or device method is a blocklist hit and forces REJECT no
// matter what the rest of the panel says.

use std::collections::HashMap;

use crate::config::DecisionThresholds;
use crate::events::{round4, AnalysisMethod, Confidence, Decision, RiskFactor};
use crate::ml::MlOutcome;

const HIGH_CONFIDENCE_ML_MIN:      f64   = 0.80;
const MEDIUM_CONFIDENCE_ML_MIN:    f64   = 0.50;
const HIGH_CONFIDENCE_MIN_FACTORS: usize = 3;

#[derive(Debug, Clone)]
pub struct Verdict {
    pub final_score:            f64,
    pub decision:               Decision,
    pub requires_manual_review: bool,
    pub confidence:             Confidence,
    pub forced_by_blocklist:    bool,
}

pub fn aggregate(
    factors:    &[RiskFactor],
    thresholds: &DecisionThresholds,
    ml:         Option<&MlOutcome>,
) -> Verdict {
    let sum: f64 = factors.iter().map(|f| f.contributed_score).sum();
    let mut final_score = round4(sum.min(1.0));

    let forced_by_blocklist = factors.iter().any(|f| {
        matches!(f.method, AnalysisMethod::Recipient | AnalysisMethod::Device)
            && f.contributed_score >= 1.0
    });

    let decision = if forced_by_blocklist {
        final_score = 1.0;
        Decision::Reject
    } else if final_score >= thresholds.reject_min {
        Decision::Reject
    } else if final_score >= thresholds.suspicious_min {
        Decision::Suspicious
    } else {
        Decision::Approve
    };

    Verdict {
        final_score,
        decision,
        requires_manual_review: decision != Decision::Approve,
        confidence:             confidence(factors, ml),
        forced_by_blocklist,
    }
}

fn confidence(factors: &[RiskFactor], ml: Option<&MlOutcome>) -> Confidence {
    let Some(ml) = ml else { return Confidence::Low };

    let nonzero_rules = factors.iter()
        .filter(|f| f.method != AnalysisMethod::MlModel && f.raw_score > 0.0)
        .count();

    if ml.confidence >= HIGH_CONFIDENCE_ML_MIN && nonzero_rules >= HIGH_CONFIDENCE_MIN_FACTORS {
        Confidence::High
    } else if ml.confidence >= MEDIUM_CONFIDENCE_ML_MIN {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Per-method raw scores for the audit record.
pub fn component_scores(factors: &[RiskFactor]) -> HashMap<String, f64> {
    factors.iter()
        .map(|f| (f.method.to_string(), f.raw_score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn factor(method: AnalysisMethod, raw: f64, weight: f64) -> RiskFactor {
        RiskFactor::new(method, raw, weight, "test", HashMap::new())
    }

    fn ml(confidence: f64) -> MlOutcome {
        MlOutcome { score: 0.2, confidence, model_version: "rule-based-v1".into() }
    }

    #[test]
    fn sum_saturates_at_one() {
        let factors = vec![
            factor(AnalysisMethod::Velocity, 1.0, 0.45),
            factor(AnalysisMethod::Amount, 1.0, 0.40),
            factor(AnalysisMethod::Geographic, 1.0, 0.50),
        ];
        let v = aggregate(&factors, &DecisionThresholds::default(), None);
        assert_eq!(v.final_score, 1.0);
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn threshold_bands() {
        let t = DecisionThresholds::default();

        let v = aggregate(&[factor(AnalysisMethod::Amount, 0.4, 0.25)], &t, None);
        assert_eq!(v.decision, Decision::Approve);
        assert!(!v.requires_manual_review);

        let v = aggregate(&[
            factor(AnalysisMethod::Amount, 1.0, 0.25),
            factor(AnalysisMethod::Velocity, 1.0, 0.25),
        ], &t, None);
        assert_eq!(v.final_score, 0.5);
        assert_eq!(v.decision, Decision::Suspicious);
        assert!(v.requires_manual_review);

        let v = aggregate(&[
            factor(AnalysisMethod::Amount, 1.0, 0.25),
            factor(AnalysisMethod::Velocity, 1.0, 0.25),
            factor(AnalysisMethod::Geographic, 1.0, 0.20),
            factor(AnalysisMethod::MlModel, 0.5, 0.30),
        ], &t, None);
        assert!(v.final_score >= 0.8);
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn exact_threshold_boundaries() {
        let t = DecisionThresholds::default();
        let v = aggregate(&[factor(AnalysisMethod::Amount, 1.0, 0.5)], &t, None);
        // Exactly 0.50 is SUSPICIOUS, not APPROVE.
        assert_eq!(v.decision, Decision::Suspicious);

        let v = aggregate(&[factor(AnalysisMethod::Amount, 1.0, 0.8)], &t, None);
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn blocklist_override_forces_reject() {
        let factors = vec![RiskFactor::blocklist_override(AnalysisMethod::Recipient, "blocklisted")];
        let v = aggregate(&factors, &DecisionThresholds::default(), None);
        assert!(v.forced_by_blocklist);
        assert_eq!(v.decision, Decision::Reject);
        assert_eq!(v.final_score, 1.0);

        // Even alongside otherwise harmless factors.
        let factors = vec![
            RiskFactor::blocklist_override(AnalysisMethod::Device, "blocklisted device"),
            factor(AnalysisMethod::Amount, 0.0, 0.25),
        ];
        let v = aggregate(&factors, &DecisionThresholds::default(), None);
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn confidence_policy() {
        let rules = vec![
            factor(AnalysisMethod::Velocity, 0.2, 0.25),
            factor(AnalysisMethod::Amount, 0.3, 0.25),
            factor(AnalysisMethod::Time, 0.1, 0.10),
        ];

        assert_eq!(confidence(&rules, None), Confidence::Low);
        assert_eq!(confidence(&rules, Some(&ml(0.9))), Confidence::High);
        assert_eq!(confidence(&rules, Some(&ml(0.6))), Confidence::Medium);
        assert_eq!(confidence(&rules, Some(&ml(0.2))), Confidence::Low);

        // High needs three non-zero rule factors.
        let sparse = vec![factor(AnalysisMethod::Velocity, 0.2, 0.25)];
        assert_eq!(confidence(&sparse, Some(&ml(0.9))), Confidence::Medium);
    }

    #[test]
    fn component_scores_keyed_by_method() {
        let factors = vec![
            factor(AnalysisMethod::Velocity, 0.2, 0.25),
            factor(AnalysisMethod::MlModel, 0.4, 0.30),
        ];
        let scores = component_scores(&factors);
        assert_eq!(scores["VELOCITY"], 0.2);
        assert_eq!(scores["ML_MODEL"], 0.4);
    }
}
