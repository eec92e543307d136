pub mod features;
pub mod scorer;

pub use features::FeatureVector;
pub use scorer::{MlOutcome, MlScorer};
