//! Progress predictor — estimates weeks-to-goal and expected weight change.

pub mod linear;
pub mod request;

pub use linear::LinearProgressModel;
pub use request::{FeatureVector, PredictionRequest, TrainingHabits};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PredictionError;

/// The two model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEstimate {
    pub weeks_to_goal: f64,
    /// Negative means weight lost.
    pub kg_change: f64,
}

impl ProgressEstimate {
    /// Both values rounded to one decimal place.
    pub fn rounded(&self) -> Self {
        let round1 = |x: f64| (x * 10.0).round() / 10.0;
        Self {
            weeks_to_goal: round1(self.weeks_to_goal),
            kg_change: round1(self.kg_change),
        }
    }
}

/// Maps a feature vector to a progress estimate.
#[async_trait]
pub trait ProgressPredictor: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<ProgressEstimate, PredictionError>;
}
