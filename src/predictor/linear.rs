//! JSON-serialized linear progress model.
//!
//! Mirrors the preprocessing of the offline training pipeline: numeric
//! features are standardized with the stored mean and scale, categorical
//! features are one-hot encoded against a fixed vocabulary. Each output has its
//! own regression head. Weight keys are either a numeric feature name or
//! `feature=value` for a one-hot column; columns without a weight contribute 0.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::PredictionError;

use super::request::FeatureVector;
use super::{ProgressEstimate, ProgressPredictor};

#[derive(Debug, Clone, Deserialize)]
pub struct NumericFeature {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalFeature {
    pub name: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegressionHead {
    pub intercept: f64,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Targets {
    pub weeks_to_goal: RegressionHead,
    pub kg_change: RegressionHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearProgressModel {
    pub numeric_features: Vec<NumericFeature>,
    pub categorical_features: Vec<CategoricalFeature>,
    pub targets: Targets,
}

impl LinearProgressModel {
    /// Load and validate a model file.
    pub fn from_path(path: &Path) -> Result<Self, PredictionError> {
        let raw = std::fs::read_to_string(path)?;
        let model = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            numeric = model.numeric_features.len(),
            categorical = model.categorical_features.len(),
            "Progress model loaded"
        );
        Ok(model)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PredictionError> {
        let model: Self = serde_json::from_str(raw)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), PredictionError> {
        for f in &self.numeric_features {
            if !f.scale.is_finite() || f.scale == 0.0 || !f.mean.is_finite() {
                return Err(PredictionError::InvalidModel(format!(
                    "feature {} has unusable mean/scale",
                    f.name
                )));
            }
        }
        for (target, head) in [
            ("weeks_to_goal", &self.targets.weeks_to_goal),
            ("kg_change", &self.targets.kg_change),
        ] {
            for key in head.weights.keys() {
                if !self.knows_column(key) {
                    return Err(PredictionError::InvalidModel(format!(
                        "{target} weight refers to unknown column {key}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn knows_column(&self, key: &str) -> bool {
        match key.split_once('=') {
            Some((name, value)) => self
                .categorical_features
                .iter()
                .any(|c| c.name == name && c.categories.iter().any(|v| v == value)),
            None => self.numeric_features.iter().any(|f| f.name == key),
        }
    }

    /// Expand features into `(column, value)` pairs after preprocessing.
    fn encode(&self, features: &FeatureVector) -> Result<Vec<(String, f64)>, PredictionError> {
        let mut columns = Vec::new();

        for f in &self.numeric_features {
            let raw = features
                .numeric
                .get(&f.name)
                .ok_or_else(|| PredictionError::MissingFeature(f.name.clone()))?;
            columns.push((f.name.clone(), (raw - f.mean) / f.scale));
        }

        for c in &self.categorical_features {
            let value = features
                .categorical
                .get(&c.name)
                .ok_or_else(|| PredictionError::MissingFeature(c.name.clone()))?;
            if !c.categories.iter().any(|v| v == value) {
                return Err(PredictionError::UnknownCategory {
                    feature: c.name.clone(),
                    value: value.clone(),
                });
            }
            columns.push((format!("{}={}", c.name, value), 1.0));
        }

        Ok(columns)
    }

    fn apply(head: &RegressionHead, columns: &[(String, f64)]) -> f64 {
        columns.iter().fold(head.intercept, |acc, (name, x)| {
            acc + head.weights.get(name).copied().unwrap_or(0.0) * x
        })
    }

    /// Synchronous prediction.
    pub fn predict_sync(&self, features: &FeatureVector) -> Result<ProgressEstimate, PredictionError> {
        let columns = self.encode(features)?;
        let weeks = Self::apply(&self.targets.weeks_to_goal, &columns);
        let kg = Self::apply(&self.targets.kg_change, &columns);
        Ok(ProgressEstimate {
            // A linear head can dip below zero at the extremes.
            weeks_to_goal: weeks.max(0.0),
            kg_change: kg,
        })
    }
}

#[async_trait]
impl ProgressPredictor for LinearProgressModel {
    async fn predict(&self, features: &FeatureVector) -> Result<ProgressEstimate, PredictionError> {
        self.predict_sync(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::request::{PredictionRequest, TrainingHabits};
    use crate::profile::{FitnessGoal, FitnessLevel, Gender, ProfileFields};

    const TINY: &str = r#"{
        "numeric_features": [{"name": "consistency", "mean": 50.0, "scale": 25.0}],
        "categorical_features": [{"name": "goal", "categories": ["weight_loss", "muscle_gain"]}],
        "targets": {
            "weeks_to_goal": {"intercept": 10.0, "weights": {"consistency": -2.0, "goal=muscle_gain": 4.0}},
            "kg_change": {"intercept": 0.0, "weights": {"goal=weight_loss": -3.0}}
        }
    }"#;

    fn features(consistency: f64, goal: &str) -> FeatureVector {
        let mut f = FeatureVector::default();
        f.numeric.insert("consistency".into(), consistency);
        f.categorical.insert("goal".into(), goal.into());
        f
    }

    #[test]
    fn standardizes_and_one_hot_encodes() {
        let model = LinearProgressModel::from_json_str(TINY).unwrap();

        let est = model.predict_sync(&features(100.0, "weight_loss")).unwrap();
        assert!((est.weeks_to_goal - 6.0).abs() < 1e-9);
        assert!((est.kg_change + 3.0).abs() < 1e-9);

        let est = model.predict_sync(&features(50.0, "muscle_gain")).unwrap();
        assert!((est.weeks_to_goal - 14.0).abs() < 1e-9);
        assert!(est.kg_change.abs() < 1e-9);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let model = LinearProgressModel::from_json_str(TINY).unwrap();
        let err = model.predict_sync(&features(50.0, "endurance")).unwrap_err();
        assert!(matches!(err, PredictionError::UnknownCategory { ref feature, .. } if feature == "goal"));
    }

    #[test]
    fn missing_feature_is_rejected() {
        let model = LinearProgressModel::from_json_str(TINY).unwrap();
        let mut f = features(50.0, "weight_loss");
        f.numeric.clear();
        let err = model.predict_sync(&f).unwrap_err();
        assert!(matches!(err, PredictionError::MissingFeature(ref name) if name == "consistency"));
    }

    #[test]
    fn weeks_never_negative() {
        let model = LinearProgressModel::from_json_str(TINY).unwrap();
        let est = model.predict_sync(&features(500.0, "weight_loss")).unwrap();
        assert_eq!(est.weeks_to_goal, 0.0);
    }

    #[test]
    fn zero_scale_is_invalid() {
        let raw = TINY.replace("\"scale\": 25.0", "\"scale\": 0.0");
        let err = LinearProgressModel::from_json_str(&raw).unwrap_err();
        assert!(matches!(err, PredictionError::InvalidModel(_)));
    }

    #[test]
    fn weight_on_unknown_column_is_invalid() {
        let raw = TINY.replace("goal=muscle_gain", "goal=flexibility");
        assert!(matches!(
            LinearProgressModel::from_json_str(&raw),
            Err(PredictionError::InvalidModel(_))
        ));
    }

    #[test]
    fn shipped_model_accepts_full_request() {
        let model =
            LinearProgressModel::from_json_str(include_str!("../../models/progress_model.json"))
                .unwrap();
        let profile = ProfileFields {
            name: "Alice".into(),
            age: 29,
            gender: Gender::Female,
            weight_kg: 65.0,
            height_cm: 170.0,
            fitness_goal: FitnessGoal::WeightLoss,
            fitness_level: FitnessLevel::Intermediate,
        };
        let request = PredictionRequest::new(
            &profile,
            TrainingHabits {
                sessions_per_week: 4,
                session_duration_minutes: 45,
                sleep_hours: 7.0,
                diet_followed: true,
                restrictions_or_breaks: false,
                consistency_percent: 80.0,
            },
        );

        let est = model.predict_sync(&request.to_features()).unwrap();
        assert!(est.weeks_to_goal > 0.0);
        assert!(est.kg_change < 0.0, "weight loss goal should lose weight");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, TINY).unwrap();
        assert!(LinearProgressModel::from_path(&path).is_ok());

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            LinearProgressModel::from_path(&missing),
            Err(PredictionError::Io(_))
        ));
    }
}
