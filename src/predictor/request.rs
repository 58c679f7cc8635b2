//! Prediction inputs: the typed request and the flat feature vector fed to a model.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PredictionError;
use crate::profile::{FitnessGoal, FitnessLevel, Gender, ProfileFields};

/// Numeric feature names, in the order the model was trained on.
pub const NUMERIC_FEATURES: &[&str] = &[
    "age",
    "weight",
    "height",
    "sessions_per_week",
    "session_duration",
    "sleep_hours",
    "diet_followed",
    "had_breaks",
    "consistency",
];

/// One-hot encoded features.
pub const CATEGORICAL_FEATURES: &[&str] = &["gender", "goal", "level"];

/// Habits collected by the prediction dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingHabits {
    pub sessions_per_week: u32,
    pub session_duration_minutes: u32,
    pub sleep_hours: f64,
    pub diet_followed: bool,
    pub restrictions_or_breaks: bool,
    pub consistency_percent: f64,
}

/// Everything a progress model needs about one user. Built, used once, dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub age: u32,
    pub gender: Gender,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub fitness_goal: FitnessGoal,
    pub fitness_level: FitnessLevel,
    pub habits: TrainingHabits,
}

impl PredictionRequest {
    pub fn new(profile: &ProfileFields, habits: TrainingHabits) -> Self {
        Self {
            age: profile.age,
            gender: profile.gender,
            weight_kg: profile.weight_kg,
            height_cm: profile.height_cm,
            fitness_goal: profile.fitness_goal,
            fitness_level: profile.fitness_level,
            habits,
        }
    }

    /// Check ranges before anything reaches a model.
    pub fn validate(&self) -> Result<(), PredictionError> {
        let h = &self.habits;
        let checks = [
            ("weight", self.weight_kg.is_finite() && self.weight_kg > 0.0),
            ("height", self.height_cm.is_finite() && self.height_cm > 0.0),
            ("sleep_hours", h.sleep_hours.is_finite() && h.sleep_hours >= 0.0),
            (
                "consistency",
                (0.0..=100.0).contains(&h.consistency_percent),
            ),
        ];
        for (name, ok) in checks {
            if !ok {
                return Err(PredictionError::InvalidInput(format!(
                    "{name} is out of range"
                )));
            }
        }
        Ok(())
    }

    /// Flatten into the model's named features. Booleans become 0/1.
    pub fn to_features(&self) -> FeatureVector {
        let h = &self.habits;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        let numeric = [
            ("age", self.age as f64),
            ("weight", self.weight_kg),
            ("height", self.height_cm),
            ("sessions_per_week", h.sessions_per_week as f64),
            ("session_duration", h.session_duration_minutes as f64),
            ("sleep_hours", h.sleep_hours),
            ("diet_followed", flag(h.diet_followed)),
            ("had_breaks", flag(h.restrictions_or_breaks)),
            ("consistency", h.consistency_percent),
        ];
        let categorical = [
            ("gender", self.gender.as_str()),
            ("goal", self.fitness_goal.as_str()),
            ("level", self.fitness_level.as_str()),
        ];

        FeatureVector {
            numeric: numeric
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            categorical: categorical
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Named model inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    pub numeric: BTreeMap<String, f64>,
    pub categorical: BTreeMap<String, String>,
}
