//! User profile data model.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Age range accepted by the profile dialogue (inclusive).
pub const AGE_RANGE: (u32, u32) = (13, 100);
/// Weight range in kilograms (inclusive).
pub const WEIGHT_RANGE_KG: (f64, f64) = (30.0, 300.0);
/// Height range in centimetres (inclusive).
pub const HEIGHT_RANGE_CM: (f64, f64) = (100.0, 250.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    /// Parse already-normalized (trimmed, lower-case) input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown gender: {s}")),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the user is training for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
    WeightLoss,
    MuscleGain,
    Endurance,
}

impl FitnessGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightLoss => "weight_loss",
            Self::MuscleGain => "muscle_gain",
            Self::Endurance => "endurance",
        }
    }

    /// Human-readable label, as offered in the dialogue.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WeightLoss => "Weight Loss",
            Self::MuscleGain => "Muscle Gain",
            Self::Endurance => "Endurance",
        }
    }
}

impl FromStr for FitnessGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weight loss" | "weight_loss" | "weightloss" | "lose weight" => Ok(Self::WeightLoss),
            "muscle gain" | "muscle_gain" | "musclegain" | "gain muscle" => Ok(Self::MuscleGain),
            "endurance" => Ok(Self::Endurance),
            _ => Err(format!("unknown fitness goal: {s}")),
        }
    }
}

impl std::fmt::Display for FitnessGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for FitnessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(format!("unknown fitness level: {s}")),
        }
    }
}

impl std::fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The seven required profile attributes, collected by the profile dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub fitness_goal: FitnessGoal,
    pub fitness_level: FitnessLevel,
}

/// Persisted profile: the required fields plus the last generated plan.
///
/// Stored as one flat row per user in the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub fields: ProfileFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_plan: Option<String>,
}

impl UserProfile {
    pub fn new(fields: ProfileFields) -> Self {
        Self {
            fields,
            last_plan: None,
        }
    }

    pub fn has_plan(&self) -> bool {
        self.last_plan.is_some()
    }

    /// Render the profile as `Field: value` lines for the show-profile reply.
    pub fn to_display_lines(&self) -> String {
        let f = &self.fields;
        let mut lines = vec![
            format!("Name: {}", f.name),
            format!("Age: {}", f.age),
            format!("Gender: {}", f.gender),
            format!("Weight: {} kg", format_number(f.weight_kg)),
            format!("Height: {} cm", format_number(f.height_cm)),
            format!("Fitness Goal: {}", f.fitness_goal.label()),
            format!("Fitness Level: {}", f.fitness_level),
        ];
        if self.has_plan() {
            lines.push("Plan: saved (use /improve or /deleteplan)".to_string());
        } else {
            lines.push("Plan: none yet (use /plan)".to_string());
        }
        lines.join("\n")
    }
}

/// Format a measurement without a trailing `.0` for whole numbers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ProfileFields {
        ProfileFields {
            name: "Alice".to_string(),
            age: 29,
            gender: Gender::Female,
            weight_kg: 65.0,
            height_cm: 170.0,
            fitness_goal: FitnessGoal::WeightLoss,
            fitness_level: FitnessLevel::Intermediate,
        }
    }

    #[test]
    fn enum_display_matches_serde() {
        let goals = [
            FitnessGoal::WeightLoss,
            FitnessGoal::MuscleGain,
            FitnessGoal::Endurance,
        ];
        for goal in goals {
            let json = serde_json::to_string(&goal).unwrap();
            assert_eq!(format!("\"{goal}\""), json);
        }
        assert_eq!(serde_json::to_string(&Gender::Other).unwrap(), "\"other\"");
        assert_eq!(
            serde_json::to_string(&FitnessLevel::Advanced).unwrap(),
            "\"advanced\""
        );
    }

    #[test]
    fn goal_synonyms() {
        assert_eq!("weight loss".parse::<FitnessGoal>(), Ok(FitnessGoal::WeightLoss));
        assert_eq!("weight_loss".parse::<FitnessGoal>(), Ok(FitnessGoal::WeightLoss));
        assert_eq!("muscle gain".parse::<FitnessGoal>(), Ok(FitnessGoal::MuscleGain));
        assert!("get big".parse::<FitnessGoal>().is_err());
    }

    #[test]
    fn gender_short_forms() {
        assert_eq!("m".parse::<Gender>(), Ok(Gender::Male));
        assert_eq!("f".parse::<Gender>(), Ok(Gender::Female));
        assert!("Male".parse::<Gender>().is_err(), "input must be normalized first");
    }

    #[test]
    fn profile_serializes_flat() {
        let mut profile = UserProfile::new(alice());
        profile.last_plan = Some("Day 1: run".to_string());

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["name"], "Alice");
        assert_eq!(value["fitness_goal"], "weight_loss");
        assert_eq!(value["last_plan"], "Day 1: run");

        let parsed: UserProfile = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn profile_without_plan_omits_key() {
        let value = serde_json::to_value(UserProfile::new(alice())).unwrap();
        assert!(value.get("last_plan").is_none());
    }

    #[test]
    fn display_lines_include_all_fields() {
        let text = UserProfile::new(alice()).to_display_lines();
        assert!(text.contains("Name: Alice"));
        assert!(text.contains("Age: 29"));
        assert!(text.contains("Gender: female"));
        assert!(text.contains("Weight: 65 kg"));
        assert!(text.contains("Height: 170 cm"));
        assert!(text.contains("Fitness Goal: Weight Loss"));
        assert!(text.contains("Fitness Level: intermediate"));
        assert!(text.contains("Plan: none yet"));
    }

    #[test]
    fn display_lines_keep_fractional_weight() {
        let mut fields = alice();
        fields.weight_kg = 65.5;
        let text = UserProfile::new(fields).to_display_lines();
        assert!(text.contains("Weight: 65.5 kg"));
    }
}
