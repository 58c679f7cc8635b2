//! Step tables — the declarative description of every dialogue.
//!
//! A step names the answer it collects, the prompt that asks for it, the
//! fixed re-prompt shown on bad input, how raw text is parsed, and the
//! predicate the parsed value must satisfy. The engine walks these tables;
//! there is no per-step handler code.

use crate::profile::model::{AGE_RANGE, HEIGHT_RANGE_CM, WEIGHT_RANGE_KG};
use crate::profile::{FitnessGoal, FitnessLevel, Gender};

use super::state::AnswerValue;

/// How raw input is turned into an [`AnswerValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    /// Free text, trimmed, case preserved.
    Text,
    Int,
    Real,
    /// yes/no with synonyms.
    Bool,
    Gender,
    Goal,
    Level,
}

/// One step of a flow.
#[derive(Debug)]
pub struct Step {
    pub name: &'static str,
    pub prompt: &'static str,
    pub reprompt: &'static str,
    pub parser: Parser,
    pub accept: fn(&AnswerValue) -> bool,
}

impl Step {
    /// Normalize, parse and check `raw`. `None` means the step must re-prompt.
    pub fn validate(&self, raw: &str) -> Option<AnswerValue> {
        let value = parse(self.parser, raw)?;
        (self.accept)(&value).then_some(value)
    }
}

/// Lower-case, trim, and collapse inner whitespace.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn parse(parser: Parser, raw: &str) -> Option<AnswerValue> {
    if parser == Parser::Text {
        let text = raw.trim();
        return (!text.is_empty()).then(|| AnswerValue::Text(text.to_string()));
    }

    let norm = normalize(raw);
    match parser {
        Parser::Text => None,
        Parser::Int => norm.parse::<i64>().ok().map(AnswerValue::Int),
        Parser::Real => parse_real(&norm).map(AnswerValue::Real),
        Parser::Bool => parse_bool(&norm).map(AnswerValue::Bool),
        Parser::Gender => norm
            .parse::<Gender>()
            .ok()
            .map(|g| AnswerValue::Text(g.as_str().to_string())),
        Parser::Goal => norm
            .parse::<FitnessGoal>()
            .ok()
            .map(|g| AnswerValue::Text(g.as_str().to_string())),
        Parser::Level => norm
            .parse::<FitnessLevel>()
            .ok()
            .map(|l| AnswerValue::Text(l.as_str().to_string())),
    }
}

/// Accepts a decimal comma and an optional trailing `%`.
fn parse_real(norm: &str) -> Option<f64> {
    let cleaned = norm.trim_end_matches('%').trim().replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool(norm: &str) -> Option<bool> {
    match norm {
        "yes" | "y" | "true" | "1" | "yeah" | "yep" | "sure" => Some(true),
        "no" | "n" | "false" | "0" | "nope" => Some(false),
        _ => None,
    }
}

// ── Predicates ──────────────────────────────────────────────────────

fn any(_: &AnswerValue) -> bool {
    true
}

fn age_in_range(v: &AnswerValue) -> bool {
    v.as_int()
        .is_some_and(|n| (AGE_RANGE.0 as i64..=AGE_RANGE.1 as i64).contains(&n))
}

fn weight_in_range(v: &AnswerValue) -> bool {
    v.as_real()
        .is_some_and(|x| (WEIGHT_RANGE_KG.0..=WEIGHT_RANGE_KG.1).contains(&x))
}

fn height_in_range(v: &AnswerValue) -> bool {
    v.as_real()
        .is_some_and(|x| (HEIGHT_RANGE_CM.0..=HEIGHT_RANGE_CM.1).contains(&x))
}

fn non_negative(v: &AnswerValue) -> bool {
    v.as_real().is_some_and(|x| x >= 0.0)
}

/// A whole count that fits the `u32` the training habits store.
fn count(v: &AnswerValue) -> bool {
    v.as_int().is_some_and(|n| u32::try_from(n).is_ok())
}

fn percent(v: &AnswerValue) -> bool {
    v.as_real().is_some_and(|x| (0.0..=100.0).contains(&x))
}

// ── Flow tables ─────────────────────────────────────────────────────

pub const PROFILE_CREATION: &[Step] = &[
    Step {
        name: "name",
        prompt: "Welcome! What is your name?",
        reprompt: "Please tell me your name.",
        parser: Parser::Text,
        accept: any,
    },
    Step {
        name: "age",
        prompt: "How old are you?",
        reprompt: "Enter a valid age between 13 and 100.",
        parser: Parser::Int,
        accept: age_in_range,
    },
    Step {
        name: "gender",
        prompt: "What is your gender? (Male/Female/Other)",
        reprompt: "Enter Male, Female, or Other.",
        parser: Parser::Gender,
        accept: any,
    },
    Step {
        name: "weight",
        prompt: "What is your weight in kg?",
        reprompt: "Enter a valid weight (30-300 kg).",
        parser: Parser::Real,
        accept: weight_in_range,
    },
    Step {
        name: "height",
        prompt: "What is your height in cm?",
        reprompt: "Enter a valid height (100-250 cm).",
        parser: Parser::Real,
        accept: height_in_range,
    },
    Step {
        name: "fitness_goal",
        prompt: "What is your fitness goal? (Weight Loss/Muscle Gain/Endurance)",
        reprompt: "Choose: Weight Loss, Muscle Gain, or Endurance.",
        parser: Parser::Goal,
        accept: any,
    },
    Step {
        name: "fitness_level",
        prompt: "What is your fitness level? (Beginner/Intermediate/Advanced)",
        reprompt: "Choose: Beginner, Intermediate, or Advanced.",
        parser: Parser::Level,
        accept: any,
    },
];

pub const PLAN_IMPROVEMENT: &[Step] = &[Step {
    name: "improvement_request",
    prompt: "What would you like to change in your current plan?",
    reprompt: "Please describe what you would like to change.",
    parser: Parser::Text,
    accept: any,
}];

pub const PROGRESS_PREDICTION: &[Step] = &[
    Step {
        name: "sessions_per_week",
        prompt: "How many training sessions do you do per week?",
        reprompt: "Enter the number of sessions per week as a whole number (0 or more).",
        parser: Parser::Int,
        accept: count,
    },
    Step {
        name: "session_duration_minutes",
        prompt: "How long is a typical session, in minutes?",
        reprompt: "Enter the session length in whole minutes (0 or more).",
        parser: Parser::Int,
        accept: count,
    },
    Step {
        name: "sleep_hours",
        prompt: "How many hours do you sleep per night?",
        reprompt: "Enter your sleep in hours (0 or more).",
        parser: Parser::Real,
        accept: non_negative,
    },
    Step {
        name: "diet_followed",
        prompt: "Are you following a diet? (yes/no)",
        reprompt: "Please answer yes or no.",
        parser: Parser::Bool,
        accept: any,
    },
    Step {
        name: "restrictions_or_breaks",
        prompt: "Have you had injuries, restrictions or breaks in training? (yes/no)",
        reprompt: "Please answer yes or no.",
        parser: Parser::Bool,
        accept: any,
    },
    Step {
        name: "consistency_percent",
        prompt: "How consistent is your training, in percent (0-100)?",
        reprompt: "Enter a percentage between 0 and 100.",
        parser: Parser::Real,
        accept: percent,
    },
];
