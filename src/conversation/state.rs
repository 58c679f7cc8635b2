//! Flow state machine — tracks which step of which dialogue a user is in.

use serde::{Deserialize, Serialize};

use super::steps::{self, Step};

/// The dialogues a user can be in.
///
/// Each kind owns a fixed, ordered step table (see [`steps`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    ProfileCreation,
    PlanImprovement,
    ProgressPrediction,
}

impl FlowKind {
    /// The ordered steps of this flow.
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Self::ProfileCreation => steps::PROFILE_CREATION,
            Self::PlanImprovement => steps::PLAN_IMPROVEMENT,
            Self::ProgressPrediction => steps::PROGRESS_PREDICTION,
        }
    }

    /// Short description used in conflict replies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProfileCreation => "creating your profile",
            Self::PlanImprovement => "improving your plan",
            Self::ProgressPrediction => "a progress prediction",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProfileCreation => "profile_creation",
            Self::PlanImprovement => "plan_improvement",
            Self::ProgressPrediction => "progress_prediction",
        };
        write!(f, "{s}")
    }
}

/// A validated, normalized answer to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Integers widen to reals.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One collected answer, keyed by the step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub step: String,
    pub value: AnswerValue,
}

/// A user's position inside an active flow.
///
/// Persisted in the `flow_states` table as JSON so a dialogue survives a
/// restart. Answers are kept in collection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub kind: FlowKind,
    pub current_step: usize,
    pub answers: Vec<Answer>,
}

impl FlowState {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            current_step: 0,
            answers: Vec::new(),
        }
    }

    /// The step waiting for an answer, or `None` once every step is answered.
    pub fn current(&self) -> Option<&'static Step> {
        self.kind.steps().get(self.current_step)
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.kind.steps().len()
    }

    /// Store an answer for the current step and advance by exactly one.
    /// Returns an error if the flow is already complete.
    pub fn record(&mut self, value: AnswerValue) -> Result<(), String> {
        let step = self
            .current()
            .ok_or_else(|| format!("Flow {} has no step left to answer", self.kind))?;
        self.answers.push(Answer {
            step: step.name.to_string(),
            value,
        });
        self.current_step += 1;
        Ok(())
    }

    /// Look up the answer given for a step.
    pub fn answer(&self, step: &str) -> Option<&AnswerValue> {
        self.answers
            .iter()
            .find(|a| a.step == step)
            .map(|a| &a.value)
    }
}

/// Where a user currently is, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    InFlow {
        flow: FlowKind,
        step: usize,
        step_name: &'static str,
    },
}

impl FlowStatus {
    pub fn of(flow: Option<&FlowState>) -> Self {
        match flow {
            Some(state) => Self::InFlow {
                flow: state.kind,
                step: state.current_step,
                step_name: state.current().map(|s| s.name).unwrap_or("complete"),
            },
            None => Self::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
