//! Fixed reply texts and the error-to-reply mapping.

use crate::error::FlowError;
use crate::predictor::ProgressEstimate;

use super::state::FlowKind;

pub const UNRECOGNIZED: &str =
    "I didn't understand that. Send /help to see what I can do.";

pub const UNKNOWN_COMMAND: &str = "Unknown command. Send /help to see the available commands.";

pub const PROFILE_SAVED: &str = "Profile saved! Use /plan to get a personalized fitness plan.";

pub const NO_PROFILE: &str = "No profile found. Use /start to create one.";

pub const PLAN_EXISTS: &str = "You already have a fitness plan. \
Use /improve to adjust it or /deleteplan to remove it and generate a new one.";

pub const NO_PLAN_TO_IMPROVE: &str = "You don't have a plan yet. Use /plan to generate one first.";

pub const NO_PLAN_TO_DELETE: &str = "You don't have a saved plan.";

pub const PLAN_DELETED: &str = "Your plan has been deleted. Use /plan to generate a new one.";

pub const PREDICTION_UNAVAILABLE: &str = "Progress prediction is not available right now.";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

pub const HELP: &str = "\
Available commands:
/start - create or update your profile
/profile - show your profile
/plan - generate a 7-day fitness plan
/improve - adjust your current plan
/deleteplan - delete your current plan
/predict - estimate your progress
/cancel - cancel the current dialogue
/help - show this message";

pub fn plan(text: &str) -> String {
    format!("Your Fitness Plan:\n{text}")
}

pub fn improved_plan(text: &str) -> String {
    format!("Your updated Fitness Plan:\n{text}")
}

pub fn profile(lines: &str) -> String {
    format!("Your Profile:\n{lines}")
}

pub fn prediction(estimate: &ProgressEstimate) -> String {
    format!(
        "Estimated time to reach your goal: {:.1} weeks\nExpected weight change: {:.1} kg",
        estimate.weeks_to_goal, estimate.kg_change
    )
}

pub fn cancelled(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::ProfileCreation => "Profile was not saved. Use /start to begin again.",
        FlowKind::PlanImprovement => "Plan improvement cancelled. Your plan was not changed.",
        FlowKind::ProgressPrediction => "Progress prediction cancelled.",
    }
}

/// The single user-facing text for each error.
pub fn for_error(err: &FlowError) -> String {
    match err {
        FlowError::Validation { reprompt, .. } => (*reprompt).to_string(),
        FlowError::Conflict { active } => format!(
            "You are in the middle of {active}. Finish it or send /cancel first."
        ),
        FlowError::Precondition(message) => message.clone(),
        FlowError::NotFound { .. } => NO_PROFILE.to_string(),
        FlowError::Generation(reason) => {
            format!("Sorry, I couldn't generate a plan: {reason}")
        }
        FlowError::Prediction(reason) => {
            format!("Sorry, I couldn't estimate your progress: {reason}")
        }
        FlowError::Internal(_) => GENERIC_FAILURE.to_string(),
    }
}
