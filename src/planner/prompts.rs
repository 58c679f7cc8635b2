//! Prompt text for plan generation.

use crate::profile::ProfileFields;

pub const SYSTEM_PROMPT: &str = "You are a fitness expert.";

const PLAN_INSTRUCTIONS: &str = "\
Generate a personalized workout plan based on the user's profile, fitness goal, and fitness level. \
Cover the next 7 days only and output only the plan, nothing else. \
Do not exceed 200 words.";

const IMPROVE_INSTRUCTIONS: &str = "\
Revise the current plan to address the user's request while keeping it suited to their profile, \
fitness goal, and fitness level. \
Cover the next 7 days only and output only the revised plan, nothing else. \
Do not exceed 200 words.";

fn profile_json(profile: &ProfileFields) -> String {
    // ProfileFields has only plain fields and derived Serialize; this cannot fail.
    serde_json::to_string(profile).unwrap_or_default()
}

/// User prompt for a fresh plan.
pub fn plan_prompt(profile: &ProfileFields) -> String {
    format!(
        "User Profile: {}\n\n{PLAN_INSTRUCTIONS}",
        profile_json(profile)
    )
}

/// User prompt for revising an existing plan.
pub fn improvement_prompt(profile: &ProfileFields, current_plan: &str, request: &str) -> String {
    format!(
        "User Profile: {}\n\nCurrent Plan:\n{current_plan}\n\nRequested Changes: {request}\n\n{IMPROVE_INSTRUCTIONS}",
        profile_json(profile)
    )
}
