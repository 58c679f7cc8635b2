//! Plan generator — turns a profile into a seven-day workout plan via an LLM.

pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::profile::ProfileFields;

/// What to generate.
#[derive(Debug, Clone, Copy)]
pub enum PlanRequest<'a> {
    /// A fresh plan for the profile.
    New { profile: &'a ProfileFields },
    /// A revision of `current_plan` following the user's `request`.
    Improve {
        profile: &'a ProfileFields,
        current_plan: &'a str,
        request: &'a str,
    },
}

/// Anything that can produce plan text.
///
/// The conversation engine only sees this trait, so tests substitute a stub.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, request: PlanRequest<'_>) -> Result<String, LlmError>;
}

/// Configuration for plan generation.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// LLM temperature.
    pub temperature: f32,
    /// Max tokens for the LLM response.
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 600,
        }
    }
}

/// Generates plans with a single chat completion per request.
pub struct LlmPlanGenerator {
    llm: Arc<dyn LlmProvider>,
    config: PlannerConfig,
}

impl LlmPlanGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl PlanGenerator for LlmPlanGenerator {
    async fn generate(&self, request: PlanRequest<'_>) -> Result<String, LlmError> {
        let user_prompt = match request {
            PlanRequest::New { profile } => prompts::plan_prompt(profile),
            PlanRequest::Improve {
                profile,
                current_plan,
                request,
            } => prompts::improvement_prompt(profile, current_plan, request),
        };

        debug!(model = self.llm.model_name(), "Requesting plan");

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(completion).await?;
        let plan = response.content.trim().to_string();

        if plan.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty plan".to_string(),
            });
        }

        info!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Plan generated"
        );
        Ok(plan)
    }
}
