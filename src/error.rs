//! Error types for the fitness bot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No channel registered under name {name}")]
    UnknownChannel { name: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Progress model errors.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    #[error("Invalid prediction input: {0}")]
    InvalidInput(String),

    #[error("Value {value:?} for feature {feature} is outside the trained vocabulary")]
    UnknownCategory { feature: String, value: String },

    #[error("Progress model is invalid: {0}")]
    InvalidModel(String),

    #[error("Prediction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to load progress model: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse progress model: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the conversation engine.
///
/// Every variant is recoverable: the inbound-message boundary turns each one
/// into a reply and the user's loop keeps running.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Bad step input. The step re-prompts and the flow state is untouched.
    #[error("Invalid answer for step {step}")]
    Validation { step: &'static str, reprompt: &'static str },

    /// A flow is already active for this user.
    #[error("Flow {active} is already active")]
    Conflict { active: String },

    /// Required prior state is missing.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Store operation on an absent profile.
    #[error("No profile found for user {user_id}")]
    NotFound { user_id: String },

    /// Plan generator failed upstream.
    #[error("Plan generation failed: {0}")]
    Generation(String),

    /// Progress predictor failed.
    #[error("Progress prediction failed: {0}")]
    Prediction(String),

    /// Anything else; reported with the generic failure reply.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DatabaseError> for FlowError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { id, .. } => Self::NotFound { user_id: id },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for FlowError {
    fn from(e: LlmError) -> Self {
        Self::Generation(e.to_string())
    }
}

impl From<PredictionError> for FlowError {
    fn from(e: PredictionError) -> Self {
        Self::Prediction(e.to_string())
    }
}
