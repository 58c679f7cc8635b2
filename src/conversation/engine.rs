//! ConversationEngine — routes each inbound message through the user's flow,
//! runs completion side effects, and turns every error into a reply.
//!
//! Each user owns a slot guarded by its own mutex. The outer map lock is only
//! held to find or insert a slot, so a slow plan or prediction call blocks the
//! user who triggered it and nobody else.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{FlowError, LlmError, PredictionError};
use crate::planner::{PlanGenerator, PlanRequest};
use crate::predictor::{PredictionRequest, ProgressEstimate, ProgressPredictor, TrainingHabits};
use crate::profile::{ProfileFields, UserProfile};
use crate::store::ProfileStore;

use super::command::{Command, CommandParser};
use super::replies;
use super::state::{FlowKind, FlowState, FlowStatus};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single plan generator or predictor call.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// A state change that happened while handling a message.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    ProfileSaved,
    PlanStored,
    PlanCleared,
    Prediction(ProgressEstimate),
}

/// The outcome of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub effects: Vec<SideEffect>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            effects: Vec::new(),
        }
    }

    fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Default)]
struct UserSlot {
    flow: Option<FlowState>,
    /// Whether the persisted flow (if any) has been loaded.
    hydrated: bool,
}

pub struct ConversationEngine {
    store: Arc<dyn ProfileStore>,
    planner: Arc<dyn PlanGenerator>,
    predictor: Option<Arc<dyn ProgressPredictor>>,
    config: EngineConfig,
    users: Mutex<HashMap<String, Arc<Mutex<UserSlot>>>>,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        planner: Arc<dyn PlanGenerator>,
        predictor: Option<Arc<dyn ProgressPredictor>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            planner,
            predictor,
            config,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound message. Never fails: errors become replies.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> Reply {
        let command = CommandParser::parse(text);
        let mut slot = self.lock_user(user_id).await;
        let result = self.dispatch(user_id, &mut slot, command).await;
        drop(slot);
        result.unwrap_or_else(|e| error_reply(user_id, e))
    }

    /// Enter a flow and return its first prompt.
    pub async fn start_flow(&self, user_id: &str, kind: FlowKind) -> Result<String, FlowError> {
        let mut slot = self.lock_user(user_id).await;
        self.start_locked(user_id, &mut slot, kind).await
    }

    /// Drop any active flow. Idempotent.
    pub async fn cancel_flow(&self, user_id: &str) -> String {
        let mut slot = self.lock_user(user_id).await;
        self.cancel_locked(user_id, &mut slot).await
    }

    /// Generate a first plan for a user with a profile and no plan.
    pub async fn generate_plan(&self, user_id: &str) -> Result<Reply, FlowError> {
        let slot = self.lock_user(user_id).await;
        ensure_idle(&slot)?;
        self.generate_plan_locked(user_id).await
    }

    pub async fn delete_plan(&self, user_id: &str) -> Result<Reply, FlowError> {
        let slot = self.lock_user(user_id).await;
        ensure_idle(&slot)?;
        self.delete_plan_locked(user_id).await
    }

    /// Render the stored profile.
    pub async fn show_profile(&self, user_id: &str) -> Result<String, FlowError> {
        let profile = self.require_profile(user_id).await?;
        Ok(replies::profile(&profile.to_display_lines()))
    }

    /// The stored profile, if any.
    pub async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, FlowError> {
        Ok(self.store.get_profile(user_id).await?)
    }

    /// Where the user currently is.
    pub async fn flow_status(&self, user_id: &str) -> FlowStatus {
        let slot = self.lock_user(user_id).await;
        FlowStatus::of(slot.flow.as_ref())
    }

    /// Release slots of users with no active flow and no in-flight message.
    /// Returns how many were dropped.
    pub async fn prune_idle(&self) -> usize {
        let mut users = self.users.lock().await;
        let before = users.len();
        users.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.flow.is_some(),
                Err(_) => true,
            }
        });
        let pruned = before - users.len();
        if pruned > 0 {
            debug!(pruned, remaining = users.len(), "Pruned idle conversation slots");
        }
        pruned
    }

    // ── Dispatch ────────────────────────────────────────────────────

    async fn dispatch(
        &self,
        user_id: &str,
        slot: &mut UserSlot,
        command: Command,
    ) -> Result<Reply, FlowError> {
        if !matches!(command, Command::Text(_) | Command::Unknown(_)) && !command.allowed_in_flow() {
            ensure_idle(slot)?;
        }

        match command {
            Command::Text(text) => self.answer(user_id, slot, &text).await,
            Command::Cancel => Ok(Reply::text(self.cancel_locked(user_id, slot).await)),
            Command::StartProfile => self
                .start_locked(user_id, slot, FlowKind::ProfileCreation)
                .await
                .map(Reply::text),
            Command::ImprovePlan => self
                .start_locked(user_id, slot, FlowKind::PlanImprovement)
                .await
                .map(Reply::text),
            Command::StartPrediction => self
                .start_locked(user_id, slot, FlowKind::ProgressPrediction)
                .await
                .map(Reply::text),
            Command::ShowProfile => self.show_profile(user_id).await.map(Reply::text),
            Command::GeneratePlan => self.generate_plan_locked(user_id).await,
            Command::DeletePlan => self.delete_plan_locked(user_id).await,
            Command::Help => Ok(Reply::text(replies::HELP)),
            Command::Unknown(name) => {
                debug!(user_id, command = %name, "Unknown command");
                Ok(Reply::text(replies::UNKNOWN_COMMAND))
            }
        }
    }

    async fn start_locked(
        &self,
        user_id: &str,
        slot: &mut UserSlot,
        kind: FlowKind,
    ) -> Result<String, FlowError> {
        ensure_idle(slot)?;

        match kind {
            FlowKind::ProfileCreation => {}
            FlowKind::PlanImprovement => {
                let profile = self.require_profile(user_id).await?;
                if !profile.has_plan() {
                    return Err(FlowError::Precondition(replies::NO_PLAN_TO_IMPROVE.into()));
                }
            }
            FlowKind::ProgressPrediction => {
                if self.predictor.is_none() {
                    return Err(FlowError::Precondition(
                        replies::PREDICTION_UNAVAILABLE.into(),
                    ));
                }
                self.require_profile(user_id).await?;
            }
        }

        let state = FlowState::new(kind);
        let prompt = state
            .current()
            .map(|step| step.prompt)
            .ok_or_else(|| FlowError::Internal(format!("flow {kind} has no steps")))?;

        self.persist_flow(user_id, &state).await;
        slot.flow = Some(state);
        info!(user_id, flow = %kind, "Flow started");
        Ok(prompt.to_string())
    }

    async fn cancel_locked(&self, user_id: &str, slot: &mut UserSlot) -> String {
        match slot.flow.take() {
            Some(state) => {
                self.forget_flow(user_id).await;
                info!(user_id, flow = %state.kind, step = state.current_step, "Flow cancelled");
                replies::cancelled(state.kind).to_string()
            }
            None => replies::NOTHING_TO_CANCEL.to_string(),
        }
    }

    /// Feed free text to the active flow's current step.
    async fn answer(
        &self,
        user_id: &str,
        slot: &mut UserSlot,
        text: &str,
    ) -> Result<Reply, FlowError> {
        let Some(flow) = slot.flow.as_mut() else {
            return Ok(Reply::text(replies::UNRECOGNIZED));
        };

        let step = flow.current().ok_or_else(|| {
            FlowError::Internal(format!("flow {} has no pending step", flow.kind))
        })?;
        let value = step.validate(text).ok_or(FlowError::Validation {
            step: step.name,
            reprompt: step.reprompt,
        })?;
        flow.record(value).map_err(FlowError::Internal)?;
        debug!(user_id, flow = %flow.kind, step = step.name, "Answer accepted");

        if let Some(next) = flow.current() {
            self.persist_flow(user_id, flow).await;
            return Ok(Reply::text(next.prompt));
        }

        // Last step answered: the flow ends here whatever the outcome.
        let Some(finished) = slot.flow.take() else {
            return Err(FlowError::Internal("flow vanished while completing".into()));
        };
        self.forget_flow(user_id).await;
        info!(user_id, flow = %finished.kind, "Flow complete");
        self.complete(user_id, &finished).await
    }

    async fn complete(&self, user_id: &str, finished: &FlowState) -> Result<Reply, FlowError> {
        match finished.kind {
            FlowKind::ProfileCreation => {
                let fields = profile_fields(finished)?;
                self.store.upsert_profile(user_id, &fields).await?;
                info!(user_id, "Profile saved");
                Ok(Reply::text(replies::PROFILE_SAVED).with_effect(SideEffect::ProfileSaved))
            }
            FlowKind::PlanImprovement => {
                let request = text_answer(finished, "improvement_request")?;
                let profile = self.require_profile(user_id).await?;
                let current_plan = profile.last_plan.as_deref().ok_or_else(|| {
                    FlowError::Precondition(replies::NO_PLAN_TO_IMPROVE.into())
                })?;

                let plan = self
                    .call_planner(PlanRequest::Improve {
                        profile: &profile.fields,
                        current_plan,
                        request: &request,
                    })
                    .await?;
                self.store.set_plan(user_id, &plan).await?;
                info!(user_id, "Plan improved");
                Ok(Reply::text(replies::improved_plan(&plan)).with_effect(SideEffect::PlanStored))
            }
            FlowKind::ProgressPrediction => {
                let predictor = self.predictor.clone().ok_or_else(|| {
                    FlowError::Precondition(replies::PREDICTION_UNAVAILABLE.into())
                })?;
                let profile = self.require_profile(user_id).await?;
                let request = PredictionRequest::new(&profile.fields, training_habits(finished)?);
                request.validate()?;
                let features = request.to_features();

                let timeout = self.config.call_timeout;
                let estimate =
                    match tokio::time::timeout(timeout, predictor.predict(&features)).await {
                        Ok(result) => result?.rounded(),
                        Err(_) => return Err(PredictionError::Timeout(timeout).into()),
                    };

                info!(
                    user_id,
                    weeks_to_goal = estimate.weeks_to_goal,
                    kg_change = estimate.kg_change,
                    "Progress predicted"
                );
                Ok(Reply::text(replies::prediction(&estimate))
                    .with_effect(SideEffect::Prediction(estimate)))
            }
        }
    }

    async fn generate_plan_locked(&self, user_id: &str) -> Result<Reply, FlowError> {
        let profile = self.require_profile(user_id).await?;
        if profile.has_plan() {
            return Err(FlowError::Precondition(replies::PLAN_EXISTS.into()));
        }

        let plan = self
            .call_planner(PlanRequest::New {
                profile: &profile.fields,
            })
            .await?;
        self.store.set_plan(user_id, &plan).await?;
        info!(user_id, "Plan generated");
        Ok(Reply::text(replies::plan(&plan)).with_effect(SideEffect::PlanStored))
    }

    async fn delete_plan_locked(&self, user_id: &str) -> Result<Reply, FlowError> {
        self.require_profile(user_id).await?;
        if self.store.clear_plan(user_id).await? {
            info!(user_id, "Plan deleted");
            Ok(Reply::text(replies::PLAN_DELETED).with_effect(SideEffect::PlanCleared))
        } else {
            Ok(Reply::text(replies::NO_PLAN_TO_DELETE))
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn require_profile(&self, user_id: &str) -> Result<UserProfile, FlowError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| FlowError::Precondition(replies::NO_PROFILE.into()))
    }

    async fn call_planner(&self, request: PlanRequest<'_>) -> Result<String, FlowError> {
        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, self.planner.generate(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LlmError::Timeout {
                provider: "plan generator".to_string(),
                timeout,
            }
            .into()),
        }
    }

    /// Lock the user's slot, loading any persisted flow on first use.
    async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<UserSlot> {
        let slot = {
            let mut users = self.users.lock().await;
            Arc::clone(users.entry(user_id.to_string()).or_default())
        };

        let mut guard = slot.lock_owned().await;
        if !guard.hydrated {
            guard.hydrated = true;
            match self.store.load_flow_state(user_id).await {
                Ok(Some(state)) if state.is_complete() => {
                    warn!(user_id, flow = %state.kind, "Discarding persisted flow with no pending step");
                    self.forget_flow(user_id).await;
                }
                Ok(Some(state)) => {
                    debug!(user_id, flow = %state.kind, step = state.current_step, "Resumed persisted flow");
                    guard.flow = Some(state);
                }
                Ok(None) => {}
                Err(e) => warn!(user_id, error = %e, "Failed to load persisted flow state"),
            }
        }
        guard
    }

    async fn persist_flow(&self, user_id: &str, state: &FlowState) {
        if let Err(e) = self.store.save_flow_state(user_id, state).await {
            warn!(user_id, error = %e, "Failed to persist flow state");
        }
    }

    async fn forget_flow(&self, user_id: &str) {
        if let Err(e) = self.store.delete_flow_state(user_id).await {
            warn!(user_id, error = %e, "Failed to delete persisted flow state");
        }
    }
}

fn ensure_idle(slot: &UserSlot) -> Result<(), FlowError> {
    match &slot.flow {
        Some(active) => Err(FlowError::Conflict {
            active: active.kind.label().to_string(),
        }),
        None => Ok(()),
    }
}

fn error_reply(user_id: &str, err: FlowError) -> Reply {
    match &err {
        FlowError::Validation { step, .. } => debug!(user_id, step, "Invalid answer"),
        FlowError::Conflict { .. } | FlowError::Precondition(_) | FlowError::NotFound { .. } => {
            debug!(user_id, error = %err, "Request rejected")
        }
        FlowError::Generation(_) | FlowError::Prediction(_) => {
            warn!(user_id, error = %err, "Collaborator call failed")
        }
        FlowError::Internal(_) => error!(user_id, error = %err, "Failed to handle message"),
    }
    Reply::text(replies::for_error(&err))
}

// ── Answer extraction ───────────────────────────────────────────────

fn missing(state: &FlowState, step: &str) -> FlowError {
    FlowError::Internal(format!("flow {} finished without a valid {step} answer", state.kind))
}

fn text_answer(state: &FlowState, step: &str) -> Result<String, FlowError> {
    state
        .answer(step)
        .and_then(|v| v.as_text())
        .map(str::to_string)
        .ok_or_else(|| missing(state, step))
}

fn int_answer(state: &FlowState, step: &str) -> Result<u32, FlowError> {
    state
        .answer(step)
        .and_then(|v| v.as_int())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| missing(state, step))
}

fn real_answer(state: &FlowState, step: &str) -> Result<f64, FlowError> {
    state
        .answer(step)
        .and_then(|v| v.as_real())
        .ok_or_else(|| missing(state, step))
}

fn bool_answer(state: &FlowState, step: &str) -> Result<bool, FlowError> {
    state
        .answer(step)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| missing(state, step))
}

fn choice_answer<T: FromStr<Err = String>>(state: &FlowState, step: &str) -> Result<T, FlowError> {
    text_answer(state, step)?.parse().map_err(FlowError::Internal)
}

fn profile_fields(state: &FlowState) -> Result<ProfileFields, FlowError> {
    Ok(ProfileFields {
        name: text_answer(state, "name")?,
        age: int_answer(state, "age")?,
        gender: choice_answer(state, "gender")?,
        weight_kg: real_answer(state, "weight")?,
        height_cm: real_answer(state, "height")?,
        fitness_goal: choice_answer(state, "fitness_goal")?,
        fitness_level: choice_answer(state, "fitness_level")?,
    })
}

fn training_habits(state: &FlowState) -> Result<TrainingHabits, FlowError> {
    Ok(TrainingHabits {
        sessions_per_week: int_answer(state, "sessions_per_week")?,
        session_duration_minutes: int_answer(state, "session_duration_minutes")?,
        sleep_hours: real_answer(state, "sleep_hours")?,
        diet_followed: bool_answer(state, "diet_followed")?,
        restrictions_or_breaks: bool_answer(state, "restrictions_or_breaks")?,
        consistency_percent: real_answer(state, "consistency_percent")?,
    })
}
