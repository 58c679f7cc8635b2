//! `ProfileStore` trait — single async interface for all persistence.

use async_trait::async_trait;

use crate::conversation::state::FlowState;
use crate::error::DatabaseError;
use crate::profile::{ProfileFields, UserProfile};

/// Backend-agnostic store for user profiles and in-progress dialogue state.
///
/// Per-key operations are atomic; the engine relies on that and never takes
/// a cross-user lock around store calls.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Fetch a user's profile, if one was ever saved.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Merge the given fields into the user's record, creating it if absent.
    /// An existing `last_plan` is preserved.
    async fn upsert_profile(
        &self,
        user_id: &str,
        fields: &ProfileFields,
    ) -> Result<(), DatabaseError>;

    /// Store a generated plan. Fails with `DatabaseError::NotFound` when the
    /// user has no profile.
    async fn set_plan(&self, user_id: &str, plan: &str) -> Result<(), DatabaseError>;

    /// Remove the stored plan. Returns `false` if there was none.
    async fn clear_plan(&self, user_id: &str) -> Result<bool, DatabaseError>;

    // ── Flow state ──────────────────────────────────────────────────

    /// Load the persisted in-progress flow for a user.
    async fn load_flow_state(&self, user_id: &str) -> Result<Option<FlowState>, DatabaseError>;

    /// Persist the user's in-progress flow, replacing any previous one.
    async fn save_flow_state(&self, user_id: &str, state: &FlowState)
    -> Result<(), DatabaseError>;

    /// Drop the user's persisted flow. No-op if there is none.
    async fn delete_flow_state(&self, user_id: &str) -> Result<(), DatabaseError>;
}
