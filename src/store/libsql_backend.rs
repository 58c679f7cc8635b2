//! libSQL backend — async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::conversation::state::FlowState;
use crate::error::DatabaseError;
use crate::profile::{ProfileFields, UserProfile};
use crate::store::migrations;
use crate::store::traits::ProfileStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

const PROFILE_COLUMNS: &str =
    "name, age, gender, weight_kg, height_cm, fitness_goal, fitness_level, last_plan";

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let column = |e: libsql::Error| DatabaseError::Query(format!("profile row parse: {e}"));
    let enum_column = |e: String| DatabaseError::Serialization(format!("profile row parse: {e}"));

    let age: i64 = row.get(1).map_err(column)?;
    let gender: String = row.get(2).map_err(column)?;
    let goal: String = row.get(5).map_err(column)?;
    let level: String = row.get(6).map_err(column)?;

    let fields = ProfileFields {
        name: row.get(0).map_err(column)?,
        age: u32::try_from(age).map_err(|e| enum_column(e.to_string()))?,
        gender: gender.parse().map_err(enum_column)?,
        weight_kg: row.get(3).map_err(column)?,
        height_cm: row.get(4).map_err(column)?,
        fitness_goal: goal.parse().map_err(enum_column)?,
        fitness_level: level.parse().map_err(enum_column)?,
    };

    Ok(UserProfile {
        fields,
        last_plan: row.get::<String>(7).ok(),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        fields: &ProfileFields,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO profiles (user_id, name, age, gender, weight_kg, height_cm, fitness_goal, fitness_level, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT (user_id) DO UPDATE SET
                name = ?2, age = ?3, gender = ?4, weight_kg = ?5, height_cm = ?6,
                fitness_goal = ?7, fitness_level = ?8, updated_at = ?9",
            params![
                user_id,
                fields.name.as_str(),
                fields.age as i64,
                fields.gender.as_str(),
                fields.weight_kg,
                fields.height_cm,
                fields.fitness_goal.as_str(),
                fields.fitness_level.as_str(),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(user_id, "Profile upserted");
        Ok(())
    }

    async fn set_plan(&self, user_id: &str, plan: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE profiles SET last_plan = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![plan, now, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_plan: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            });
        }

        debug!(user_id, plan_len = plan.len(), "Plan stored");
        Ok(())
    }

    async fn clear_plan(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE profiles SET last_plan = NULL, updated_at = ?1
                 WHERE user_id = ?2 AND last_plan IS NOT NULL",
                params![now, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_plan: {e}")))?;
        Ok(count > 0)
    }

    // ── Flow state ──────────────────────────────────────────────────

    async fn load_flow_state(&self, user_id: &str) -> Result<Option<FlowState>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT state FROM flow_states WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_flow_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_flow_state: {e}")))?;
                let state = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_flow_state: {e}"))),
        }
    }

    async fn save_flow_state(
        &self,
        user_id: &str,
        state: &FlowState,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let json =
            serde_json::to_string(state).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO flow_states (user_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET state = ?2, updated_at = ?3",
            params![user_id, json, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_flow_state: {e}")))?;

        Ok(())
    }

    async fn delete_flow_state(&self, user_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM flow_states WHERE user_id = ?1",
            params![user_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("delete_flow_state: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::state::{AnswerValue, FlowKind};
    use crate::profile::{FitnessGoal, FitnessLevel, Gender};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn alice() -> ProfileFields {
        ProfileFields {
            name: "Alice".to_string(),
            age: 29,
            gender: Gender::Female,
            weight_kg: 65.5,
            height_cm: 170.0,
            fitness_goal: FitnessGoal::WeightLoss,
            fitness_level: FitnessLevel::Intermediate,
        }
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn missing_profile_is_none() {
        let db = test_db().await;
        assert!(db.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let db = test_db().await;
        db.upsert_profile("u1", &alice()).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.fields, alice());
        assert!(profile.last_plan.is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_fields_but_keeps_plan() {
        let db = test_db().await;
        db.upsert_profile("u1", &alice()).await.unwrap();
        db.set_plan("u1", "Day 1: walk").await.unwrap();

        let mut updated = alice();
        updated.weight_kg = 63.0;
        updated.fitness_goal = FitnessGoal::Endurance;
        db.upsert_profile("u1", &updated).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.fields, updated);
        assert_eq!(profile.last_plan.as_deref(), Some("Day 1: walk"));
    }

    #[tokio::test]
    async fn set_plan_without_profile_is_not_found() {
        let db = test_db().await;
        let err = db.set_plan("ghost", "plan").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { ref id, .. } if id == "ghost"));
    }

    #[tokio::test]
    async fn set_plan_replaces_previous() {
        let db = test_db().await;
        db.upsert_profile("u1", &alice()).await.unwrap();
        db.set_plan("u1", "first").await.unwrap();
        db.set_plan("u1", "second").await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.last_plan.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn clear_plan_reports_whether_removed() {
        let db = test_db().await;
        db.upsert_profile("u1", &alice()).await.unwrap();
        assert!(!db.clear_plan("u1").await.unwrap());

        db.set_plan("u1", "Day 1").await.unwrap();
        assert!(db.clear_plan("u1").await.unwrap());
        assert!(!db.clear_plan("u1").await.unwrap());

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert!(profile.last_plan.is_none());
        assert!(!db.clear_plan("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn profiles_are_isolated_per_user() {
        let db = test_db().await;
        db.upsert_profile("u1", &alice()).await.unwrap();
        db.set_plan("u1", "mine").await.unwrap();

        let mut bob = alice();
        bob.name = "Bob".into();
        db.upsert_profile("u2", &bob).await.unwrap();

        assert_eq!(db.get_profile("u2").await.unwrap().unwrap().fields.name, "Bob");
        assert!(db.get_profile("u2").await.unwrap().unwrap().last_plan.is_none());
        assert_eq!(db.get_profile("u1").await.unwrap().unwrap().fields.name, "Alice");
    }

    // ── Flow state tests ────────────────────────────────────────────

    #[tokio::test]
    async fn flow_state_roundtrip() {
        let db = test_db().await;
        assert!(db.load_flow_state("u1").await.unwrap().is_none());

        let mut state = FlowState::new(FlowKind::ProfileCreation);
        state.record(AnswerValue::Text("Alice".into())).unwrap();
        db.save_flow_state("u1", &state).await.unwrap();

        let loaded = db.load_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        state.record(AnswerValue::Int(29)).unwrap();
        db.save_flow_state("u1", &state).await.unwrap();
        let loaded = db.load_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(loaded.current_step, 2);

        db.delete_flow_state("u1").await.unwrap();
        assert!(db.load_flow_state("u1").await.unwrap().is_none());
        // Deleting again is a no-op
        db.delete_flow_state("u1").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_flow_state_is_a_serialization_error() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO flow_states (user_id, state, updated_at) VALUES ('u1', 'not json', '2026-01-01')",
                (),
            )
            .await
            .unwrap();

        let err = db.load_flow_state("u1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_profile("u1", &alice()).await.unwrap();
            db.set_plan("u1", "Day 1").await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.fields.name, "Alice");
        assert_eq!(profile.last_plan.as_deref(), Some("Day 1"));
    }
}
