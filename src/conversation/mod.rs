//! Conversation system — per-user dialogue flows driven by slash commands.
//!
//! Each user is either idle or inside exactly one flow (profile creation,
//! plan improvement, progress prediction). A flow is a fixed table of steps;
//! every answer is validated before the step advances, and the flow's
//! completion action runs once the last step is answered.

pub mod command;
pub mod engine;
pub mod replies;
pub mod routes;
pub mod state;
pub mod steps;

pub use command::{Command, CommandParser};
pub use engine::{ConversationEngine, EngineConfig, Reply, SideEffect};
pub use routes::{ApiState, api_routes};
pub use state::{AnswerValue, FlowKind, FlowState, FlowStatus};
