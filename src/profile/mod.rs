//! User profile — the persisted fitness attributes of one user.

pub mod model;

pub use model::{FitnessGoal, FitnessLevel, Gender, ProfileFields, UserProfile};
