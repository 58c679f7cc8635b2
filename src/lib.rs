//! Fitness Bot — conversational fitness assistant.

pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod planner;
pub mod predictor;
pub mod profile;
pub mod store;
