//! FitCraft: AI fitness coach backend.

pub mod billing;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod onboarding;
pub mod store;
pub mod workouts;
