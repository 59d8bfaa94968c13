//! Automated-action pipeline: triggers, persistence, content generation.

pub mod accounts;
pub mod fetcher;
pub mod generator;
pub mod prompts;
pub mod store;
pub mod trigger;
pub mod types;
