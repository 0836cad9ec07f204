//! fitness-gate - composite fitness scoring and compliance gate
//!
//! Discovers metric producer modules in a workspace, collects lint, test,
//! placeholder and session signals through a fallback chain, folds them into
//! one weighted score and enforces a threshold. Every run leaves a versioned
//! snapshot, a changelog line and Q&A-formatted error records behind.

pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod discovery;
pub mod errors;
pub mod external_tool;
pub mod gate;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod scoring;
pub mod signals;
pub mod state;
