//! Dialogue Agent
//!
//! A small conversational agent toolkit:
//! - Stage-driven dialogue flows (Q&A assistant, delivery orders)
//! - Memoized text generation over a shared key-value store
//! - Fixed-window rate limiting per session and per user
//! - Dividend-yield ranking over market data with rendered reports
//!
//! TURN:
//! INPUT → RATE LIMIT → STAGE HANDLER → (MEMOIZED GENERATION) → RESPONSE

pub mod agent;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod finance;
pub mod llm;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AgentError, Result};

// Re-export common types
pub use models::*;
