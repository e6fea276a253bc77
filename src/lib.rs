//! Confluence Engine Library
//!
//! Market structure, Fibonacci and smart-money zones scored into a single
//! confluence grade, with a stateful risk manager gating and sizing trades.

pub mod cli;
pub mod config;
pub mod confluence;
pub mod data;
pub mod error;
pub mod fibonacci;
pub mod market;
pub mod orchestrator;
pub mod patterns;
pub mod risk;
pub mod smart_money;
pub mod structure;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
