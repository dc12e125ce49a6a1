//! Core types, config, errors, and the assistant instructions store for ChatPulse.

pub mod assistant;
pub mod config;
pub mod error;
pub mod types;
