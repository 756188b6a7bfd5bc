//! LLM collaborator modules.
//!
//! This module provides the narrative generator and the per-caller
//! conversation memory.

pub mod generator;
pub mod memory;

pub use generator::{Generator, OllamaConfig, OllamaGenerator};
pub use memory::ConversationMemory;
