//! Core assistant components
//!
//! This module contains the turn orchestration and the stores it drives.

mod chat;
mod facts;
mod gateway;
mod history;
mod memory;
mod profile;
mod recall;

pub use chat::{ChatEngine, EngineSettings};
pub use gateway::ModelGateway;
pub use history::Summarizer;
pub use memory::{MemoryCategory, MemorySettings, MemoryStore, SemanticMemory};
pub use profile::{Profile, ProfileStore};

#[cfg(test)]
pub use history::HistoryStore;
#[cfg(test)]
pub use memory::{MemoryCapabilities, MemoryError};
