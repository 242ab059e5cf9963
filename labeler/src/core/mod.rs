//! Core business logic modules
//!
//! This module contains pure labeling logic with no I/O dependencies.
//! All collaborator access goes through the engine.

pub mod accuracy;
pub mod claims;
pub mod interpreter;
pub mod miner;
pub mod prompt;
pub mod state;
pub mod verification;

pub use accuracy::accuracy_metrics;
pub use claims::{Claim, ClaimSet};
pub use interpreter::{interpret, Interpretation};
pub use miner::ExampleMiner;
pub use prompt::{PromptContext, PromptExample};
pub use state::{EngineSnapshot, EngineState};
pub use verification::select_for_review;
