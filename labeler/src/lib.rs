//! Adaptive incremental labeling engine
//!
//! Mines high-agreement human annotations into in-context examples, asks a
//! generative model to label the remaining items, gates how much gets
//! machine-labeled by capacity and measured accuracy, and routes a sample of
//! predictions back to humans for verification.

pub mod core;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use core::{EngineSnapshot, EngineState, ExampleMiner, PromptContext, PromptExample};
pub use engine::{BatchOutcome, LabelingEngine, MIN_VERIFIED_FOR_ACCURACY_PAUSE, WORKER_STOP_TIMEOUT};
pub use error::{LabelerError, LabelerResult};
pub use scheduler::{CycleReport, WorkerHandle};
pub use traits::{AnnotationStore, Generator, ItemStore, StateStore, UserAnnotations};
