//! Service implementations
//!
//! Concrete collaborators for the engine: the JSON snapshot store, in-memory
//! annotation and item stores, and a random generator for offline runs.

pub mod file_system;
pub mod memory_store;
pub mod random_generator;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use file_system::RealStateStore;
pub use memory_store::{InMemoryAnnotationStore, InMemoryItemStore};
pub use random_generator::RandomGenerator;
