//! Collaborator trait definitions with mockall annotations for testing
//!
//! The engine never talks to annotation storage, item storage, a model or
//! the file system directly. Each of those sits behind one of these traits
//! and is injected at construction, so tests can swap in mocks or in-memory
//! fakes.

use std::collections::HashMap;

use crate::core::prompt::PromptContext;
use crate::core::state::EngineSnapshot;
use crate::error::LabelerResult;

/// Labels a single user assigned: instance id -> schema name -> label value
pub type UserAnnotations = HashMap<String, HashMap<String, String>>;

/// Source of human annotations
#[mockall::automock]
#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    /// All users that have annotated anything
    async fn list_users(&self) -> LabelerResult<Vec<String>>;

    /// Every label the user has assigned
    async fn get_user_annotations(&self, user_id: &str) -> LabelerResult<UserAnnotations>;
}

/// Source of item text and the dataset's canonical ordering
#[mockall::automock]
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Text of one item, `None` when the item is unknown
    async fn get_text(&self, instance_id: &str) -> LabelerResult<Option<String>>;

    /// All instance ids in canonical dataset order
    async fn list_instance_ids(&self) -> LabelerResult<Vec<String>>;
}

/// Generative model client
///
/// The wire format and prompt wording belong to the implementation; the
/// engine only hands over a [`PromptContext`] and expects the raw reply text,
/// which should carry a JSON object with `label`, `confidence` and
/// `reasoning` keys.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Request a label for the context's target text
    ///
    /// No timeout is applied by the engine; implementations own that.
    async fn generate(&self, context: &PromptContext) -> LabelerResult<String>;

    /// Whether the client is configured and reachable
    fn is_available(&self) -> bool;

    /// Model identifier recorded on predictions
    fn model_name(&self) -> Option<String>;
}

/// Durable storage for engine snapshots
#[mockall::automock]
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the stored snapshot; readers must never observe a partial write
    async fn save(&self, snapshot: &EngineSnapshot) -> LabelerResult<()>;

    /// Read the stored snapshot, `None` when nothing was saved yet
    async fn load(&self) -> LabelerResult<Option<EngineSnapshot>>;

    /// Human-readable location for log lines
    fn location(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_trait_instantiation() {
        let mut generator = MockGenerator::new();
        generator.expect_is_available().return_const(true);
        generator
            .expect_generate()
            .returning(|_| Ok(r#"{"label": "happy", "confidence": 0.9}"#.to_string()));

        let context = PromptContext {
            schema_name: "sentiment".to_string(),
            description: String::new(),
            labels: vec!["happy".to_string()],
            multi_select: false,
            examples: Vec::new(),
            target_text: "great day".to_string(),
        };

        assert!(generator.is_available());
        assert!(generator.generate(&context).await.unwrap().contains("happy"));

        let _annotations = MockAnnotationStore::new();
        let _items = MockItemStore::new();
        let _state_store = MockStateStore::new();
    }
}
