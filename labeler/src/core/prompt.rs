//! Prompt context assembly
//!
//! Builds the logical request handed to the generator. Turning it into model
//! text is the generator's job.

use serde::{Deserialize, Serialize};
use shared::{AnnotationSchema, HighConfidenceExample};

/// One demonstration pair shown to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    pub instance_id: String,
    pub text: String,
    pub label: String,
}

/// Everything a generator needs to label one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub schema_name: String,
    pub description: String,
    pub labels: Vec<String>,
    pub multi_select: bool,
    pub examples: Vec<PromptExample>,
    pub target_text: String,
}

impl PromptContext {
    /// Build a context from the schema's current examples, keeping their ranking order
    pub fn build(
        schema: &AnnotationSchema,
        examples: &[HighConfidenceExample],
        target_text: &str,
        limit: Option<usize>,
    ) -> Self {
        let take = limit.unwrap_or(examples.len());

        Self {
            schema_name: schema.name.clone(),
            description: schema.description.clone(),
            labels: schema.labels.clone(),
            multi_select: schema.is_multi(),
            examples: examples
                .iter()
                .take(take)
                .map(|e| PromptExample {
                    instance_id: e.instance_id.clone(),
                    text: e.text.clone(),
                    label: e.label.clone(),
                })
                .collect(),
            target_text: target_text.to_string(),
        }
    }

    /// Ids of the examples used, in prompt order
    pub fn example_instance_ids(&self) -> Vec<String> {
        self.examples.iter().map(|e| e.instance_id.clone()).collect()
    }
}
