//! Test fixtures for labeler integration tests
//!
//! Default dataset: four human-annotated items (`ex_1`..`ex_4`) of which
//! three reach consensus, plus six unannotated items (`doc_1`..`doc_6`).

use shared::{AnnotationSchema, LabelingConfig};

pub struct TestFixtures;

impl TestFixtures {
    pub const SCHEMA: &'static str = "sentiment";
    pub const MODEL: &'static str = "mock-model";

    pub fn sentiment_schema() -> AnnotationSchema {
        let mut schema = AnnotationSchema::single(Self::SCHEMA, &["positive", "negative", "neutral"]);
        schema.description = "Overall tone of the review".to_string();
        schema
    }

    /// Enabled config with sampling off and no ratio cap
    pub fn config() -> LabelingConfig {
        let mut config = LabelingConfig::default();
        config.enabled = true;
        config.schemas = vec![Self::sentiment_schema()];
        config.llm_labeling.trigger_threshold = 2;
        config.llm_labeling.confidence_threshold = 0.7;
        config.label_limits.max_unlabeled_ratio = 1.0;
        config.verification.sample_rate = 0.0;
        config
    }

    pub fn text_for(instance_id: &str) -> String {
        format!("text of {instance_id}")
    }

    /// Items in dataset order: annotated examples first, then unannotated docs
    pub fn items() -> Vec<(String, String)> {
        Self::example_ids()
            .into_iter()
            .chain(Self::doc_ids(6))
            .map(|id| {
                let text = Self::text_for(&id);
                (id, text)
            })
            .collect()
    }

    pub fn example_ids() -> Vec<String> {
        (1..=4).map(|i| format!("ex_{i}")).collect()
    }

    pub fn doc_ids(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("doc_{i}")).collect()
    }

    /// (user, instance, schema, label) votes
    ///
    /// `ex_1` positive 3/3, `ex_2` negative 2/2, `ex_3` neutral 2/2,
    /// `ex_4` split 1/1 and therefore not an example.
    pub fn annotations() -> Vec<(String, String, String, String)> {
        [
            ("alice", "ex_1", "positive"),
            ("bob", "ex_1", "positive"),
            ("carol", "ex_1", "positive"),
            ("alice", "ex_2", "negative"),
            ("bob", "ex_2", "negative"),
            ("alice", "ex_3", "neutral"),
            ("carol", "ex_3", "neutral"),
            ("alice", "ex_4", "positive"),
            ("bob", "ex_4", "negative"),
        ]
        .into_iter()
        .map(|(user, instance, label)| {
            (
                user.to_string(),
                instance.to_string(),
                Self::SCHEMA.to_string(),
                label.to_string(),
            )
        })
        .collect()
    }

    /// A well-formed model reply
    pub fn reply(label: &str, confidence: f64) -> String {
        serde_json::json!({
            "label": label,
            "confidence": confidence,
            "reasoning": "matches the examples",
        })
        .to_string()
    }
}
