//! Random generator for offline runs and tests
//!
//! Answers every prompt with a declared label and a random confidence,
//! formatted the way a real model is asked to reply. Most of the time the
//! label is borrowed from one of the prompt's examples so predictions look
//! plausible.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::prompt::PromptContext;
use crate::error::{LabelerError, LabelerResult};
use crate::traits::Generator;

pub const RANDOM_MODEL_NAME: &str = "random";

pub struct RandomGenerator {
    rng: Mutex<StdRng>,
    /// Probability of copying an example's label instead of a uniform pick
    example_bias: f64,
    min_confidence: f64,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            example_bias: 0.8,
            min_confidence: 0.3,
        }
    }

    /// Confidence is drawn uniformly from `[min_confidence, 1.0]`
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    fn pick(&self, context: &PromptContext) -> Option<(Vec<String>, f64)> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let primary = match context.examples.choose(&mut *rng) {
            Some(example) if rng.gen_bool(self.example_bias) => example.label.clone(),
            _ => context.labels.choose(&mut *rng)?.clone(),
        };

        let mut labels = vec![primary];
        if context.multi_select && rng.gen_bool(0.3) {
            if let Some(extra) = context.labels.choose(&mut *rng) {
                if !labels.contains(extra) {
                    labels.push(extra.clone());
                }
            }
        }

        let confidence = rng.gen_range(self.min_confidence..=1.0);
        Some((labels, confidence))
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for RandomGenerator {
    async fn generate(&self, context: &PromptContext) -> LabelerResult<String> {
        let (labels, confidence) = self.pick(context).ok_or_else(|| LabelerError::GenerationFailed {
            key: shared::PredictionKey::new("", context.schema_name.as_str()),
            message: "schema declares no labels".to_string(),
        })?;

        let label = if context.multi_select {
            serde_json::json!(labels)
        } else {
            serde_json::json!(labels[0])
        };

        let reply = serde_json::json!({
            "label": label,
            "confidence": (confidence * 100.0).round() / 100.0,
            "reasoning": format!("picked at random from {} examples", context.examples.len()),
        });
        Ok(reply.to_string())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> Option<String> {
        Some(RANDOM_MODEL_NAME.to_string())
    }
}
