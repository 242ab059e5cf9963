//! Typed configuration for the labeling engine
//!
//! Every tunable lives here once, with its default. Sections mirror the
//! nested layout of the JSON configuration file; any missing section or
//! field falls back to the defaults below.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SharedError, SharedResult};
use crate::types::{AnnotationSchema, VerificationStrategy};

/// Root configuration for incremental labeling
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LabelingConfig {
    /// Background worker only starts when enabled
    pub enabled: bool,
    /// Recorded on predictions when the generator does not name its model
    pub model_name: String,
    pub example_selection: ExampleSelectionConfig,
    pub llm_labeling: BatchLabelingConfig,
    pub label_limits: LabelLimitsConfig,
    pub verification: VerificationConfig,
    pub persistence: PersistenceConfig,
    /// Schemas the engine is allowed to label
    pub schemas: Vec<AnnotationSchema>,
}

/// Consensus mining thresholds
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ExampleSelectionConfig {
    pub min_agreement_threshold: f64,
    pub min_annotators_per_instance: usize,
    pub max_examples_per_schema: usize,
    /// Seconds between example refreshes
    pub refresh_interval_secs: u64,
    /// Cap on examples placed into a single prompt (all when unset)
    pub examples_per_prompt: Option<usize>,
}

/// Batch labeling cadence and reporting threshold
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BatchLabelingConfig {
    pub batch_size: usize,
    /// Minimum examples a schema needs before batches run for it
    pub trigger_threshold: usize,
    /// Predictions below this are stored but not reported from a batch
    pub confidence_threshold: f64,
    /// Seconds between batch runs
    pub batch_interval_secs: u64,
}

/// Capacity and accuracy circuit breakers
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LabelLimitsConfig {
    pub max_total_labels: Option<usize>,
    pub max_unlabeled_ratio: f64,
    pub pause_on_low_accuracy: bool,
    pub min_accuracy_threshold: f64,
}

/// Human verification sampling
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub sample_rate: f64,
    pub selection_strategy: VerificationStrategy,
}

/// Snapshot location
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PersistenceConfig {
    pub state_file: PathBuf,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_name: "unknown".to_string(),
            example_selection: ExampleSelectionConfig::default(),
            llm_labeling: BatchLabelingConfig::default(),
            label_limits: LabelLimitsConfig::default(),
            verification: VerificationConfig::default(),
            persistence: PersistenceConfig::default(),
            schemas: Vec::new(),
        }
    }
}

impl Default for ExampleSelectionConfig {
    fn default() -> Self {
        Self {
            min_agreement_threshold: 0.8,
            min_annotators_per_instance: 2,
            max_examples_per_schema: 10,
            refresh_interval_secs: 300,
            examples_per_prompt: None,
        }
    }
}

impl Default for BatchLabelingConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            trigger_threshold: 5,
            confidence_threshold: 0.7,
            batch_interval_secs: 600,
        }
    }
}

impl Default for LabelLimitsConfig {
    fn default() -> Self {
        Self {
            max_total_labels: None,
            max_unlabeled_ratio: 0.5,
            pause_on_low_accuracy: true,
            min_accuracy_threshold: 0.7,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 0.2,
            selection_strategy: VerificationStrategy::LowConfidence,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("annotation_output/icl_labeler_state.json"),
        }
    }
}

impl LabelingConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> SharedResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SharedError::ConfigUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(content: &str) -> SharedResult<Self> {
        let config: LabelingConfig = serde_json::from_str(content).map_err(|e| SharedError::DeserializationError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> SharedResult<()> {
        let unit_fields = [
            ("example_selection.min_agreement_threshold", self.example_selection.min_agreement_threshold),
            ("llm_labeling.confidence_threshold", self.llm_labeling.confidence_threshold),
            ("label_limits.max_unlabeled_ratio", self.label_limits.max_unlabeled_ratio),
            ("label_limits.min_accuracy_threshold", self.label_limits.min_accuracy_threshold),
            ("verification.sample_rate", self.verification.sample_rate),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(SharedError::invalid_config(field, value));
            }
        }

        if self.example_selection.min_annotators_per_instance < 1 {
            return Err(SharedError::invalid_config(
                "example_selection.min_annotators_per_instance",
                self.example_selection.min_annotators_per_instance,
            ));
        }
        if self.example_selection.examples_per_prompt == Some(0) {
            return Err(SharedError::invalid_config("example_selection.examples_per_prompt", 0));
        }
        if self.llm_labeling.batch_size == 0 {
            return Err(SharedError::invalid_config("llm_labeling.batch_size", 0));
        }
        if self.example_selection.refresh_interval_secs == 0 {
            return Err(SharedError::invalid_config("example_selection.refresh_interval_secs", 0));
        }
        if self.llm_labeling.batch_interval_secs == 0 {
            return Err(SharedError::invalid_config("llm_labeling.batch_interval_secs", 0));
        }

        let mut seen = HashSet::new();
        for schema in &self.schemas {
            if schema.labels.is_empty() {
                return Err(SharedError::invalid_config(format!("schemas.{}.labels", schema.name), "[]"));
            }
            if !seen.insert(schema.name.as_str()) {
                return Err(SharedError::invalid_config("schemas.name", &schema.name));
            }
        }

        Ok(())
    }

    pub fn schema(&self, name: &str) -> Option<&AnnotationSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn example_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.example_selection.refresh_interval_secs)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.llm_labeling.batch_interval_secs)
    }

    /// How long the scheduler sleeps between wake-ups (never under a second)
    pub fn scheduler_tick(&self) -> Duration {
        let shortest = self.example_refresh_interval().min(self.batch_interval());
        (shortest / 2).max(Duration::from_secs(1))
    }
}
