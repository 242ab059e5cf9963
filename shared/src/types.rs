//! Core shared types and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Composite key for one machine prediction: an instance labeled under one schema
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredictionKey {
    pub instance_id: String,
    pub schema_name: String,
}

impl PredictionKey {
    pub fn new(instance_id: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            schema_name: schema_name.into(),
        }
    }
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instance_id, self.schema_name)
    }
}

/// A human-annotated instance with strong annotator agreement, used as an in-context demonstration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighConfidenceExample {
    pub instance_id: String,
    pub text: String,
    pub schema_name: String,
    pub label: String,
    pub agreement_score: f64,
    pub annotator_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Verification lifecycle of a prediction. Terminal states never change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    VerifiedCorrect,
    VerifiedIncorrect,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::VerifiedCorrect => write!(f, "verified_correct"),
            VerificationStatus::VerifiedIncorrect => write!(f, "verified_incorrect"),
        }
    }
}

/// A label produced by the model for one instance/schema pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IclPrediction {
    pub instance_id: String,
    pub schema_name: String,
    pub predicted_label: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub example_instance_ids: Vec<String>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub human_label: Option<String>,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Creation time; snapshots written before this field existed load with the load time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl IclPrediction {
    pub fn key(&self) -> PredictionKey {
        PredictionKey::new(self.instance_id.clone(), self.schema_name.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.verification_status == VerificationStatus::Pending
    }
}

/// How many labels a schema accepts per instance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    #[default]
    #[serde(alias = "radio")]
    Single,
    #[serde(alias = "multiselect")]
    Multi,
}

/// An annotation schema the engine may label, with its declared label set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: SchemaKind,
    pub labels: Vec<String>,
}

impl AnnotationSchema {
    pub fn single(name: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: SchemaKind::Single,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn multi(name: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            kind: SchemaKind::Multi,
            ..Self::single(name, labels)
        }
    }

    pub fn is_multi(&self) -> bool {
        self.kind == SchemaKind::Multi
    }
}

/// Policy for choosing which pending predictions go to human reviewers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStrategy {
    #[default]
    LowConfidence,
    Random,
    Mixed,
}

impl fmt::Display for VerificationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStrategy::LowConfidence => write!(f, "low_confidence"),
            VerificationStrategy::Random => write!(f, "random"),
            VerificationStrategy::Mixed => write!(f, "mixed"),
        }
    }
}

impl std::str::FromStr for VerificationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low_confidence" => Ok(VerificationStrategy::LowConfidence),
            "random" => Ok(VerificationStrategy::Random),
            "mixed" => Ok(VerificationStrategy::Mixed),
            _ => Err(format!("Unknown verification strategy: {s}")),
        }
    }
}

/// Why auto-labeling is currently suspended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    TotalLabelCap { limit: usize, labeled: usize },
    LowAccuracy { accuracy: f64, threshold: f64, verified: usize },
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::TotalLabelCap { limit, labeled } => {
                write!(f, "Reached max_total_labels limit ({labeled}/{limit})")
            }
            PauseReason::LowAccuracy {
                accuracy,
                threshold,
                verified,
            } => write!(
                f,
                "Accuracy {:.1}% over {} verified predictions is below threshold {:.1}%",
                accuracy * 100.0,
                verified,
                threshold * 100.0
            ),
        }
    }
}

/// Verification outcome aggregates over stored predictions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub schema_name: Option<String>,
    pub total_predictions: usize,
    pub verified_correct: usize,
    pub verified_incorrect: usize,
    pub pending: usize,
    pub total_verified: usize,
    pub accuracy: Option<f64>,
    pub avg_confidence_correct: Option<f64>,
    pub avg_confidence_incorrect: Option<f64>,
}

/// Point-in-time view of the engine for the admin surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub worker_running: bool,
    pub model_name: String,
    pub generator_available: bool,
    pub examples_per_schema: BTreeMap<String, usize>,
    pub total_predictions: usize,
    pub labeled_instances: usize,
    pub pending_verifications: usize,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub accuracy: AccuracyMetrics,
    pub last_example_refresh: Option<DateTime<Utc>>,
    pub last_batch_run: Option<DateTime<Utc>>,
}
