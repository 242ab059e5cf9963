//! Core engine state management
//!
//! Pure state for examples, predictions, the verification queue and the
//! machine-labeled set. The engine owns exactly one of these behind its
//! mutex; nothing here performs I/O.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{HighConfidenceExample, IclPrediction, PredictionKey, VerificationStatus};

use crate::error::{LabelerError, LabelerResult};

/// Persisted form of [`EngineState`]
///
/// Every field defaults when absent so older or hand-edited snapshots load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSnapshot {
    /// instance id -> schema name -> prediction
    pub predictions: BTreeMap<String, BTreeMap<String, IclPrediction>>,
    /// schema name -> ranked examples
    pub examples: BTreeMap<String, Vec<HighConfidenceExample>>,
    /// (instance id, schema name) pairs awaiting review, oldest first
    pub verification_queue: Vec<(String, String)>,
    /// Sorted ids of machine-labeled instances
    pub labeled_instance_ids: Vec<String>,
    pub last_example_refresh: Option<DateTime<Utc>>,
    pub last_batch_run: Option<DateTime<Utc>>,
}

/// All mutable engine data
#[derive(Debug, Default)]
pub struct EngineState {
    examples: HashMap<String, Vec<HighConfidenceExample>>,
    predictions: HashMap<PredictionKey, IclPrediction>,
    verification_queue: VecDeque<PredictionKey>,
    labeled_instance_ids: HashSet<String>,
    last_example_refresh: Option<DateTime<Utc>>,
    last_batch_run: Option<DateTime<Utc>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole example table; schemas missing from `table` lose their examples
    pub fn replace_examples(&mut self, table: HashMap<String, Vec<HighConfidenceExample>>, at: DateTime<Utc>) {
        self.examples = table;
        self.last_example_refresh = Some(at);
    }

    pub fn examples(&self, schema_name: &str) -> &[HighConfidenceExample] {
        self.examples.get(schema_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn example_count(&self, schema_name: &str) -> usize {
        self.examples(schema_name).len()
    }

    pub fn example_counts(&self) -> BTreeMap<String, usize> {
        self.examples.iter().map(|(schema, list)| (schema.clone(), list.len())).collect()
    }

    /// Store a prediction (last write wins) and mark its instance as machine-labeled
    ///
    /// The queue follows the latest sampling decision: a re-labeled key keeps
    /// its place when sampled again and leaves the queue when not.
    pub fn store_prediction(&mut self, prediction: IclPrediction, enqueue: bool) {
        let key = prediction.key();
        self.labeled_instance_ids.insert(key.instance_id.clone());
        if enqueue {
            if !self.verification_queue.contains(&key) {
                self.verification_queue.push_back(key.clone());
            }
        } else {
            self.verification_queue.retain(|queued| queued != &key);
        }
        self.predictions.insert(key, prediction);
    }

    pub fn prediction(&self, key: &PredictionKey) -> Option<&IclPrediction> {
        self.predictions.get(key)
    }

    pub fn predictions(&self) -> impl Iterator<Item = &IclPrediction> {
        self.predictions.values()
    }

    pub fn predictions_for_instance(&self, instance_id: &str) -> Vec<IclPrediction> {
        let mut found: Vec<IclPrediction> = self
            .predictions
            .values()
            .filter(|p| p.instance_id == instance_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.schema_name.cmp(&b.schema_name));
        found
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    pub fn labeled_count(&self) -> usize {
        self.labeled_instance_ids.len()
    }

    pub fn is_machine_labeled(&self, instance_id: &str) -> bool {
        self.labeled_instance_ids.contains(instance_id)
    }

    pub fn verification_queue(&self) -> &VecDeque<PredictionKey> {
        &self.verification_queue
    }

    /// Queued predictions that are still pending, in queue order
    pub fn pending_queue_entries(&self) -> Vec<IclPrediction> {
        self.verification_queue
            .iter()
            .filter_map(|key| self.predictions.get(key))
            .filter(|p| p.is_pending())
            .cloned()
            .collect()
    }

    /// Apply a human judgement to a pending prediction
    ///
    /// Correctness is exact string equality with the predicted label.
    pub fn record_verification(
        &mut self,
        key: &PredictionKey,
        human_label: &str,
        verified_by: &str,
        at: DateTime<Utc>,
    ) -> LabelerResult<VerificationStatus> {
        let prediction = self
            .predictions
            .get_mut(key)
            .ok_or_else(|| LabelerError::PredictionNotFound { key: key.clone() })?;

        if prediction.verification_status.is_terminal() {
            return Err(LabelerError::AlreadyVerified { key: key.clone() });
        }

        prediction.human_label = Some(human_label.to_string());
        prediction.verified_by = Some(verified_by.to_string());
        prediction.verified_at = Some(at);
        prediction.verification_status = if human_label == prediction.predicted_label {
            VerificationStatus::VerifiedCorrect
        } else {
            VerificationStatus::VerifiedIncorrect
        };
        let status = prediction.verification_status;

        self.verification_queue.retain(|queued| queued != key);
        Ok(status)
    }

    pub fn verified_count(&self) -> usize {
        self.predictions.values().filter(|p| p.verification_status.is_terminal()).count()
    }

    pub fn mark_batch_run(&mut self, at: DateTime<Utc>) {
        self.last_batch_run = Some(at);
    }

    pub fn last_example_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_example_refresh
    }

    pub fn last_batch_run(&self) -> Option<DateTime<Utc>> {
        self.last_batch_run
    }

    pub fn to_snapshot(&self) -> EngineSnapshot {
        let mut predictions: BTreeMap<String, BTreeMap<String, IclPrediction>> = BTreeMap::new();
        for (key, prediction) in &self.predictions {
            predictions
                .entry(key.instance_id.clone())
                .or_default()
                .insert(key.schema_name.clone(), prediction.clone());
        }

        let mut labeled_instance_ids: Vec<String> = self.labeled_instance_ids.iter().cloned().collect();
        labeled_instance_ids.sort();

        EngineSnapshot {
            predictions,
            examples: self.examples.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            verification_queue: self
                .verification_queue
                .iter()
                .map(|key| (key.instance_id.clone(), key.schema_name.clone()))
                .collect(),
            labeled_instance_ids,
            last_example_refresh: self.last_example_refresh,
            last_batch_run: self.last_batch_run,
        }
    }

    /// Rebuild state from a snapshot; the nested map keys are authoritative
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Self {
        let mut predictions = HashMap::new();
        for (instance_id, by_schema) in snapshot.predictions {
            for (schema_name, mut prediction) in by_schema {
                prediction.instance_id = instance_id.clone();
                prediction.schema_name = schema_name.clone();
                predictions.insert(PredictionKey::new(instance_id.clone(), schema_name), prediction);
            }
        }

        Self {
            examples: snapshot.examples.into_iter().collect(),
            predictions,
            verification_queue: snapshot
                .verification_queue
                .into_iter()
                .map(|(instance_id, schema_name)| PredictionKey::new(instance_id, schema_name))
                .collect(),
            labeled_instance_ids: snapshot.labeled_instance_ids.into_iter().collect(),
            last_example_refresh: snapshot.last_example_refresh,
            last_batch_run: snapshot.last_batch_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(instance_id: &str, schema: &str, label: &str, confidence: f64) -> IclPrediction {
        IclPrediction {
            instance_id: instance_id.to_string(),
            schema_name: schema.to_string(),
            predicted_label: label.to_string(),
            confidence_score: confidence,
            example_instance_ids: vec!["ex_1".to_string()],
            verification_status: VerificationStatus::Pending,
            verified_by: None,
            verified_at: None,
            human_label: None,
            model_name: "test-model".to_string(),
            reasoning: Some("because".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_store_overwrites_and_tracks_labeled() {
        let mut state = EngineState::new();
        state.store_prediction(prediction("doc_1", "sentiment", "happy", 0.6), true);
        state.store_prediction(prediction("doc_1", "sentiment", "sad", 0.9), true);

        let key = PredictionKey::new("doc_1", "sentiment");
        assert_eq!(state.prediction(&key).unwrap().predicted_label, "sad");
        assert_eq!(state.prediction_count(), 1);
        assert_eq!(state.labeled_count(), 1);
        assert_eq!(state.verification_queue().len(), 1);
    }

    #[test]
    fn test_unsampled_relabel_leaves_queue() {
        let mut state = EngineState::new();
        state.store_prediction(prediction("doc_1", "sentiment", "happy", 0.6), true);
        state.store_prediction(prediction("doc_2", "sentiment", "sad", 0.5), true);

        state.store_prediction(prediction("doc_1", "sentiment", "sad", 0.9), false);

        let key = PredictionKey::new("doc_1", "sentiment");
        assert!(!state.verification_queue().contains(&key));
        assert_eq!(state.verification_queue().len(), 1);
        assert_eq!(state.pending_queue_entries()[0].instance_id, "doc_2");
        assert_eq!(state.prediction(&key).unwrap().predicted_label, "sad");
    }

    #[test]
    fn test_verification_is_one_way() {
        let mut state = EngineState::new();
        state.store_prediction(prediction("doc_1", "sentiment", "happy", 0.6), true);
        let key = PredictionKey::new("doc_1", "sentiment");

        let status = state.record_verification(&key, "happy", "alice", Utc::now()).unwrap();
        assert_eq!(status, VerificationStatus::VerifiedCorrect);
        assert!(state.verification_queue().is_empty());

        let again = state.record_verification(&key, "sad", "bob", Utc::now());
        assert!(matches!(again, Err(LabelerError::AlreadyVerified { .. })));
        let stored = state.prediction(&key).unwrap();
        assert_eq!(stored.verification_status, VerificationStatus::VerifiedCorrect);
        assert_eq!(stored.verified_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_verification_uses_exact_equality() {
        let mut state = EngineState::new();
        state.store_prediction(prediction("doc_1", "sentiment", "happy", 0.6), false);
        let key = PredictionKey::new("doc_1", "sentiment");

        let status = state.record_verification(&key, "Happy", "alice", Utc::now()).unwrap();
        assert_eq!(status, VerificationStatus::VerifiedIncorrect);
        assert_eq!(state.verified_count(), 1);
    }

    #[test]
    fn test_verification_missing_prediction() {
        let mut state = EngineState::new();
        let key = PredictionKey::new("ghost", "sentiment");
        let result = state.record_verification(&key, "happy", "alice", Utc::now());
        assert!(matches!(result, Err(LabelerError::PredictionNotFound { .. })));
    }

    #[test]
    fn test_replace_examples_drops_stale_schemas() {
        let mut state = EngineState::new();
        let example = HighConfidenceExample {
            instance_id: "doc_1".to_string(),
            text: "t".to_string(),
            schema_name: "old".to_string(),
            label: "A".to_string(),
            agreement_score: 1.0,
            annotator_count: 2,
            timestamp: Utc::now(),
        };
        state.replace_examples(HashMap::from([("old".to_string(), vec![example])]), Utc::now());
        assert_eq!(state.example_count("old"), 1);

        state.replace_examples(HashMap::new(), Utc::now());
        assert_eq!(state.example_count("old"), 0);
        assert!(state.last_example_refresh().is_some());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut state = EngineState::new();
        state.store_prediction(prediction("doc_2", "sentiment", "sad", 0.4), true);
        state.store_prediction(prediction("doc_1", "sentiment", "happy", 0.8), true);
        state.store_prediction(prediction("doc_1", "topic", "sports", 0.7), false);
        state.mark_batch_run(Utc::now());

        let snapshot = state.to_snapshot();
        assert_eq!(snapshot.labeled_instance_ids, vec!["doc_1", "doc_2"]);
        assert_eq!(snapshot.predictions["doc_1"].len(), 2);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = EngineState::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.to_snapshot(), snapshot);
        assert_eq!(restored.verification_queue().len(), 2);
        assert_eq!(restored.verification_queue()[0], PredictionKey::new("doc_2", "sentiment"));
    }

    #[test]
    fn test_empty_document_loads() {
        let snapshot: EngineSnapshot = serde_json::from_str("{}").unwrap();
        let state = EngineState::from_snapshot(snapshot);
        assert_eq!(state.prediction_count(), 0);
        assert!(state.last_batch_run().is_none());
    }
}
