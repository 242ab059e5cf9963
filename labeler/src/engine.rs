//! Main labeling engine implementation
//!
//! The engine owns the single [`EngineState`] behind one async mutex and
//! coordinates the annotation store, item store, generator and state store
//! through dependency injection. Collaborator calls, and in particular the
//! generator call, are always made with the lock released.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use shared::{
    component_debug, component_error, component_info, component_warn, AccuracyMetrics, Component, EngineStatus,
    HighConfidenceExample, IclPrediction, LabelingConfig, PauseReason, PredictionKey, VerificationStatus,
    VerificationStrategy,
};

use crate::core::{
    accuracy_metrics, interpret, select_for_review, ClaimSet, EngineState, ExampleMiner, PromptContext,
};
use crate::error::{LabelerError, LabelerResult};
use crate::scheduler::{self, WorkerHandle};
use crate::traits::{AnnotationStore, Generator, ItemStore, StateStore};

/// Verified predictions required before low accuracy can pause labeling
pub const MIN_VERIFIED_FOR_ACCURACY_PAUSE: usize = 10;

/// How long `stop_background_worker` waits for the loop to exit
pub const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one batch run for a schema
#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    /// Predictions at or above the confidence threshold
    pub reported: Vec<IclPrediction>,
    /// Every prediction stored, including low-confidence ones
    pub stored: usize,
}

/// Adaptive incremental labeling engine
pub struct LabelingEngine<A, I, G, S>
where
    A: AnnotationStore + 'static,
    I: ItemStore + 'static,
    G: Generator + 'static,
    S: StateStore + 'static,
{
    /// Immutable after construction
    config: LabelingConfig,

    /// All mutable labeling state
    state: Arc<Mutex<EngineState>>,

    /// Instances a batch is labeling right now
    claims: ClaimSet,

    /// Orders snapshot writes so an older snapshot never replaces a newer one
    save_lock: Mutex<()>,

    /// Injected collaborators
    annotations: A,
    items: I,
    generator: G,
    state_store: S,

    /// Background scheduler, when running
    worker: Mutex<Option<WorkerHandle>>,
}

impl<A, I, G, S> LabelingEngine<A, I, G, S>
where
    A: AnnotationStore + 'static,
    I: ItemStore + 'static,
    G: Generator + 'static,
    S: StateStore + 'static,
{
    /// Create a new engine with empty state
    pub fn new(config: LabelingConfig, annotations: A, items: I, generator: G, state_store: S) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(EngineState::new())),
            claims: ClaimSet::new(),
            save_lock: Mutex::new(()),
            annotations,
            items,
            generator,
            state_store,
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LabelingConfig {
        &self.config
    }

    fn model_name(&self) -> String {
        self.generator
            .model_name()
            .unwrap_or_else(|| self.config.model_name.clone())
    }

    fn precondition(&self, error: LabelerError) -> LabelerError {
        component_warn!(Component::Orchestrator, "⚠️ {}", error);
        error
    }

    // ------------------------------------------------------------------
    // Example mining
    // ------------------------------------------------------------------

    /// Rebuild the example table from current human annotations
    ///
    /// Returns the example count per schema. On collaborator failure the
    /// previous table is left untouched.
    pub async fn refresh_examples(&self) -> LabelerResult<BTreeMap<String, usize>> {
        let refreshed_at = Utc::now();
        let table = match self.mine_examples(refreshed_at).await {
            Ok(table) => table,
            Err(e) => {
                component_error!(
                    Component::Miner,
                    "❌ Example refresh failed, keeping previous examples: {}",
                    e
                );
                return Err(e);
            }
        };

        let counts: BTreeMap<String, usize> = table.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        self.state.lock().await.replace_examples(table, refreshed_at);

        component_info!(
            Component::Miner,
            "🔄 Refreshed examples: {} schemas, {} examples",
            counts.len(),
            counts.values().sum::<usize>()
        );
        Ok(counts)
    }

    async fn mine_examples(
        &self,
        refreshed_at: DateTime<Utc>,
    ) -> LabelerResult<HashMap<String, Vec<HighConfidenceExample>>> {
        let miner = ExampleMiner::new(&self.config.example_selection);

        let users = self.annotations.list_users().await?;
        let mut all_annotations = Vec::with_capacity(users.len());
        for user_id in &users {
            all_annotations.push(self.annotations.get_user_annotations(user_id).await?);
        }

        let votes = ExampleMiner::tally(&all_annotations);
        let mut examples = Vec::new();
        for (key, consensus) in miner.qualifying(&votes) {
            let text = self.items.get_text(&key.instance_id).await?;
            if let Some(example) = ExampleMiner::to_example(&key, &consensus, text, refreshed_at) {
                examples.push(example);
            }
        }

        component_debug!(
            Component::Miner,
            "Tallied {} item/schema pairs from {} users, {} qualify",
            votes.len(),
            users.len(),
            examples.len()
        );
        Ok(miner.rank(examples))
    }

    pub async fn get_examples(&self, schema_name: &str) -> Vec<HighConfidenceExample> {
        self.state.lock().await.examples(schema_name).to_vec()
    }

    pub async fn example_count(&self, schema_name: &str) -> usize {
        self.state.lock().await.example_count(schema_name)
    }

    // ------------------------------------------------------------------
    // Circuit breakers
    // ------------------------------------------------------------------

    fn pause_reason(&self, state: &EngineState) -> Option<PauseReason> {
        let limits = &self.config.label_limits;

        if let Some(limit) = limits.max_total_labels {
            let labeled = state.labeled_count();
            if labeled >= limit {
                return Some(PauseReason::TotalLabelCap { limit, labeled });
            }
        }

        if limits.pause_on_low_accuracy {
            let metrics = accuracy_metrics(state.predictions(), None);
            if metrics.total_verified >= MIN_VERIFIED_FOR_ACCURACY_PAUSE {
                if let Some(accuracy) = metrics.accuracy {
                    if accuracy < limits.min_accuracy_threshold {
                        return Some(PauseReason::LowAccuracy {
                            accuracy,
                            threshold: limits.min_accuracy_threshold,
                            verified: metrics.total_verified,
                        });
                    }
                }
            }
        }

        None
    }

    /// Why labeling is paused, or `None` when it may proceed
    pub async fn should_pause_labeling(&self) -> Option<PauseReason> {
        let state = self.state.lock().await;
        self.pause_reason(&state)
    }

    async fn human_annotated_ids(&self) -> LabelerResult<HashSet<String>> {
        let mut annotated = HashSet::new();
        for user_id in self.annotations.list_users().await? {
            annotated.extend(self.annotations.get_user_annotations(&user_id).await?.into_keys());
        }
        Ok(annotated)
    }

    /// Instances neither human-annotated, machine-labeled nor claimed by a running batch
    fn is_candidate(&self, state: &EngineState, instance_id: &str, human: &HashSet<String>) -> bool {
        !human.contains(instance_id) && !state.is_machine_labeled(instance_id) && !self.claims.is_claimed(instance_id)
    }

    /// Labels left under `max_total_labels`, counting claimed instances as labeled
    fn total_cap_remaining(&self, state: &EngineState) -> Option<usize> {
        self.config.label_limits.max_total_labels.map(|limit| {
            let claimed = self.claims.outstanding(|id| state.is_machine_labeled(id));
            limit.saturating_sub(state.labeled_count() + claimed)
        })
    }

    fn capacity(&self, state: &EngineState, instance_ids: &[String], human: &HashSet<String>) -> usize {
        let unlabeled = instance_ids
            .iter()
            .filter(|id| self.is_candidate(state, id, human))
            .count();
        let ratio_cap = (unlabeled as f64 * self.config.label_limits.max_unlabeled_ratio).floor() as usize;

        match self.total_cap_remaining(state) {
            Some(remaining) => ratio_cap.min(remaining),
            None => ratio_cap,
        }
    }

    /// How many more instances may be machine-labeled right now
    ///
    /// Without `max_total_labels` only the unlabeled-ratio cap applies.
    pub async fn remaining_label_capacity(&self) -> LabelerResult<usize> {
        let human = self.human_annotated_ids().await?;
        let instance_ids = self.items.list_instance_ids().await?;
        let state = self.state.lock().await;
        Ok(self.capacity(&state, &instance_ids, &human))
    }

    // ------------------------------------------------------------------
    // Labeling
    // ------------------------------------------------------------------

    fn sample_for_verification(&self) -> bool {
        let verification = &self.config.verification;
        verification.enabled && rand::thread_rng().gen_bool(verification.sample_rate.clamp(0.0, 1.0))
    }

    /// Label one instance using the schema's current examples
    pub async fn label_instance(
        &self,
        instance_id: &str,
        schema_name: &str,
        text: &str,
    ) -> LabelerResult<IclPrediction> {
        let key = PredictionKey::new(instance_id, schema_name);

        let schema = self.config.schema(schema_name).ok_or_else(|| {
            self.precondition(LabelerError::UnknownSchema {
                schema_name: schema_name.to_string(),
            })
        })?;

        if !self.generator.is_available() {
            return Err(self.precondition(LabelerError::GeneratorUnavailable));
        }

        let context = {
            let state = self.state.lock().await;
            let examples = state.examples(schema_name);
            if examples.is_empty() {
                None
            } else {
                Some(PromptContext::build(
                    schema,
                    examples,
                    text,
                    self.config.example_selection.examples_per_prompt,
                ))
            }
        };
        let context = context.ok_or_else(|| {
            self.precondition(LabelerError::NoExamples {
                schema_name: schema_name.to_string(),
            })
        })?;

        // Lock released: a slow model must not block other callers
        let raw = self.generator.generate(&context).await.map_err(|e| {
            component_warn!(Component::Orchestrator, "⚠️ Generation failed for {}: {}", key, e);
            LabelerError::GenerationFailed {
                key: key.clone(),
                message: e.to_string(),
            }
        })?;

        let interpretation = interpret(schema, &raw).ok_or_else(|| {
            component_warn!(Component::Interpreter, "⚠️ No usable label in reply for {}", key);
            LabelerError::NoUsableLabel { key: key.clone() }
        })?;

        let prediction = IclPrediction {
            instance_id: instance_id.to_string(),
            schema_name: schema_name.to_string(),
            predicted_label: interpretation.predicted_label(),
            confidence_score: interpretation.confidence,
            example_instance_ids: context.example_instance_ids(),
            verification_status: VerificationStatus::Pending,
            verified_by: None,
            verified_at: None,
            human_label: None,
            model_name: self.model_name(),
            reasoning: interpretation.reasoning,
            timestamp: Utc::now(),
        };

        let enqueue = self.sample_for_verification();
        self.state.lock().await.store_prediction(prediction.clone(), enqueue);

        component_debug!(
            Component::Orchestrator,
            "🏷️ Labeled {} as '{}' (confidence {:.2}, queued for review: {})",
            key,
            prediction.predicted_label,
            prediction.confidence_score,
            enqueue
        );
        Ok(prediction)
    }

    /// Label a batch of unlabeled instances for one schema
    ///
    /// Only predictions at or above the confidence threshold are returned;
    /// all successful predictions are stored and count against capacity.
    pub async fn batch_label_instances(&self, schema_name: &str) -> LabelerResult<Vec<IclPrediction>> {
        Ok(self.run_batch(schema_name).await?.reported)
    }

    /// Batch run reporting both returned and stored counts
    pub async fn run_batch(&self, schema_name: &str) -> LabelerResult<BatchOutcome> {
        let batch_config = &self.config.llm_labeling;
        let mut outcome = BatchOutcome::default();

        {
            let state = self.state.lock().await;
            if let Some(reason) = self.pause_reason(&state) {
                component_info!(Component::Orchestrator, "⏸️ Labeling paused: {}", reason);
                return Ok(outcome);
            }
            let available = state.example_count(schema_name);
            if available < batch_config.trigger_threshold {
                component_debug!(
                    Component::Orchestrator,
                    "Schema '{}' has {} examples, needs {}",
                    schema_name,
                    available,
                    batch_config.trigger_threshold
                );
                return Ok(outcome);
            }
        }

        let human = self.human_annotated_ids().await?;
        let instance_ids = self.items.list_instance_ids().await?;

        let (effective_batch_size, candidates) = {
            let state = self.state.lock().await;
            let capacity = self.capacity(&state, &instance_ids, &human);
            let candidates: Vec<String> = instance_ids
                .iter()
                .filter(|id| self.is_candidate(&state, id, &human))
                .cloned()
                .collect();
            (batch_config.batch_size.min(capacity), candidates)
        };

        if effective_batch_size == 0 {
            component_info!(Component::Orchestrator, "No labeling capacity left for '{}'", schema_name);
            return Ok(outcome);
        }

        let mut attempted = 0;
        for instance_id in candidates {
            if attempted >= effective_batch_size {
                break;
            }
            let text = match self.items.get_text(&instance_id).await? {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    component_debug!(Component::Orchestrator, "Skipping '{}': no text", instance_id);
                    continue;
                }
            };

            // Claimed under the state lock so concurrent batches agree on the total cap
            let claim = {
                let state = self.state.lock().await;
                if self.total_cap_remaining(&state) == Some(0) {
                    break;
                }
                if state.is_machine_labeled(&instance_id) {
                    continue;
                }
                match self.claims.try_claim(&instance_id) {
                    Some(claim) => claim,
                    None => continue,
                }
            };
            attempted += 1;

            let result = self.label_instance(claim.instance_id(), schema_name, &text).await;
            drop(claim);

            match result {
                Ok(prediction) => {
                    outcome.stored += 1;
                    if prediction.confidence_score >= batch_config.confidence_threshold {
                        outcome.reported.push(prediction);
                    }
                }
                Err(e) if e.is_precondition() => break,
                Err(_) => continue,
            }
        }

        component_info!(
            Component::Orchestrator,
            "📦 Batch for '{}': {} stored, {} above confidence threshold",
            schema_name,
            outcome.stored,
            outcome.reported.len()
        );
        Ok(outcome)
    }

    pub async fn get_prediction(&self, instance_id: &str, schema_name: &str) -> Option<IclPrediction> {
        let key = PredictionKey::new(instance_id, schema_name);
        self.state.lock().await.prediction(&key).cloned()
    }

    pub async fn get_predictions_for_instance(&self, instance_id: &str) -> Vec<IclPrediction> {
        self.state.lock().await.predictions_for_instance(instance_id)
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Pending predictions for human review; `None` uses the configured strategy
    pub async fn get_pending_verifications(
        &self,
        count: usize,
        strategy: Option<VerificationStrategy>,
    ) -> Vec<IclPrediction> {
        let pending = self.state.lock().await.pending_queue_entries();
        let strategy = strategy.unwrap_or(self.config.verification.selection_strategy);
        select_for_review(pending, count, strategy, &mut rand::thread_rng())
    }

    /// Record a human judgement on a prediction
    pub async fn record_verification(
        &self,
        instance_id: &str,
        schema_name: &str,
        human_label: &str,
        verified_by: &str,
    ) -> LabelerResult<VerificationStatus> {
        let key = PredictionKey::new(instance_id, schema_name);
        let result = self
            .state
            .lock()
            .await
            .record_verification(&key, human_label, verified_by, Utc::now());

        match &result {
            Ok(status) => component_info!(
                Component::Verification,
                "✅ {} verified by {}: {}",
                key,
                verified_by,
                status
            ),
            Err(e) => component_warn!(Component::Verification, "⚠️ Verification rejected: {}", e),
        }
        result
    }

    pub async fn get_accuracy_metrics(&self, schema_name: Option<&str>) -> AccuracyMetrics {
        let state = self.state.lock().await;
        accuracy_metrics(state.predictions(), schema_name)
    }

    // ------------------------------------------------------------------
    // Status and scheduling
    // ------------------------------------------------------------------

    pub async fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn get_status(&self) -> EngineStatus {
        let worker_running = self.is_worker_running().await;
        let state = self.state.lock().await;
        let pause = self.pause_reason(&state);

        EngineStatus {
            enabled: self.config.enabled,
            worker_running,
            model_name: self.model_name(),
            generator_available: self.generator.is_available(),
            examples_per_schema: state.example_counts(),
            total_predictions: state.prediction_count(),
            labeled_instances: state.labeled_count(),
            pending_verifications: state.pending_queue_entries().len(),
            paused: pause.is_some(),
            pause_reason: pause.map(|reason| reason.to_string()),
            accuracy: accuracy_metrics(state.predictions(), None),
            last_example_refresh: state.last_example_refresh(),
            last_batch_run: state.last_batch_run(),
        }
    }

    /// Last example refresh and last batch run
    pub async fn refresh_times(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let state = self.state.lock().await;
        (state.last_example_refresh(), state.last_batch_run())
    }

    pub async fn mark_batch_run(&self, at: DateTime<Utc>) {
        self.state.lock().await.mark_batch_run(at);
    }

    /// Start the background scheduler; returns false when disabled or already running
    pub async fn start_background_worker(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            component_info!(Component::Scheduler, "Incremental labeling disabled, worker not started");
            return false;
        }

        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            component_debug!(Component::Scheduler, "Background worker already running");
            return false;
        }

        *worker = Some(scheduler::spawn(Arc::clone(self)));
        true
    }

    /// Signal the scheduler and wait a bounded time for it to exit
    ///
    /// Returns false when no worker was running or it did not exit in time.
    pub async fn stop_background_worker(&self) -> bool {
        let handle = self.worker.lock().await.take();
        match handle {
            Some(handle) => scheduler::stop(handle, WORKER_STOP_TIMEOUT).await,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write a snapshot of the whole state; failures leave memory untouched
    pub async fn save_state(&self) -> LabelerResult<()> {
        let _ordered = self.save_lock.lock().await;
        let snapshot = self.state.lock().await.to_snapshot();

        match self.state_store.save(&snapshot).await {
            Ok(()) => {
                component_debug!(
                    Component::Persistence,
                    "💾 Saved {} predictions to {}",
                    snapshot.predictions.values().map(|m| m.len()).sum::<usize>(),
                    self.state_store.location()
                );
                Ok(())
            }
            Err(e) => {
                component_error!(
                    Component::Persistence,
                    "❌ Failed to save state to {}: {}",
                    self.state_store.location(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Replace in-memory state with the stored snapshot
    ///
    /// Returns false when no snapshot exists, in which case state is unchanged.
    pub async fn load_state(&self) -> LabelerResult<bool> {
        match self.state_store.load().await {
            Ok(Some(snapshot)) => {
                let restored = EngineState::from_snapshot(snapshot);
                component_info!(
                    Component::Persistence,
                    "📂 Restored {} predictions and {} labeled instances from {}",
                    restored.prediction_count(),
                    restored.labeled_count(),
                    self.state_store.location()
                );
                *self.state.lock().await = restored;
                Ok(true)
            }
            Ok(None) => {
                component_debug!(
                    Component::Persistence,
                    "No saved state at {}",
                    self.state_store.location()
                );
                Ok(false)
            }
            Err(e) => {
                component_error!(
                    Component::Persistence,
                    "❌ Failed to load state from {}: {}",
                    self.state_store.location(),
                    e
                );
                Err(e)
            }
        }
    }
}
