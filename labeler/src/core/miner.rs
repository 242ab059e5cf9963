//! Consensus mining over human annotations
//!
//! Tallies per-item votes across annotators, keeps the items where a clear
//! majority agrees, and ranks them per schema. Collaborator I/O happens in
//! the engine; everything here is pure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use shared::{ExampleSelectionConfig, HighConfidenceExample, PredictionKey};

use crate::traits::UserAnnotations;

/// Label vote counts per (instance, schema) pair
pub type VoteTable = BTreeMap<PredictionKey, BTreeMap<String, usize>>;

/// Majority outcome for one (instance, schema) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub label: String,
    pub majority_votes: usize,
    pub total_votes: usize,
}

impl Consensus {
    pub fn agreement(&self) -> f64 {
        if self.total_votes == 0 {
            0.0
        } else {
            self.majority_votes as f64 / self.total_votes as f64
        }
    }
}

/// Ranks and filters annotation consensus into demonstration examples
#[derive(Debug, Clone)]
pub struct ExampleMiner {
    min_agreement_threshold: f64,
    min_annotators_per_instance: usize,
    max_examples_per_schema: usize,
}

impl ExampleMiner {
    pub fn new(config: &ExampleSelectionConfig) -> Self {
        Self {
            min_agreement_threshold: config.min_agreement_threshold,
            min_annotators_per_instance: config.min_annotators_per_instance,
            max_examples_per_schema: config.max_examples_per_schema,
        }
    }

    /// Count votes across every user's annotations
    pub fn tally<'a>(annotations: impl IntoIterator<Item = &'a UserAnnotations>) -> VoteTable {
        let mut votes = VoteTable::new();
        for user_annotations in annotations {
            for (instance_id, labels) in user_annotations {
                for (schema_name, label) in labels {
                    *votes
                        .entry(PredictionKey::new(instance_id.clone(), schema_name.clone()))
                        .or_default()
                        .entry(label.clone())
                        .or_insert(0) += 1;
                }
            }
        }
        votes
    }

    /// Majority label for one pair; ties go to the lexicographically smallest label
    pub fn consensus(label_votes: &BTreeMap<String, usize>) -> Option<Consensus> {
        let total_votes: usize = label_votes.values().sum();
        let mut best: Option<(&String, usize)> = None;
        for (label, &count) in label_votes {
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((label, count));
            }
        }

        best.map(|(label, majority_votes)| Consensus {
            label: label.clone(),
            majority_votes,
            total_votes,
        })
    }

    /// Pairs whose consensus clears the annotator and agreement thresholds
    pub fn qualifying(&self, votes: &VoteTable) -> Vec<(PredictionKey, Consensus)> {
        votes
            .iter()
            .filter_map(|(key, label_votes)| {
                let consensus = Self::consensus(label_votes)?;
                let qualifies = consensus.total_votes >= self.min_annotators_per_instance
                    && consensus.agreement() >= self.min_agreement_threshold;
                qualifies.then(|| (key.clone(), consensus))
            })
            .collect()
    }

    /// Build an example from a qualifying pair, dropping items without text
    pub fn to_example(
        key: &PredictionKey,
        consensus: &Consensus,
        text: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Option<HighConfidenceExample> {
        let text = text.filter(|t| !t.trim().is_empty())?;
        Some(HighConfidenceExample {
            instance_id: key.instance_id.clone(),
            text,
            schema_name: key.schema_name.clone(),
            label: consensus.label.clone(),
            agreement_score: consensus.agreement(),
            annotator_count: consensus.total_votes,
            timestamp,
        })
    }

    /// Group by schema, order best-first and truncate each list
    ///
    /// Equal agreement is ordered by more annotators first, then instance id.
    pub fn rank(&self, examples: Vec<HighConfidenceExample>) -> HashMap<String, Vec<HighConfidenceExample>> {
        let mut by_schema: HashMap<String, Vec<HighConfidenceExample>> = HashMap::new();
        for example in examples {
            by_schema.entry(example.schema_name.clone()).or_default().push(example);
        }

        for list in by_schema.values_mut() {
            list.sort_by(|a, b| {
                b.agreement_score
                    .partial_cmp(&a.agreement_score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.annotator_count.cmp(&a.annotator_count))
                    .then_with(|| a.instance_id.cmp(&b.instance_id))
            });
            list.truncate(self.max_examples_per_schema);
        }

        by_schema.retain(|_, list| !list.is_empty());
        by_schema
    }
}
