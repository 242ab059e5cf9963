//! Verification selection strategies
//!
//! Picks which pending predictions a human should review next. The caller
//! passes in already-filtered pending entries in queue order.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{IclPrediction, VerificationStrategy};

fn by_confidence(a: &IclPrediction, b: &IclPrediction) -> Ordering {
    a.confidence_score
        .partial_cmp(&b.confidence_score)
        .unwrap_or(Ordering::Equal)
}

/// Choose up to `count` predictions for review under `strategy`
pub fn select_for_review<R: Rng + ?Sized>(
    mut pending: Vec<IclPrediction>,
    count: usize,
    strategy: VerificationStrategy,
    rng: &mut R,
) -> Vec<IclPrediction> {
    match strategy {
        VerificationStrategy::LowConfidence => {
            // Stable sort: equal confidences keep queue order
            pending.sort_by(by_confidence);
            pending.truncate(count);
            pending
        }
        VerificationStrategy::Random => {
            pending.shuffle(rng);
            pending.truncate(count);
            pending
        }
        VerificationStrategy::Mixed => {
            pending.sort_by(by_confidence);
            let low_count = (count / 2).min(pending.len());
            let mut rest = pending.split_off(low_count);
            rest.shuffle(rng);
            rest.truncate(count - count / 2);
            pending.extend(rest);
            pending
        }
    }
}
