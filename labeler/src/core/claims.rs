//! In-flight labeling claims
//!
//! A batch claims an instance before calling the generator and holds the
//! claim until the prediction is stored or the attempt fails. Claims are
//! released on drop, so a cancelled batch never strands an instance.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Instance ids currently being labeled
#[derive(Debug, Clone, Default)]
pub struct ClaimSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `instance_id`, or `None` when another caller holds it
    pub fn try_claim(&self, instance_id: &str) -> Option<Claim> {
        if !self.ids().insert(instance_id.to_string()) {
            return None;
        }
        Some(Claim {
            set: self.clone(),
            instance_id: instance_id.to_string(),
        })
    }

    pub fn is_claimed(&self, instance_id: &str) -> bool {
        self.ids().contains(instance_id)
    }

    /// Claims whose instance is not yet counted as labeled
    pub fn outstanding(&self, is_labeled: impl Fn(&str) -> bool) -> usize {
        self.ids().iter().filter(|id| !is_labeled(id)).count()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

/// Exclusive right to label one instance
#[derive(Debug)]
pub struct Claim {
    set: ClaimSet,
    instance_id: String,
}

impl Claim {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.set.ids().remove(&self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused_until_release() {
        let claims = ClaimSet::new();

        let first = claims.try_claim("doc_1").expect("free instance");
        assert!(claims.try_claim("doc_1").is_none());
        assert!(claims.is_claimed("doc_1"));
        assert_eq!(first.instance_id(), "doc_1");

        drop(first);
        assert!(!claims.is_claimed("doc_1"));
        assert!(claims.try_claim("doc_1").is_some());
        assert!(claims.is_empty());
    }

    #[test]
    fn test_outstanding_skips_labeled_instances() {
        let claims = ClaimSet::new();
        let _a = claims.try_claim("doc_1");
        let _b = claims.try_claim("doc_2");

        assert_eq!(claims.len(), 2);
        assert_eq!(claims.outstanding(|id| id == "doc_1"), 1);
    }
}
