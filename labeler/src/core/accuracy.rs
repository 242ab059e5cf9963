//! Accuracy aggregation over verified predictions

use shared::{AccuracyMetrics, IclPrediction, VerificationStatus};

/// Aggregate verification outcomes, optionally restricted to one schema
pub fn accuracy_metrics<'a>(
    predictions: impl IntoIterator<Item = &'a IclPrediction>,
    schema_name: Option<&str>,
) -> AccuracyMetrics {
    let mut metrics = AccuracyMetrics {
        schema_name: schema_name.map(str::to_string),
        ..AccuracyMetrics::default()
    };
    let mut correct_confidence = 0.0;
    let mut incorrect_confidence = 0.0;

    for prediction in predictions {
        if schema_name.is_some_and(|s| s != prediction.schema_name) {
            continue;
        }

        metrics.total_predictions += 1;
        match prediction.verification_status {
            VerificationStatus::VerifiedCorrect => {
                metrics.verified_correct += 1;
                correct_confidence += prediction.confidence_score;
            }
            VerificationStatus::VerifiedIncorrect => {
                metrics.verified_incorrect += 1;
                incorrect_confidence += prediction.confidence_score;
            }
            VerificationStatus::Pending => metrics.pending += 1,
        }
    }

    metrics.total_verified = metrics.verified_correct + metrics.verified_incorrect;
    metrics.accuracy = ratio(metrics.verified_correct as f64, metrics.total_verified);
    metrics.avg_confidence_correct = ratio(correct_confidence, metrics.verified_correct);
    metrics.avg_confidence_incorrect = ratio(incorrect_confidence, metrics.verified_incorrect);
    metrics
}

fn ratio(numerator: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| numerator / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn prediction(schema: &str, confidence: f64, status: VerificationStatus) -> IclPrediction {
        IclPrediction {
            instance_id: format!("doc_{confidence}"),
            schema_name: schema.to_string(),
            predicted_label: "happy".to_string(),
            confidence_score: confidence,
            example_instance_ids: Vec::new(),
            verification_status: status,
            verified_by: None,
            verified_at: None,
            human_label: None,
            model_name: "test".to_string(),
            reasoning: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_has_no_accuracy() {
        let metrics = accuracy_metrics(std::iter::empty(), None);
        assert_eq!(metrics.total_verified, 0);
        assert!(metrics.accuracy.is_none());
        assert!(metrics.avg_confidence_correct.is_none());
        assert!(metrics.avg_confidence_incorrect.is_none());
    }

    #[test]
    fn test_partition_and_means() {
        let predictions = vec![
            prediction("sentiment", 0.9, VerificationStatus::VerifiedCorrect),
            prediction("sentiment", 0.7, VerificationStatus::VerifiedCorrect),
            prediction("sentiment", 0.4, VerificationStatus::VerifiedIncorrect),
            prediction("sentiment", 0.5, VerificationStatus::Pending),
        ];

        let metrics = accuracy_metrics(&predictions, None);

        assert_eq!(metrics.total_predictions, 4);
        assert_eq!(metrics.verified_correct, 2);
        assert_eq!(metrics.verified_incorrect, 1);
        assert_eq!(metrics.pending, 1);
        assert_eq!(metrics.total_verified, 3);
        assert!((metrics.accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.avg_confidence_correct.unwrap() - 0.8).abs() < 1e-9);
        assert!((metrics.avg_confidence_incorrect.unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_schema_filter() {
        let predictions = vec![
            prediction("sentiment", 0.9, VerificationStatus::VerifiedCorrect),
            prediction("topic", 0.3, VerificationStatus::VerifiedIncorrect),
        ];

        let metrics = accuracy_metrics(&predictions, Some("topic"));

        assert_eq!(metrics.schema_name.as_deref(), Some("topic"));
        assert_eq!(metrics.total_predictions, 1);
        assert_eq!(metrics.accuracy, Some(0.0));
        assert!(metrics.avg_confidence_correct.is_none());
    }
}
