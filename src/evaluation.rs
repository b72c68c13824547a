use log::info;
use serde::Serialize;

/// Binary classification metrics with class 1 as the positive class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    /// `[[tn, fp], [fn, tp]]`, rows are the true class.
    pub confusion_matrix: [[usize; 2]; 2],
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> [[usize; 2]; 2] {
    let mut matrix = [[0usize; 2]; 2];
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        matrix[(*t).min(1)][(*p).min(1)] += 1;
    }
    matrix
}

// Scores hard predictions. ROC-AUC of a 0/1 predictor is the mean of
// sensitivity and specificity; it is 0.5 when one true class is absent.
pub fn evaluate_model(y_true: &[usize], y_pred: &[usize], model_name: &str) -> ClassificationMetrics {
    let matrix = confusion_matrix(y_true, y_pred);
    let [[tn, fp], [fn_, tp]] = matrix;

    let accuracy = ratio(tn + tp, tn + fp + fn_ + tp);
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    let roc_auc = if tp + fn_ == 0 || tn + fp == 0 {
        0.5
    } else {
        (recall + ratio(tn, tn + fp)) / 2.0
    };

    info!("{} Performance:", model_name);
    info!("Accuracy: {:.4}", accuracy);
    info!("Precision: {:.4}", precision);
    info!("Recall: {:.4}", recall);
    info!("F1 Score: {:.4}", f1);
    info!("ROC-AUC: {:.4}", roc_auc);
    info!("Confusion Matrix: {:?}", matrix);

    ClassificationMetrics {
        accuracy,
        precision,
        recall,
        f1,
        roc_auc,
        confusion_matrix: matrix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_metrics_from_known_confusion() {
        // tn=2 fp=1 fn=1 tp=3
        let y_true = [0, 0, 0, 1, 1, 1, 1];
        let y_pred = [0, 0, 1, 0, 1, 1, 1];
        let m = evaluate_model(&y_true, &y_pred, "test");

        assert_eq!(m.confusion_matrix, [[2, 1], [1, 3]]);
        assert_abs_diff_eq!(m.accuracy, 5.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.precision, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(m.recall, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(m.f1, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(m.roc_auc, (0.75 + 2.0 / 3.0) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_positive_predictions() {
        let m = evaluate_model(&[0, 1], &[0, 0], "none");
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.roc_auc, 0.5);
    }

    #[test]
    fn test_single_class_truth() {
        let m = evaluate_model(&[1, 1, 1], &[1, 1, 0], "one class");
        assert_eq!(m.roc_auc, 0.5);
        assert_abs_diff_eq!(m.recall, 2.0 / 3.0, epsilon = 1e-12);
    }
}
