//! Binary classification metrics for held-out evaluation
//!
//! Division by zero in precision/recall/f1 yields 0 rather than an error.

use serde::{Deserialize, Serialize};

/// Precision, recall, f1 and support for one class (or an average)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// `[[tn, fp], [fn, tp]]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix(pub [[usize; 2]; 2]);

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[u8], predicted: &[u8]) -> Self {
        let mut cells = [[0usize; 2]; 2];
        for (&t, &p) in truth.iter().zip(predicted) {
            cells[usize::from(t.min(1))][usize::from(p.min(1))] += 1;
        }
        Self(cells)
    }

    pub fn true_negatives(&self) -> usize {
        self.0[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.0[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.0[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.0[1][1]
    }

    pub fn total(&self) -> usize {
        self.0.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Index 0 is the negative class, index 1 the positive class
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let per_class = |class: usize| {
            let other = 1 - class;
            let tp = cm.0[class][class] as f64;
            let fp = cm.0[other][class] as f64;
            let fn_ = cm.0[class][other] as f64;
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_);
            ClassMetrics {
                precision,
                recall,
                f1_score: ratio(2.0 * precision * recall, precision + recall),
                support: cm.0[class][0] + cm.0[class][1],
            }
        };
        let classes = [per_class(0), per_class(1)];
        let total = cm.total();

        let macro_avg = ClassMetrics {
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1_score: (classes[0].f1_score + classes[1].f1_score) / 2.0,
            support: total,
        };

        let weight = |f: fn(&ClassMetrics) -> f64| {
            ratio(
                classes.iter().map(|c| f(c) * c.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|c: &ClassMetrics| c.precision),
            recall: weight(|c: &ClassMetrics| c.recall),
            f1_score: weight(|c: &ClassMetrics| c.f1_score),
            support: total,
        };

        Self {
            classes,
            accuracy: ratio(
                (cm.true_negatives() + cm.true_positives()) as f64,
                total as f64,
            ),
            macro_avg,
            weighted_avg,
        }
    }
}

/// One operating point on the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied scores receive their average rank. Returns `None` when `truth`
/// holds a single class.
pub fn roc_auc(truth: &[u8], scores: &[f64]) -> Option<f64> {
    let n = truth.len().min(scores.len());
    let n_pos = truth[..n].iter().filter(|&&t| t == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; ties share the mean of their span
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if truth[idx] == 1 {
                positive_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// ROC operating points from the highest threshold down.
///
/// The first point is `(0, 0)` at an infinite threshold. Empty when
/// `truth` holds a single class.
pub fn roc_curve(truth: &[u8], scores: &[f64]) -> Vec<RocPoint> {
    let n = truth.len().min(scores.len());
    let n_pos = truth[..n].iter().filter(|&&t| t == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &idx) in order.iter().enumerate() {
        if truth[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_tie {
            points.push(RocPoint {
                fpr: fp as f64 / n_neg as f64,
                tpr: tp as f64 / n_pos as f64,
                threshold: scores[idx],
            });
        }
    }
    points
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_layout() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 1], &[0, 1, 0, 1, 1]);
        assert_eq!(cm.0, [[1, 1], [1, 2]]);
        assert_eq!(cm.total(), 5);
    }

    #[test]
    fn test_report_values() {
        let cm = ConfusionMatrix([[1, 1], [1, 2]]);
        let report = ClassificationReport::from_confusion(&cm);

        assert!((report.classes[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.classes[1].recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.classes[0].precision, 0.5);
        assert_eq!(report.classes[0].support, 2);
        assert_eq!(report.classes[1].support, 3);
        assert_eq!(report.accuracy, 0.6);
        let expected_weighted = (0.5 * 2.0 + 2.0 / 3.0 * 3.0) / 5.0;
        assert!((report.weighted_avg.precision - expected_weighted).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_gives_zero() {
        // Never predicts positive, and no positives exist
        let cm = ConfusionMatrix([[4, 0], [0, 0]]);
        let report = ClassificationReport::from_confusion(&cm);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].recall, 0.0);
        assert_eq!(report.classes[1].f1_score, 0.0);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_roc_auc() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class_is_none() {
        assert_eq!(roc_auc(&[1, 1, 1], &[0.2, 0.4, 0.9]), None);
        assert_eq!(roc_auc(&[], &[]), None);
        assert!(roc_curve(&[0, 0], &[0.1, 0.2]).is_empty());
    }

    #[test]
    fn test_roc_curve_endpoints() {
        let points = roc_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);
        assert_eq!(points.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(points.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
        assert_eq!(points.len(), 5);
    }
}
