//! Classification metrics.

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
};

use ndarray::{Array2, ArrayView2};

use crate::{MlErr, Result};

/// The fraction of predictions equal to their true label, `0` for empty inputs.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f32> {
    check_lengths(y_true, y_pred)?;

    if y_true.is_empty() {
        return Ok(0.);
    }

    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(hits as f32 / y_true.len() as f32)
}

/// The index of the largest value, the first one on ties and `0` when `values` is empty.
pub fn argmax(values: &[f32]) -> usize {
    first_max(values.iter().copied())
}

/// The index of the largest value of every row, the first one on ties.
pub fn argmax_rows(y: ArrayView2<f32>) -> Vec<usize> {
    y.rows()
        .into_iter()
        .map(|row| first_max(row.iter().copied()))
        .collect()
}

fn first_max<I: IntoIterator<Item = f32>>(values: I) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}

fn check_lengths(y_true: &[usize], y_pred: &[usize]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(MlErr::SizeMismatch {
            what: "predictions",
            got: y_pred.len(),
            expected: y_true.len(),
        });
    }

    Ok(())
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 { 0. } else { num as f32 / den as f32 }
}

/// Counts of (true label, predicted label) pairs.
///
/// Rows and columns follow the sorted set of true labels; predictions outside of it are not
/// counted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    labels: Vec<usize>,
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let labels: Vec<usize> = y_true.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let mut counts = Array2::zeros((labels.len(), labels.len()));

        for (t, p) in y_true.iter().zip(y_pred) {
            if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
                counts[(i, j)] += 1;
            }
        }

        Ok(Self { labels, counts })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// The counts, true labels along the rows and predictions along the columns.
    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// How many samples of class `actual` were predicted as `predicted`.
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        match (self.labels.binary_search(&actual), self.labels.binary_search(&predicted)) {
            (Ok(i), Ok(j)) => self.counts[(i, j)],
            _ => 0,
        }
    }
}

impl Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .map(|c| c.to_string().len())
            .chain(self.labels.iter().map(|l| l.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        write!(f, "{:>width$}", "true\\pred", width = 9)?;
        for label in &self.labels {
            write!(f, " {label:>width$}")?;
        }

        for (label, row) in self.labels.iter().zip(self.counts.rows()) {
            write!(f, "\n{label:>9}")?;
            for count in row {
                write!(f, " {count:>width$}")?;
            }
        }

        Ok(())
    }
}

/// Precision, recall and f1 of a single class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub label: usize,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Averages of the per class metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Averages {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Per class precision, recall, f1 and support, plus their averages.
///
/// Classes are the sorted union of true and predicted labels. Zero denominators yield `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    classes: Vec<ClassMetrics>,
    accuracy: f32,
    macro_avg: Averages,
    weighted_avg: Averages,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let labels: BTreeSet<usize> = y_true.iter().chain(y_pred).copied().collect();
        let classes: Vec<ClassMetrics> = labels
            .into_iter()
            .map(|label| {
                let tp = y_true
                    .iter()
                    .zip(y_pred)
                    .filter(|&(&t, &p)| t == label && p == label)
                    .count();
                let support = y_true.iter().filter(|&&t| t == label).count();
                let predicted = y_pred.iter().filter(|&&p| p == label).count();

                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0. {
                    0.
                } else {
                    2. * precision * recall / (precision + recall)
                };

                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let total = y_true.len();
        let n = classes.len().max(1) as f32;
        let macro_avg = Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f32>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f32>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f32>() / n,
            support: total,
        };

        let weighted = |metric: fn(&ClassMetrics) -> f32| {
            let sum: f32 = classes.iter().map(|c| metric(c) * c.support as f32).sum();
            if total == 0 { 0. } else { sum / total as f32 }
        };
        let weighted_avg = Averages {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Ok(Self {
            accuracy: accuracy(y_true, y_pred)?,
            classes,
            macro_avg,
            weighted_avg,
        })
    }

    pub fn classes(&self) -> &[ClassMetrics] {
        &self.classes
    }

    pub fn accuracy(&self) -> f32 {
        self.accuracy
    }

    pub fn macro_avg(&self) -> Averages {
        self.macro_avg
    }

    pub fn weighted_avg(&self) -> Averages {
        self.weighted_avg
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = 12;

        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;

        for c in &self.classes {
            writeln!(
                f,
                "{:>WIDTH$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;

        for (name, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            writeln!(
                f,
                "{name:>WIDTH$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_counts_hits() {
        assert_eq!(accuracy(&[0, 1, 2, 2], &[0, 2, 2, 2]).unwrap(), 0.75);
        assert_eq!(accuracy(&[], &[]).unwrap(), 0.);
        assert!(accuracy(&[0], &[]).is_err());
    }

    #[test]
    fn argmax_of_a_slice() {
        assert_eq!(argmax(&[0.1, 0.6, 0.3]), 1);
        assert_eq!(argmax(&[0.4, 0.4]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn argmax_picks_the_first_maximum() {
        let y = array![[0.1, 0.7, 0.2], [0.5, 0.5, 0.], [0., 0., 1.]];
        assert_eq!(argmax_rows(y.view()), [1, 0, 2]);
    }

    #[test]
    fn confusion_matrix_follows_the_true_labels() {
        let cm = ConfusionMatrix::new(&[0, 0, 1, 2, 2, 2], &[0, 1, 1, 2, 0, 3]).unwrap();

        assert_eq!(cm.labels(), [0, 1, 2]);
        assert_eq!(cm.counts(), &array![[1, 1, 0], [0, 1, 0], [1, 0, 1]]);
        assert_eq!(cm.get(2, 0), 1);
        assert_eq!(cm.get(2, 3), 0);
    }

    #[test]
    fn confusion_matrix_renders_a_table() {
        let cm = ConfusionMatrix::new(&[0, 1, 1], &[0, 1, 0]).unwrap();
        let expected = "true\\pred    0    1\n        0    1    0\n        1    1    1";
        assert_eq!(cm.to_string(), expected);
    }

    #[test]
    fn report_metrics() {
        let report = ClassificationReport::new(&[0, 0, 1, 1], &[0, 1, 1, 1]).unwrap();
        let [zero, one] = report.classes() else {
            panic!("expected two classes");
        };

        assert_eq!((zero.precision, zero.recall, zero.support), (1., 0.5, 2));
        assert!((zero.f1 - 2. / 3.).abs() < 1e-6);
        assert!((one.precision - 2. / 3.).abs() < 1e-6);
        assert_eq!(one.recall, 1.);
        assert_eq!(report.accuracy(), 0.75);
        assert_eq!(report.weighted_avg().support, 4);
    }

    #[test]
    fn report_zero_division_is_zero() {
        let report = ClassificationReport::new(&[0, 0], &[1, 1]).unwrap();
        let one = report.classes()[1];

        assert_eq!(one.label, 1);
        assert_eq!((one.precision, one.recall, one.f1, one.support), (0., 0., 0., 0));
    }

    #[test]
    fn report_renders_like_the_usual_layout() {
        let report = ClassificationReport::new(&[0, 1], &[0, 1]).unwrap();
        let expected = concat!(
            "              precision    recall  f1-score   support\n",
            "\n",
            "           0       1.00      1.00      1.00         1\n",
            "           1       1.00      1.00      1.00         1\n",
            "\n",
            "    accuracy                           1.00         2\n",
            "   macro avg       1.00      1.00      1.00         2\n",
            "weighted avg       1.00      1.00      1.00         2\n",
        );
        assert_eq!(report.to_string(), expected);
    }
}
