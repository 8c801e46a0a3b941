use std::collections::BTreeMap;

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::{MlErr, Result, dataset::Dataset};

/// A classifier voting among the `k` nearest training samples, by euclidean distance.
#[derive(Debug, Clone)]
pub struct KNeighborsClassifier {
    k: usize,
    train: Option<Dataset>,
}

impl KNeighborsClassifier {
    /// Creates a new unfitted `KNeighborsClassifier`.
    ///
    /// # Arguments
    /// * `k` - The amount of neighbors that vote, at least one.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(MlErr::InvalidInput("k must be at least one".into()));
        }

        Ok(Self { k, train: None })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Memorizes the training set.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        if dataset.len() < self.k {
            return Err(MlErr::InvalidInput(format!(
                "cannot look for {} neighbors among {} samples",
                self.k,
                dataset.len()
            )));
        }

        self.train = Some(dataset.clone());
        Ok(())
    }

    /// Predicts the label of every row of `x`. Rows are classified in parallel.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Vec<usize>> {
        let train = self.train.as_ref().ok_or(MlErr::NotFitted)?;

        if x.ncols() != train.x_size() {
            return Err(MlErr::SizeMismatch {
                what: "input features",
                got: x.ncols(),
                expected: train.x_size(),
            });
        }

        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| self.vote(train, x.row(i)))
            .collect())
    }

    fn vote(&self, train: &Dataset, query: ArrayView1<f32>) -> usize {
        let mut distances: Vec<(f32, usize)> = (0..train.len())
            .map(|i| {
                let d = train
                    .row(i)
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (d, i)
            })
            .collect();

        let by_distance = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if self.k < distances.len() {
            distances.select_nth_unstable_by(self.k - 1, by_distance);
            distances.truncate(self.k);
        }

        let labels = train.labels();
        let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
        for &(_, i) in &distances {
            *votes.entry(labels[i]).or_default() += 1;
        }

        // ascending labels, so the smallest one wins a tie
        let mut best = (0, 0);
        for (label, count) in votes {
            if count > best.1 {
                best = (label, count);
            }
        }

        best.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dataset() -> Dataset {
        Dataset::new(
            vec![0., 0., 0., 1., 1., 0., 10., 10., 10., 11., 11., 10.],
            vec![0, 0, 0, 1, 1, 1],
            2,
        )
        .unwrap()
    }

    #[test]
    fn predicting_before_fitting_fails() {
        let knn = KNeighborsClassifier::new(1).unwrap();
        assert!(matches!(knn.predict(array![[0., 0.]].view()), Err(MlErr::NotFitted)));
    }

    #[test]
    fn k_must_fit_in_the_training_set() {
        assert!(KNeighborsClassifier::new(0).is_err());

        let mut knn = KNeighborsClassifier::new(7).unwrap();
        assert!(knn.fit(&dataset()).is_err());
    }

    #[test]
    fn one_neighbor_returns_the_training_labels() {
        let dataset = dataset();
        let mut knn = KNeighborsClassifier::new(1).unwrap();
        knn.fit(&dataset).unwrap();

        assert_eq!(knn.predict(dataset.features()).unwrap(), dataset.labels());
    }

    #[test]
    fn the_majority_wins() {
        let mut knn = KNeighborsClassifier::new(3).unwrap();
        knn.fit(&dataset()).unwrap();

        let y = knn.predict(array![[0.5, 0.5], [9., 9.]].view()).unwrap();
        assert_eq!(y, [0, 1]);
    }

    #[test]
    fn ties_go_to_the_smallest_label() {
        let dataset = Dataset::new(vec![-1., 1.], vec![3, 2], 1).unwrap();
        let mut knn = KNeighborsClassifier::new(2).unwrap();
        knn.fit(&dataset).unwrap();

        assert_eq!(knn.predict(array![[0.]].view()).unwrap(), [2]);
    }

    #[test]
    fn wrong_feature_counts_are_rejected() {
        let mut knn = KNeighborsClassifier::new(1).unwrap();
        knn.fit(&dataset()).unwrap();

        assert!(knn.predict(array![[0., 0., 0.]].view()).is_err());
    }
}
