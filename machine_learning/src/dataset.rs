use std::{fs, path::Path};

use log::debug;
use ndarray::ArrayView2;
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// A labeled, in-memory dataset.
///
/// Rows are stored contiguously: row `i` owns `xs[i * x_size..(i + 1) * x_size]` and `ys[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x_size: usize,
    xs: Vec<f32>,
    ys: Vec<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `xs` - The flattened feature rows.
    /// * `ys` - One class label per row.
    /// * `x_size` - The amount of features per row.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the buffers don't line up.
    pub fn new(xs: Vec<f32>, ys: Vec<usize>, x_size: usize) -> Result<Self> {
        if x_size == 0 {
            return Err(MlErr::InvalidInput("rows must have at least one feature".into()));
        }

        if xs.len() != ys.len() * x_size {
            return Err(MlErr::SizeMismatch {
                what: "dataset features",
                got: xs.len(),
                expected: ys.len() * x_size,
            });
        }

        Ok(Self { x_size, xs, ys })
    }

    /// Loads a dataset from a comma separated file.
    ///
    /// Each line holds an integer label followed by `x_size` features. Blank lines are skipped
    /// and extra trailing columns are ignored.
    ///
    /// # Arguments
    /// * `path` - The path of the csv file.
    /// * `x_size` - The amount of features to read per row.
    ///
    /// # Returns
    /// The parsed dataset or an error pointing at the offending line.
    pub fn from_csv<P: AsRef<Path>>(path: P, x_size: usize) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let dataset = Self::parse_csv(&content, x_size)?;

        debug!(
            "loaded {} rows of {x_size} features from {}",
            dataset.len(),
            path.as_ref().display()
        );

        Ok(dataset)
    }

    /// Parses the contents of a csv file, see `Dataset::from_csv`.
    pub fn parse_csv(content: &str, x_size: usize) -> Result<Self> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut values = line.split(',').map(str::trim);

            let label = values.next().unwrap_or_default();
            let label = parse_label(label).ok_or_else(|| MlErr::Parse {
                line: i + 1,
                msg: format!("cannot parse '{label}' as a class label"),
            })?;

            let start = xs.len();
            for v in values.take(x_size) {
                let x = v.parse::<f32>().map_err(|_| MlErr::Parse {
                    line: i + 1,
                    msg: format!("cannot parse '{v}' as f32"),
                })?;
                xs.push(x);
            }

            let got = xs.len() - start;
            if got != x_size {
                return Err(MlErr::Parse {
                    line: i + 1,
                    msg: format!("expected {x_size} features after the label, got {got}"),
                });
            }

            ys.push(label);
        }

        if ys.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        Self::new(xs, ys, x_size)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ys.is_empty()
    }

    #[inline]
    pub fn x_size(&self) -> usize {
        self.x_size
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.ys
    }

    /// Returns every feature row as a `(len, x_size)` view.
    pub fn features(&self) -> ArrayView2<'_, f32> {
        // `new` checks that `xs.len() == len * x_size`.
        ArrayView2::from_shape((self.len(), self.x_size), &self.xs).unwrap()
    }

    /// Returns the features of the `i`-th row (panics if out of bounds).
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.xs[i * self.x_size..(i + 1) * self.x_size]
    }

    /// Checks that every label is lower than `num_classes`.
    pub fn validate_labels(&self, num_classes: usize) -> Result<()> {
        match self.ys.iter().position(|&y| y >= num_classes) {
            Some(row) => Err(MlErr::LabelOutOfRange {
                row,
                label: self.ys[row],
                num_classes,
            }),
            None => Ok(()),
        }
    }

    /// Shuffles the rows of the dataset, keeping features and labels together.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        *self = self.select(&order);
    }

    /// Splits the dataset in borrowed batches of at most `batch_size` rows.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, &[usize])> {
        let batch_size = batch_size.max(1);
        let x_size = self.x_size;

        self.xs
            .chunks(batch_size * x_size)
            .zip(self.ys.chunks(batch_size))
            .map(move |(xs, ys)| {
                let x = ArrayView2::from_shape((ys.len(), x_size), xs).unwrap();
                (x, ys)
            })
    }

    /// Randomly splits the dataset into a training and a test partition.
    ///
    /// # Arguments
    /// * `train_size` - The fraction of rows that go to the training partition.
    /// * `rng` - The random number generator that drives the draw.
    /// * `stratify` - Whether to split each class on its own, preserving the class proportions.
    ///
    /// # Returns
    /// A tuple of (train, test) datasets or an error if either would be empty.
    pub fn split<R: Rng>(
        &self,
        train_size: f32,
        rng: &mut R,
        stratify: bool,
    ) -> Result<(Dataset, Dataset)> {
        if !(train_size > 0. && train_size < 1.) {
            return Err(MlErr::InvalidInput(format!(
                "train_size must be in (0, 1), got {train_size}"
            )));
        }

        let (mut train, mut test) = if stratify {
            self.stratified_indices(train_size, rng)
        } else {
            let mut order: Vec<usize> = (0..self.len()).collect();
            order.shuffle(rng);

            let n_train = (train_size * self.len() as f32).floor() as usize;
            let test = order.split_off(n_train);
            (order, test)
        };

        if train.is_empty() || test.is_empty() {
            return Err(MlErr::InvalidSplit {
                train: train.len(),
                test: test.len(),
            });
        }

        train.shuffle(rng);
        test.shuffle(rng);
        Ok((self.select(&train), self.select(&test)))
    }

    fn stratified_indices<R: Rng>(&self, train_size: f32, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
        let num_classes = self.ys.iter().max().map_or(0, |&m| m + 1);
        let mut per_class = vec![Vec::new(); num_classes];
        for (i, &y) in self.ys.iter().enumerate() {
            per_class[y].push(i);
        }

        let sizes: Vec<usize> = per_class.iter().map(Vec::len).collect();
        let n_train = (train_size * self.len() as f32).floor() as usize;
        let counts = allocate_train_counts(&sizes, train_size, n_train);

        let mut train = Vec::with_capacity(n_train);
        let mut test = Vec::with_capacity(self.len() - n_train);

        for (mut indices, n) in per_class.into_iter().zip(counts) {
            indices.shuffle(rng);
            let rest = indices.split_off(n);
            train.extend(indices);
            test.extend(rest);
        }

        (train, test)
    }

    fn select(&self, order: &[usize]) -> Dataset {
        let mut xs = Vec::with_capacity(order.len() * self.x_size);
        let mut ys = Vec::with_capacity(order.len());

        for &i in order {
            xs.extend_from_slice(self.row(i));
            ys.push(self.ys[i]);
        }

        Dataset {
            x_size: self.x_size,
            xs,
            ys,
        }
    }
}

/// Splits `n_train` rows among classes of `sizes` rows, proportionally to `train_size`.
///
/// Every class gets the floor of its share, the remainder goes to the largest fractional parts.
/// Classes with at least two rows keep one of them out of training unless the total can't be
/// reached otherwise.
fn allocate_train_counts(sizes: &[usize], train_size: f32, n_train: usize) -> Vec<usize> {
    let shares: Vec<f32> = sizes.iter().map(|&n| train_size * n as f32).collect();
    let mut counts: Vec<usize> = shares
        .iter()
        .zip(sizes)
        .map(|(&share, &n)| (share.floor() as usize).min(n))
        .collect();

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = shares[a] - counts[a] as f32;
        let fb = shares[b] - counts[b] as f32;
        fb.total_cmp(&fa)
    });

    let mut remaining = n_train.saturating_sub(counts.iter().sum());
    for keep_one in [true, false] {
        loop {
            let before = remaining;
            for &k in &order {
                let cap = if keep_one && sizes[k] > 1 { sizes[k] - 1 } else { sizes[k] };
                if remaining > 0 && counts[k] < cap {
                    counts[k] += 1;
                    remaining -= 1;
                }
            }

            if remaining == 0 || remaining == before {
                break;
            }
        }
    }

    counts
}

fn parse_label(s: &str) -> Option<usize> {
    if let Ok(label) = s.parse::<usize>() {
        return Some(label);
    }

    // numpy writes integer labels as floats when the whole file goes through `savetxt`
    let f = s.parse::<f32>().ok()?;
    (f >= 0. && f.fract() == 0.).then_some(f as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn toy(n: usize) -> Dataset {
        let xs = (0..n * 2).map(|i| i as f32).collect();
        let ys = (0..n).map(|i| i % 3).collect();
        Dataset::new(xs, ys, 2).unwrap()
    }

    #[test]
    fn parse_csv_reads_label_then_features() {
        let csv = "0,0.1,0.2,0.3\n\n2,1.0,2.0,3.0,9.9\n";
        let ds = Dataset::parse_csv(csv, 3).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.labels(), &[0, 2]);
        assert_eq!(ds.row(0), &[0.1, 0.2, 0.3]);
        assert_eq!(ds.row(1), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn parse_csv_accepts_float_labels() {
        let ds = Dataset::parse_csv("4.0,1,2", 2).unwrap();
        assert_eq!(ds.labels(), &[4]);
    }

    #[test]
    fn parse_csv_reports_the_offending_line() {
        let err = Dataset::parse_csv("0,1,2\n1,1,x\n", 2).unwrap_err();
        assert!(matches!(err, MlErr::Parse { line: 2, .. }));

        let err = Dataset::parse_csv("0,1,2\n1,1\n", 2).unwrap_err();
        assert!(matches!(err, MlErr::Parse { line: 2, .. }));

        let err = Dataset::parse_csv("a,1,2\n", 2).unwrap_err();
        assert!(matches!(err, MlErr::Parse { line: 1, .. }));
    }

    #[test]
    fn parse_csv_rejects_empty_files() {
        assert!(matches!(
            Dataset::parse_csv("\n\n", 2),
            Err(MlErr::EmptyDataset)
        ));
    }

    #[test]
    fn validate_labels_finds_out_of_range_rows() {
        let ds = Dataset::new(vec![0.; 6], vec![0, 4, 5], 2).unwrap();
        assert!(ds.validate_labels(6).is_ok());
        assert!(matches!(
            ds.validate_labels(5),
            Err(MlErr::LabelOutOfRange { row: 2, label: 5, .. })
        ));
    }

    #[test]
    fn shuffle_keeps_rows_together() {
        let mut ds = toy(20);
        ds.shuffle(&mut StdRng::seed_from_u64(7));

        for i in 0..ds.len() {
            let row = ds.row(i);
            let original = row[0] as usize / 2;
            assert_eq!(row[1], row[0] + 1.);
            assert_eq!(ds.labels()[i], original % 3);
        }
    }

    #[test]
    fn batches_respect_batch_size() {
        let ds = toy(5);
        let batches: Vec<_> = ds.batches(2).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0.shape(), &[2, 2]);
        assert_eq!(batches[2].0.shape(), &[1, 2]);
        assert_eq!(batches[2].1, &[1]);
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let ds = toy(40);

        let (train, test) = ds.split(0.75, &mut StdRng::seed_from_u64(42), false).unwrap();
        let (train2, test2) = ds.split(0.75, &mut StdRng::seed_from_u64(42), false).unwrap();

        assert_eq!(train.len(), 30);
        assert_eq!(test.len(), 10);
        assert_eq!(train, train2);
        assert_eq!(test, test2);

        let mut seen: Vec<f32> = train
            .features()
            .column(0)
            .iter()
            .chain(test.features().column(0).iter())
            .copied()
            .collect();
        seen.sort_by(f32::total_cmp);
        seen.dedup();
        assert_eq!(seen.len(), 40);
    }

    #[test]
    fn stratified_split_keeps_class_proportions() {
        let ds = toy(60);
        let (train, test) = ds.split(0.75, &mut StdRng::seed_from_u64(42), true).unwrap();

        for class in 0..3 {
            let in_train = train.labels().iter().filter(|&&y| y == class).count();
            let in_test = test.labels().iter().filter(|&&y| y == class).count();
            assert_eq!(in_train, 15);
            assert_eq!(in_test, 5);
        }
    }

    fn classes(num_classes: usize, per_class: usize) -> Dataset {
        let n = num_classes * per_class;
        let xs = (0..n).map(|i| i as f32).collect();
        let ys = (0..n).map(|i| i % num_classes).collect();
        Dataset::new(xs, ys, 1).unwrap()
    }

    #[test]
    fn stratified_split_trains_on_the_floor_of_the_fraction() {
        let (train, test) = classes(5, 3)
            .split(0.75, &mut StdRng::seed_from_u64(42), true)
            .unwrap();

        assert_eq!(train.len(), 11);
        assert_eq!(test.len(), 4);
        for class in 0..5 {
            let in_train = train.labels().iter().filter(|&&y| y == class).count();
            assert!((2..=3).contains(&in_train), "class {class} has {in_train} training rows");
        }
    }

    #[test]
    fn stratified_split_handles_tiny_classes() {
        let (train, test) = classes(5, 2)
            .split(0.75, &mut StdRng::seed_from_u64(42), true)
            .unwrap();

        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);
        for class in 0..5 {
            assert!(train.labels().contains(&class));
        }
    }

    #[test]
    fn train_counts_keep_a_test_row_when_possible() {
        assert_eq!(allocate_train_counts(&[4, 4, 2], 0.5, 5), [2, 2, 1]);
        assert_eq!(allocate_train_counts(&[3, 3, 3, 3, 3], 0.75, 11), [3, 2, 2, 2, 2]);
        assert_eq!(allocate_train_counts(&[10, 1], 0.75, 8), [7, 1]);
    }

    #[test]
    fn split_rejects_empty_partitions() {
        let ds = toy(2);
        assert!(matches!(
            ds.split(0.4, &mut StdRng::seed_from_u64(0), false),
            Err(MlErr::InvalidSplit { train: 0, test: 2 })
        ));
        assert!(ds.split(1.0, &mut StdRng::seed_from_u64(0), false).is_err());
    }
}
