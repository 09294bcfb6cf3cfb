//! Deterministic stratified train/test partitioning

use crate::core::{ClassifierError, Dataset, Label, Result};
use serde::{Deserialize, Serialize};

/// Test fraction and seed for [`stratified_split`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 2,
        }
    }
}

/// Disjoint, sorted index sets covering the whole dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Small linear congruential generator; the sequence is fixed for a seed
/// across platforms and toolchain versions.
struct LcgRng {
    state: u64,
}

impl LcgRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn next_bounded(&mut self, bound: u64) -> u64 {
        // high bits have the longest period
        (self.next_u64() >> 33) % bound
    }

    /// Fisher-Yates shuffle
    fn shuffle(&mut self, indices: &mut [usize]) {
        for i in (1..indices.len()).rev() {
            let j = self.next_bounded((i + 1) as u64) as usize;
            indices.swap(i, j);
        }
    }
}

/// Number of test samples for a class of size `n`.
///
/// Rounds to nearest; an exact half goes to the training partition. At
/// least one sample of a non-empty class always stays in training.
fn test_count(n: usize, test_fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let exact = n as f64 * test_fraction;
    let floor = exact.floor();
    let count = if exact - floor > 0.5 + 1e-9 {
        floor as usize + 1
    } else {
        floor as usize
    };
    count.min(n - 1)
}

/// Partition `dataset` into train and test sets preserving class proportions
pub fn stratified_split<D: Dataset + ?Sized>(
    dataset: &D,
    test_fraction: f64,
    seed: u64,
) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ClassifierError::InvalidParameter(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if dataset.is_empty() {
        return Err(ClassifierError::EmptyDataset);
    }

    let labels = dataset.get_labels();
    let mut rng = LcgRng::new(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [Label::Negative, Label::Positive] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();

        rng.shuffle(&mut members);
        let n_test = test_count(members.len(), test_fraction);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}
