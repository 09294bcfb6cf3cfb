//! Sequential Minimal Optimization (SMO) solver implementation
//!
//! Solves the soft-margin SVM dual by repeatedly optimizing pairs of
//! Lagrange multipliers analytically. The outer loop alternates between
//! sweeps over all samples and sweeps over the non-bound ones (0 < alpha < C),
//! choosing the second multiplier by the largest |E1 - E2| first.

use crate::cache::KernelCache;
use crate::core::{ClassifierError, OptimizationResult, Result, TrainingControl};
use crate::kernel::Kernel;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Numerical settings for [`SmoSolver`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoConfig {
    /// Regularization parameter (upper bound on every alpha)
    pub c: f64,
    /// KKT violation tolerance
    pub tolerance: f64,
    /// Minimum relative change for an alpha update to count
    pub epsilon: f64,
    /// Cap on outer passes
    pub max_iterations: usize,
    /// Kernel rows kept in the LRU cache
    pub cache_rows: usize,
}

impl Default for SmoConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            tolerance: 1e-3,
            epsilon: 1e-8,
            max_iterations: 1000,
            cache_rows: 512,
        }
    }
}

/// SMO solver for SVM optimization
pub struct SmoSolver<K: Kernel> {
    kernel: Arc<K>,
    config: SmoConfig,
}

/// Mutable state of one optimization run
struct Problem<'a> {
    points: &'a [Vec<f64>],
    targets: &'a [f64],
    alpha: Vec<f64>,
    /// E_i = f(x_i) - y_i with f(x) = sum(alpha_j y_j K(x_j, x)) + b
    errors: Vec<f64>,
    b: f64,
    cache: KernelCache,
    /// Rotating start index for the fallback sweeps
    rotation: usize,
}

impl<'a> Problem<'a> {
    fn is_non_bound(&self, i: usize, c: f64) -> bool {
        self.alpha[i] > 0.0 && self.alpha[i] < c
    }
}

impl<K: Kernel> SmoSolver<K> {
    /// Create a new SMO solver with the given kernel and configuration
    pub fn new(kernel: Arc<K>, config: SmoConfig) -> Self {
        Self { kernel, config }
    }

    pub fn config(&self) -> &SmoConfig {
        &self.config
    }

    /// Solve the dual problem for `points` with targets in {-1, +1}.
    ///
    /// `control` is checked once per outer pass; a cancelled or expired run
    /// returns `Cancelled` or `TimedOut` and discards the partial solution.
    pub fn solve(
        &self,
        points: &[Vec<f64>],
        targets: &[f64],
        control: &TrainingControl,
    ) -> Result<OptimizationResult> {
        self.validate(points, targets)?;

        let n = points.len();
        let mut problem = Problem {
            points,
            targets,
            alpha: vec![0.0; n],
            errors: targets.iter().map(|y| -y).collect(),
            b: 0.0,
            cache: KernelCache::new(self.config.cache_rows.min(n)),
            rotation: 0,
        };

        let mut iterations = 0;
        let mut num_changed = 0;
        let mut examine_all = true;

        while num_changed > 0 || examine_all {
            if iterations >= self.config.max_iterations {
                break;
            }
            control.checkpoint()?;
            num_changed = 0;

            for i in 0..n {
                if (examine_all || problem.is_non_bound(i, self.config.c))
                    && self.examine_example(i, &mut problem)
                {
                    num_changed += 1;
                }
            }

            if examine_all {
                examine_all = false;
            } else if num_changed == 0 {
                examine_all = true;
            }
            iterations += 1;
        }

        let converged = num_changed == 0 && !examine_all;
        if !converged {
            warn!(
                "SMO stopped after {} passes without meeting tolerance {}",
                iterations, self.config.tolerance
            );
        }

        let support_vectors: Vec<usize> = problem
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 0.0)
            .map(|(i, _)| i)
            .collect();

        debug!(
            "SMO finished: {} passes, {} support vectors, cache hit rate {:.2}",
            iterations,
            support_vectors.len(),
            problem.cache.hit_rate()
        );

        Ok(OptimizationResult {
            alpha: problem.alpha,
            b: problem.b,
            support_vectors,
            iterations,
            converged,
        })
    }

    fn validate(&self, points: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        if points.is_empty() {
            return Err(ClassifierError::EmptyDataset);
        }
        if points.len() != targets.len() {
            return Err(ClassifierError::DimensionMismatch {
                expected: points.len(),
                actual: targets.len(),
            });
        }
        if let Some(&bad) = targets.iter().find(|&&y| y != 1.0 && y != -1.0) {
            return Err(ClassifierError::InvalidParameter(format!(
                "SMO targets must be -1 or +1, got {bad}"
            )));
        }
        if !(self.config.c > 0.0 && self.config.c.is_finite()) {
            return Err(ClassifierError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.config.c
            )));
        }
        Ok(())
    }

    /// Try to make progress on multiplier `i2`
    fn examine_example(&self, i2: usize, problem: &mut Problem<'_>) -> bool {
        let c = self.config.c;
        let y2 = problem.targets[i2];
        let alpha2 = problem.alpha[i2];
        let e2 = problem.errors[i2];
        let r2 = e2 * y2;

        let violates = (r2 < -self.config.tolerance && alpha2 < c)
            || (r2 > self.config.tolerance && alpha2 > 0.0);
        if !violates {
            return false;
        }

        let n = problem.points.len();
        let non_bound = (0..n).filter(|&i| problem.is_non_bound(i, c)).count();

        if non_bound > 1 {
            if let Some(i1) = self.select_second_variable(i2, e2, problem) {
                if self.take_step(i1, i2, problem) {
                    return true;
                }
            }
        }

        problem.rotation = (problem.rotation + 1) % n;
        let start = problem.rotation;

        for offset in 0..n {
            let i1 = (start + offset) % n;
            if problem.is_non_bound(i1, c) && self.take_step(i1, i2, problem) {
                return true;
            }
        }

        for offset in 0..n {
            let i1 = (start + offset) % n;
            if self.take_step(i1, i2, problem) {
                return true;
            }
        }

        false
    }

    /// Second-choice heuristic: maximum |E1 - E2| over non-bound multipliers
    fn select_second_variable(&self, i2: usize, e2: f64, problem: &Problem<'_>) -> Option<usize> {
        let mut best = None;
        let mut max_diff = 0.0;

        for i1 in 0..problem.points.len() {
            if i1 == i2 || !problem.is_non_bound(i1, self.config.c) {
                continue;
            }
            let diff = (problem.errors[i1] - e2).abs();
            if diff > max_diff {
                max_diff = diff;
                best = Some(i1);
            }
        }

        best
    }

    /// Jointly optimize multipliers `i1` and `i2`
    fn take_step(&self, i1: usize, i2: usize, problem: &mut Problem<'_>) -> bool {
        if i1 == i2 {
            return false;
        }

        let c = self.config.c;
        let eps = self.config.epsilon;
        let y1 = problem.targets[i1];
        let y2 = problem.targets[i2];
        let alpha1 = problem.alpha[i1];
        let alpha2 = problem.alpha[i2];
        let e1 = problem.errors[i1];
        let e2 = problem.errors[i2];
        let s = y1 * y2;

        let (low, high) = if y1 != y2 {
            ((alpha2 - alpha1).max(0.0), (c + alpha2 - alpha1).min(c))
        } else {
            ((alpha1 + alpha2 - c).max(0.0), (alpha1 + alpha2).min(c))
        };
        if low >= high {
            return false;
        }

        let row1 = problem
            .cache
            .row(self.kernel.as_ref(), problem.points, i1);
        let row2 = problem
            .cache
            .row(self.kernel.as_ref(), problem.points, i2);
        let k11 = row1[i1];
        let k12 = row1[i2];
        let k22 = row2[i2];

        let eta = k11 + k22 - 2.0 * k12;
        if eta <= 0.0 {
            // Degenerate pair (duplicate points); leave it to another partner
            return false;
        }

        let a2 = (alpha2 + y2 * (e1 - e2) / eta).clamp(low, high);
        if (a2 - alpha2).abs() < eps * (a2 + alpha2 + eps) {
            return false;
        }
        let a1 = alpha1 + s * (alpha2 - a2);

        let delta1 = y1 * (a1 - alpha1);
        let delta2 = y2 * (a2 - alpha2);

        let b1 = problem.b - e1 - delta1 * k11 - delta2 * k12;
        let b2 = problem.b - e2 - delta1 * k12 - delta2 * k22;
        let b_new = if a1 > 0.0 && a1 < c {
            b1
        } else if a2 > 0.0 && a2 < c {
            b2
        } else {
            (b1 + b2) / 2.0
        };
        let delta_b = b_new - problem.b;

        for (k, error) in problem.errors.iter_mut().enumerate() {
            *error += delta1 * row1[k] + delta2 * row2[k] + delta_b;
        }

        problem.alpha[i1] = a1;
        problem.alpha[i2] = a2;
        problem.b = b_new;
        true
    }
}
