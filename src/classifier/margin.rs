//! Linear soft-margin SVM with calibrated probabilities
//!
//! The dual is solved by SMO with a linear kernel and collapsed into a
//! primal weight vector, so prediction costs one dot product. Scores are
//! mapped to probabilities with a single-slope sigmoid, `p1 = sigmoid(A * f(x))`.
//! The slope is fitted on the training scores against Platt's smoothed
//! targets with the intercept pinned at zero, which keeps the decision
//! boundary at exactly 0.5.

use crate::core::{BinaryClassifier, ClassifierError, Label, Result, Sample, TrainingControl};
use crate::kernel::{dot, LinearKernel};
use crate::solver::{SmoConfig, SmoSolver};
use crate::utils::scaling::FeatureScaler;
use crate::utils::validation::{check_dimension, check_label_balance, validate_training_set};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_SLOPE: f64 = 1e-3;
const MAX_SLOPE: f64 = 1e3;
const NEWTON_ITERATIONS: usize = 100;

/// SVM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginParams {
    /// Regularization parameter
    pub c: f64,
    /// KKT tolerance for the solver
    pub tolerance: f64,
    /// Cap on solver passes
    pub max_iterations: usize,
    /// Kernel rows kept in the solver's LRU cache
    pub kernel_cache_rows: usize,
    /// Standardize features before solving
    pub standardize: bool,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tolerance: 1e-3,
            max_iterations: 1000,
            kernel_cache_rows: 512,
            standardize: true,
        }
    }
}

impl MarginParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    fn solver_config(&self) -> SmoConfig {
        SmoConfig {
            c: self.c,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            cache_rows: self.kernel_cache_rows,
            ..SmoConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedMargin {
    /// Primal weights in the (possibly standardized) feature space
    weights: Vec<f64>,
    bias: f64,
    scaler: Option<FeatureScaler>,
    calibration_slope: f64,
    n_support_vectors: usize,
    converged: bool,
}

/// Linear SVM classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    params: MarginParams,
    state: Option<FittedMargin>,
}

impl LinearSvm {
    pub fn new(params: MarginParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &MarginParams {
        &self.params
    }

    fn fitted(&self) -> Result<&FittedMargin> {
        self.state.as_ref().ok_or(ClassifierError::UntrainedModel)
    }

    /// Signed distance-like score; the boundary is at 0
    pub fn decision_function(&self, features: &[f64]) -> Result<f64> {
        let state = self.fitted()?;
        check_dimension(features, state.weights.len())?;
        Ok(match &state.scaler {
            Some(scaler) => dot(&state.weights, &scaler.transform(features)?) + state.bias,
            None => dot(&state.weights, features) + state.bias,
        })
    }

    /// Probability of the positive class for a decision score
    pub fn score_probability(&self, score: f64) -> Result<f64> {
        Ok(sigmoid(self.fitted()?.calibration_slope * score))
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.weights.as_slice())
    }

    pub fn bias(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.bias)
    }

    pub fn calibration_slope(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.calibration_slope)
    }

    pub fn n_support_vectors(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.n_support_vectors)
    }

    /// Whether the solver met its tolerance before the pass cap
    pub fn converged(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.converged)
    }

    /// Input width of the fitted model
    pub fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.weights.len())
    }

    /// Check the fitted parameters, typically ones read from disk
    pub fn verify(&self) -> Result<()> {
        let corrupt = |msg: &str| Err(ClassifierError::CorruptModel(msg.to_string()));
        let state = self.fitted()?;

        if state.weights.is_empty() {
            return corrupt("linear model has no weights");
        }
        if !state.bias.is_finite() || state.weights.iter().any(|w| !w.is_finite()) {
            return corrupt("non-finite weights or bias");
        }
        if !(state.calibration_slope.is_finite() && state.calibration_slope > 0.0) {
            return corrupt("calibration slope must be positive");
        }
        if let Some(scaler) = &state.scaler {
            if scaler.dim() != state.weights.len() || scaler.scales.len() != scaler.dim() {
                return corrupt("scaler width does not match the weights");
            }
            let usable = scaler.means.iter().all(|m| m.is_finite())
                && scaler.scales.iter().all(|s| s.is_finite() && *s > 0.0);
            if !usable {
                return corrupt("invalid scaler statistics");
            }
        }
        Ok(())
    }
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new(MarginParams::default())
    }
}

impl BinaryClassifier for LinearSvm {
    fn fit(&mut self, samples: &[Sample], control: &TrainingControl) -> Result<()> {
        validate_training_set(samples)?;
        let (negative, positive, _) = check_label_balance(samples);
        if negative == 0 || positive == 0 {
            return Err(ClassifierError::Dataset(
                "margin classifier needs samples of both classes".to_string(),
            ));
        }

        let scaler = if self.params.standardize {
            Some(FeatureScaler::fit(samples)?)
        } else {
            None
        };
        let points = samples
            .iter()
            .map(|s| match &scaler {
                Some(scaler) => scaler.transform(&s.features),
                None => Ok(s.features.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        let targets: Vec<f64> = samples.iter().map(|s| s.label.sign()).collect();

        let solver = SmoSolver::new(Arc::new(LinearKernel::new()), self.params.solver_config());
        let result = solver.solve(&points, &targets, control)?;

        let mut weights = vec![0.0; points[0].len()];
        for &i in &result.support_vectors {
            let coef = result.alpha[i] * targets[i];
            for (w, x) in weights.iter_mut().zip(&points[i]) {
                *w += coef * x;
            }
        }

        let scores: Vec<f64> = points.iter().map(|x| dot(&weights, x) + result.b).collect();
        let calibration_slope = fit_slope(&scores, samples, negative, positive);

        debug!(
            "Linear SVM fitted: {} support vectors, bias {:.6}, slope {:.4}",
            result.support_vectors.len(),
            result.b,
            calibration_slope
        );

        self.state = Some(FittedMargin {
            weights,
            bias: result.b,
            scaler,
            calibration_slope,
            n_support_vectors: result.support_vectors.len(),
            converged: result.converged,
        });
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        let p1 = self.score_probability(self.decision_function(features)?)?;
        Ok([1.0 - p1, p1])
    }

    fn predict_label(&self, features: &[f64]) -> Result<Label> {
        Ok(if self.decision_function(features)? >= 0.0 {
            Label::Positive
        } else {
            Label::Negative
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + e^x) without overflow
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Negative log-likelihood of slope `a` against smoothed targets
fn calibration_loss(a: f64, scores: &[f64], targets: &[f64]) -> f64 {
    scores
        .iter()
        .zip(targets)
        .map(|(&s, &t)| t * softplus(-a * s) + (1.0 - t) * softplus(a * s))
        .sum()
}

/// Fit the sigmoid slope by damped Newton iterations, clamped to a positive range
fn fit_slope(scores: &[f64], samples: &[Sample], negative: usize, positive: usize) -> f64 {
    let hi_target = (positive as f64 + 1.0) / (positive as f64 + 2.0);
    let lo_target = 1.0 / (negative as f64 + 2.0);
    let targets: Vec<f64> = samples
        .iter()
        .map(|s| match s.label {
            Label::Positive => hi_target,
            Label::Negative => lo_target,
        })
        .collect();

    if scores.iter().all(|&s| s == 0.0) {
        return 1.0;
    }

    let mut a = 1.0;
    let mut loss = calibration_loss(a, scores, &targets);

    for _ in 0..NEWTON_ITERATIONS {
        let mut gradient = 0.0;
        let mut hessian = 0.0;
        for (&s, &t) in scores.iter().zip(&targets) {
            let p = sigmoid(a * s);
            gradient += (p - t) * s;
            hessian += p * (1.0 - p) * s * s;
        }
        if gradient.abs() < 1e-10 {
            break;
        }

        let step = if hessian > 1e-12 {
            gradient / hessian
        } else {
            gradient.signum()
        };

        let mut scale = 1.0;
        let mut improved = false;
        while scale > 1e-8 {
            let candidate = (a - scale * step).clamp(MIN_SLOPE, MAX_SLOPE);
            let candidate_loss = calibration_loss(candidate, scores, &targets);
            if candidate_loss < loss {
                a = candidate;
                loss = candidate_loss;
                improved = true;
                break;
            }
            scale /= 2.0;
        }
        if !improved {
            break;
        }
    }

    a
}
