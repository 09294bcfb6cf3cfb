//! Impurity-based decision tree
//!
//! Nodes live in a flat arena and refer to their children by index. Each
//! split sends `x[feature] <= threshold` to the left child.

use crate::core::{BinaryClassifier, ClassifierError, Label, Result, Sample, TrainingControl};
use crate::utils::validation::{check_dimension, validate_training_set};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum weighted impurity decrease for a split to be taken
const MIN_DECREASE: f64 = 1e-12;

/// Node impurity measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Entropy,
    Gini,
}

impl Criterion {
    /// Impurity of a node with the given `[negative, positive]` counts
    pub fn impurity(self, counts: [usize; 2]) -> f64 {
        let n = (counts[0] + counts[1]) as f64;
        if n == 0.0 {
            return 0.0;
        }
        let p = [counts[0] as f64 / n, counts[1] as f64 / n];
        match self {
            Criterion::Entropy => p
                .iter()
                .filter(|&&q| q > 0.0)
                .map(|&q| -q * q.log2())
                .sum(),
            Criterion::Gini => 1.0 - p.iter().map(|q| q * q).sum::<f64>(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Entropy => write!(f, "entropy"),
            Criterion::Gini => write!(f, "gini"),
        }
    }
}

impl std::str::FromStr for Criterion {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "entropy" => Ok(Criterion::Entropy),
            "gini" => Ok(Criterion::Gini),
            other => Err(ClassifierError::InvalidParameter(format!(
                "unknown criterion '{other}' (expected entropy or gini)"
            ))),
        }
    }
}

/// Tree hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub criterion: Criterion,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 5,
            criterion: Criterion::Entropy,
        }
    }
}

impl TreeParams {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(ClassifierError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ClassifierError::InvalidParameter(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        impurity: f64,
        n_samples: usize,
    },
    Leaf {
        counts: [usize; 2],
        impurity: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedTree {
    n_features: usize,
    /// Root is node 0
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

/// Binary decision tree classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    state: Option<FittedTree>,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    fn fitted(&self) -> Result<&FittedTree> {
        self.state.as_ref().ok_or(ClassifierError::UntrainedModel)
    }

    /// Nodes in arena order, root first
    pub fn nodes(&self) -> Option<&[TreeNode]> {
        self.state.as_ref().map(|s| s.nodes.as_slice())
    }

    /// Feature index and threshold of the root split, if the root is not a leaf
    pub fn root_split(&self) -> Option<(usize, f64)> {
        match self.nodes()?.first()? {
            TreeNode::Split {
                feature, threshold, ..
            } => Some((*feature, *threshold)),
            TreeNode::Leaf { .. } => None,
        }
    }

    /// Number of split levels on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                TreeNode::Leaf { .. } => 0,
            }
        }
        self.nodes().map_or(0, |nodes| walk(nodes, 0))
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes().map_or(0, |nodes| {
            nodes
                .iter()
                .filter(|n| matches!(n, TreeNode::Leaf { .. }))
                .count()
        })
    }

    /// Input width of the fitted tree
    pub fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.n_features)
    }

    /// Check the structure of a fitted tree, typically one read from disk.
    ///
    /// Children must come after their parent in the arena, which rules out
    /// cycles and keeps every descent finite.
    pub fn verify(&self) -> Result<()> {
        let corrupt = |msg: String| Err(ClassifierError::CorruptModel(msg));
        self.params.validate()?;
        let state = self.fitted()?;

        if state.n_features == 0 {
            return corrupt("tree has no input features".to_string());
        }
        if state.nodes.is_empty() {
            return corrupt("tree has no nodes".to_string());
        }
        if state.importances.len() != state.n_features
            || state
                .importances
                .iter()
                .any(|v| !v.is_finite() || *v < 0.0)
        {
            return corrupt("invalid feature importances".to_string());
        }

        let n_nodes = state.nodes.len();
        for (idx, node) in state.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= state.n_features {
                        return corrupt(format!("node {idx} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return corrupt(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= n_nodes {
                            return corrupt(format!("node {idx} points to invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { counts, .. } => {
                    if counts[0] + counts[1] == 0 {
                        return corrupt(format!("leaf {idx} holds no samples"));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_counts(&self, features: &[f64]) -> Result<[usize; 2]> {
        let state = self.fitted()?;
        check_dimension(features, state.n_features)?;

        let mut idx = 0;
        loop {
            match &state.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { counts, .. } => return Ok(*counts),
            }
        }
    }

    /// Recursively grow the subtree over `indices`, returning its node index
    fn grow(
        &self,
        samples: &[Sample],
        indices: &[usize],
        depth: usize,
        tree: &mut FittedTree,
        control: &TrainingControl,
    ) -> Result<usize> {
        control.checkpoint()?;

        let counts = class_counts(samples, indices);
        let impurity = self.params.criterion.impurity(counts);
        let idx = tree.nodes.len();
        tree.nodes.push(TreeNode::Leaf { counts, impurity });

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || impurity == 0.0
        {
            return Ok(idx);
        }

        let Some(split) = self.best_split(samples, indices, impurity, tree.n_features) else {
            return Ok(idx);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| samples[i].features[split.feature] <= split.threshold);

        let left = self.grow(samples, &left_indices, depth + 1, tree, control)?;
        let right = self.grow(samples, &right_indices, depth + 1, tree, control)?;

        tree.importances[split.feature] += split.decrease;
        tree.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples: indices.len(),
        };
        Ok(idx)
    }

    /// Best split by weighted child impurity over midpoints of distinct values
    fn best_split(
        &self,
        samples: &[Sample],
        indices: &[usize],
        impurity: f64,
        n_features: usize,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let total = class_counts(samples, indices);
        let parent = n as f64 * impurity;
        let mut best: Option<SplitCandidate> = None;
        let mut order = indices.to_vec();

        for feature in 0..n_features {
            order.sort_by(|&a, &b| {
                samples[a].features[feature].total_cmp(&samples[b].features[feature])
            });

            let mut left = [0usize; 2];
            for k in 0..n - 1 {
                left[samples[order[k]].label.index()] += 1;

                let lo = samples[order[k]].features[feature];
                let hi = samples[order[k + 1]].features[feature];
                if lo == hi {
                    continue;
                }

                let right = [total[0] - left[0], total[1] - left[1]];
                let n_left = (k + 1) as f64;
                let n_right = (n - k - 1) as f64;
                let weighted = n_left * self.params.criterion.impurity(left)
                    + n_right * self.params.criterion.impurity(right);
                let decrease = parent - weighted;

                if decrease > MIN_DECREASE && best.map_or(true, |b| decrease > b.decrease) {
                    let mid = lo + (hi - lo) / 2.0;
                    // adjacent floats can round the midpoint up to `hi`
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        decrease,
                    });
                }
            }
        }

        best
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(TreeParams::default())
    }
}

fn class_counts(samples: &[Sample], indices: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &i in indices {
        counts[samples[i].label.index()] += 1;
    }
    counts
}

impl BinaryClassifier for DecisionTree {
    fn fit(&mut self, samples: &[Sample], control: &TrainingControl) -> Result<()> {
        self.params.validate()?;
        let n_features = validate_training_set(samples)?;

        let mut tree = FittedTree {
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        let indices: Vec<usize> = (0..samples.len()).collect();
        self.grow(samples, &indices, 0, &mut tree, control)?;

        let total: f64 = tree.importances.iter().sum();
        if total > 0.0 {
            tree.importances.iter_mut().for_each(|v| *v /= total);
        }

        self.state = Some(tree);
        debug!(
            "Decision tree fitted: depth {}, {} leaves",
            self.depth(),
            self.n_leaves()
        );
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        let counts = self.leaf_counts(features)?;
        let n = (counts[0] + counts[1]) as f64;
        Ok([counts[0] as f64 / n, counts[1] as f64 / n])
    }

    fn predict_label(&self, features: &[f64]) -> Result<Label> {
        let [_, p1] = self.predict_proba(features)?;
        Ok(if p1 > 0.5 {
            Label::Positive
        } else {
            Label::Negative
        })
    }

    fn supports_feature_importance(&self) -> bool {
        true
    }

    fn feature_importance(&self) -> Result<Vec<f64>> {
        Ok(self.fitted()?.importances.clone())
    }
}
