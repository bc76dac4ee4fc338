//! Bagged regression trees predicting the defect rate from scaled features.
//!
//! Trees are CART regressors split on squared error. Every tree is grown on a
//! bootstrap resample drawn from its own seeded generator (`seed + tree_index`),
//! so a forest is fully determined by its training data, parameters and seed.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::common::error::{DefectError, DefectResult};
use crate::data::domain::N_FEATURES;

use super::scaler::ScaledRow;

/// Node variance below which a node is considered pure.
const PURE_VARIANCE: f64 = 1e-10;

/// Growth limits shared by every tree of a forest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// A node of a regression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        /// Samples with `x[feature] <= threshold` go left.
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Leaf nodes have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn check(&self) -> Result<(), String> {
        match self {
            TreeNode::Leaf { value, .. } if value.is_finite() => Ok(()),
            TreeNode::Leaf { .. } => Err("leaf with non-finite value".into()),
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => {
                if *feature >= N_FEATURES {
                    return Err(format!("split on unknown feature index {feature}"));
                }
                left.check()?;
                right.check()
            }
        }
    }
}

/// A single fitted regression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    /// Grow a tree over the rows selected by `indices` (duplicates allowed).
    pub fn fit(
        x: &[ScaledRow],
        y: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> DefectResult<Self> {
        if x.len() != y.len() {
            return Err(DefectError::invalid(format!(
                "feature rows ({}) and targets ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        if indices.is_empty() {
            return Err(DefectError::invalid("cannot fit a tree on zero rows"));
        }
        let mut builder = Builder { x, y, params, rng };
        Ok(Self {
            root: builder.grow(indices, 0),
        })
    }

    pub fn predict(&self, row: &ScaledRow) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }
}

struct Builder<'a> {
    x: &'a [ScaledRow],
    y: &'a [f64],
    params: &'a TreeParams,
    rng: &'a mut StdRng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl Builder<'_> {
    fn leaf(&self, indices: &[usize]) -> TreeNode {
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        TreeNode::Leaf {
            value: sum / indices.len() as f64,
            n_samples: indices.len(),
        }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let n = indices.len();
        let at_max_depth = self.params.max_depth.is_some_and(|d| depth >= d);
        if n < self.params.min_samples_split || at_max_depth {
            return self.leaf(&indices);
        }

        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &i| {
            (s + self.y[i], sq + self.y[i] * self.y[i])
        });
        let parent_sse = (sum_sq - sum * sum / n as f64).max(0.0);
        if parent_sse / (n as f64) < PURE_VARIANCE {
            return self.leaf(&indices);
        }

        let Some(best) = self.best_split(&indices, parent_sse) else {
            return self.leaf(&indices);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);
        if left.is_empty() || right.is_empty() {
            return self.leaf(&indices);
        }

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k < N_FEATURES => {
                let mut picked =
                    rand::seq::index::sample(&mut *self.rng, N_FEATURES, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..N_FEATURES).collect(),
        }
    }

    /// Lowest weighted squared error split, if any improves on the parent.
    fn best_split(&mut self, indices: &[usize], parent_sse: f64) -> Option<BestSplit> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();

        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature in self.candidate_features() {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let yi = self.y[order[pos]];
                left_sum += yi;
                left_sq += yi * yi;

                let here = self.x[order[pos]][feature];
                let next = self.x[order[pos + 1]][feature];
                let n_left = pos + 1;
                let n_right = n - n_left;
                if here >= next || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);

                if sse < parent_sse && best.as_ref().map_or(true, |b| sse < b.sse) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        sse,
                    });
                }
            }
        }
        best
    }
}

/// Draw `n` row indices with replacement.
fn bootstrap_indices(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let dist = Uniform::from(0..n);
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Ensemble of bootstrap-trained regression trees. Immutable after `fit`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefectModel {
    trees: Vec<RegressionTree>,
    params: TreeParams,
    seed: u64,
}

impl DefectModel {
    /// Fit `n_estimators` trees, each on its own bootstrap resample.
    pub fn fit(
        x: &[ScaledRow],
        y: &[f64],
        n_estimators: usize,
        params: TreeParams,
        seed: u64,
    ) -> DefectResult<Self> {
        if n_estimators == 0 {
            return Err(DefectError::invalid("n_estimators must be positive"));
        }
        if x.is_empty() {
            return Err(DefectError::invalid("cannot fit a forest on zero rows"));
        }

        let trees = (0..n_estimators)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let indices = bootstrap_indices(x.len(), &mut rng);
                RegressionTree::fit(x, y, indices, &params, &mut rng)
            })
            .collect::<DefectResult<Vec<_>>>()?;

        Ok(Self {
            trees,
            params,
            seed,
        })
    }

    /// Mean of the per-tree predictions.
    pub fn predict(&self, row: &ScaledRow) -> DefectResult<f64> {
        if self.trees.is_empty() {
            return Err(DefectError::inference("model has no fitted trees"));
        }
        if let Some(bad) = row.iter().position(|v| !v.is_finite()) {
            return Err(DefectError::inference(format!(
                "scaled feature {bad} is not finite"
            )));
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Reject states that could not have come out of `fit`.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("model has no trees".into());
        }
        self.trees.iter().try_for_each(|t| t.root.check())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v0: f64, v1: f64) -> ScaledRow {
        [v0, v1, 0.0, 0.0, 0.0, 0.0, 0.0]
    }

    fn step_data() -> (Vec<ScaledRow>, Vec<f64>) {
        let x: Vec<ScaledRow> = (0..20).map(|i| row(i as f64, 0.0)).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 9.0 }).collect();
        (x, y)
    }

    #[test]
    fn single_tree_learns_a_step() {
        let (x, y) = step_data();
        let mut rng = StdRng::seed_from_u64(0);
        let tree =
            RegressionTree::fit(&x, &y, (0..20).collect(), &TreeParams::default(), &mut rng)
                .unwrap();
        assert_eq!(tree.depth(), 1);
        match tree.root() {
            TreeNode::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 9.5);
            }
            other => panic!("expected a split, got {other:?}"),
        }
        assert_eq!(tree.predict(&row(3.0, 0.0)), 1.0);
        assert_eq!(tree.predict(&row(15.0, 0.0)), 9.0);
    }

    #[test]
    fn constant_target_is_a_single_leaf() {
        let x: Vec<ScaledRow> = (0..10).map(|i| row(i as f64, -(i as f64))).collect();
        let y = vec![4.2; 10];
        let mut rng = StdRng::seed_from_u64(1);
        let tree =
            RegressionTree::fit(&x, &y, (0..10).collect(), &TreeParams::default(), &mut rng)
                .unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&row(100.0, 0.0)), 4.2);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x: Vec<ScaledRow> = (0..64).map(|i| row(i as f64, 0.0)).collect();
        let y: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();
        let params = TreeParams {
            max_depth: Some(3),
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let tree = RegressionTree::fit(&x, &y, (0..64).collect(), &params, &mut rng).unwrap();
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn min_samples_leaf_is_respected() {
        let (x, y) = step_data();
        let params = TreeParams {
            min_samples_leaf: 15,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = RegressionTree::fit(&x, &y, (0..20).collect(), &params, &mut rng).unwrap();
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn forest_prediction_is_mean_of_trees() {
        let (x, y) = step_data();
        let forest = DefectModel::fit(&x, &y, 8, TreeParams::default(), 42).unwrap();
        assert_eq!(forest.n_estimators(), 8);

        let probe = row(12.0, 0.0);
        let expected =
            forest.trees().iter().map(|t| t.predict(&probe)).sum::<f64>() / 8.0;
        assert_eq!(forest.predict(&probe).unwrap(), expected);
    }

    #[test]
    fn forest_is_reproducible_from_its_seed() {
        let (x, y) = step_data();
        let a = DefectModel::fit(&x, &y, 5, TreeParams::default(), 7).unwrap();
        let b = DefectModel::fit(&x, &y, 5, TreeParams::default(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn feature_subsampling_still_fits() {
        let x: Vec<ScaledRow> = (0..40).map(|i| row(i as f64, (i % 5) as f64)).collect();
        let y: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let params = TreeParams {
            max_features: Some(2),
            ..TreeParams::default()
        };
        let forest = DefectModel::fit(&x, &y, 10, params, 11).unwrap();
        let pred = forest.predict(&row(20.0, 0.0)).unwrap();
        assert!((0.0..=39.0).contains(&pred));
        assert!(forest.check().is_ok());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (x, y) = step_data();
        assert!(DefectModel::fit(&x, &y, 0, TreeParams::default(), 0).is_err());
        assert!(DefectModel::fit(&[], &[], 3, TreeParams::default(), 0).is_err());
        assert!(DefectModel::fit(&x, &y[..5], 3, TreeParams::default(), 0).is_err());
    }

    #[test]
    fn non_finite_rows_fail_inference() {
        let (x, y) = step_data();
        let forest = DefectModel::fit(&x, &y, 2, TreeParams::default(), 0).unwrap();
        let err = forest.predict(&row(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, DefectError::Inference(_)));
    }
}
