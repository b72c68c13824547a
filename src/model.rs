//! Thin wrappers around linfa classifiers trained on the holdout split.

use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use linfa_trees::DecisionTree;
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use crate::error::{PipelineError, Result};
use crate::evaluation::{evaluate_model, ClassificationMetrics};
use crate::split::HoldoutSplit;

const LOGISTIC_MAX_ITERATIONS: u64 = 1000;
const FOREST_TREES: usize = 100;
const FOREST_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct ModelReport {
    pub name: String,
    pub train: ClassificationMetrics,
    pub test: ClassificationMetrics,
}

fn check_trainable(split: &HoldoutSplit) -> Result<()> {
    if split.x_train.nrows() == 0 || split.x_train.ncols() == 0 {
        return Err(PipelineError::Model("training split has no data".into()));
    }
    let positives = split.y_train.iter().filter(|y| **y == 1).count();
    if positives == 0 || positives == split.y_train.len() {
        return Err(PipelineError::Model(
            "training split needs both Risk_Label classes".into(),
        ));
    }
    Ok(())
}

fn report(name: &str, split: &HoldoutSplit, train_pred: Array1<usize>, test_pred: Array1<usize>) -> ModelReport {
    let train = evaluate_model(
        &split.y_train.to_vec(),
        &train_pred.to_vec(),
        &format!("{} (Train)", name),
    );
    let test = evaluate_model(
        &split.y_test.to_vec(),
        &test_pred.to_vec(),
        &format!("{} (Test)", name),
    );
    ModelReport {
        name: name.to_string(),
        train,
        test,
    }
}

pub fn train_and_evaluate_logistic_regression(split: &HoldoutSplit) -> Result<ModelReport> {
    check_trainable(split)?;
    let dataset = Dataset::new(split.x_train.clone(), split.y_train.clone());

    info!("Training logistic regression on {} samples", split.x_train.nrows());
    let model = LogisticRegression::default()
        .max_iterations(LOGISTIC_MAX_ITERATIONS)
        .fit(&dataset)
        .map_err(|e| PipelineError::Model(e.to_string()))?;

    let train_pred = model.predict(&split.x_train);
    let test_pred = model.predict(&split.x_test);
    Ok(report("Logistic Regression", split, train_pred, test_pred))
}

pub fn train_and_evaluate_decision_tree(split: &HoldoutSplit) -> Result<ModelReport> {
    check_trainable(split)?;
    let dataset = Dataset::new(split.x_train.clone(), split.y_train.clone());

    info!("Training decision tree on {} samples", split.x_train.nrows());
    let model = DecisionTree::params().fit(&dataset)?;

    let train_pred = model.predict(&split.x_train);
    let test_pred = model.predict(&split.x_test);
    Ok(report("Decision Tree", split, train_pred, test_pred))
}

/// Bagged decision trees, each fitted on a bootstrap sample of the rows
/// and a random subset of `round(sqrt(n_features))` columns.
pub struct RandomForest {
    trees: Vec<(DecisionTree<f64, usize>, Vec<usize>)>,
}

impl RandomForest {
    pub fn fit(x: &Array2<f64>, y: &Array1<usize>, n_trees: usize, seed: u64) -> Result<Self> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(PipelineError::Model("random forest needs a non-empty matrix".into()));
        }
        let per_tree = ((n_features as f64).sqrt().round() as usize).clamp(1, n_features);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(n_trees);
        for _ in 0..n_trees.max(1) {
            let rows: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            let mut columns = sample(&mut rng, n_features, per_tree).into_vec();
            columns.sort_unstable();

            let x_boot = x.select(Axis(0), &rows).select(Axis(1), &columns);
            let y_boot = y.select(Axis(0), &rows);
            let tree = DecisionTree::params().fit(&Dataset::new(x_boot, y_boot))?;
            trees.push((tree, columns));
        }
        debug!("Fitted {} trees on {} of {} features each", trees.len(), per_tree, n_features);
        Ok(RandomForest { trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Majority vote over the trees; a tied vote predicts 0.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<usize> {
        let mut positive_votes = vec![0usize; x.nrows()];
        for (tree, columns) in &self.trees {
            let votes: Array1<usize> = tree.predict(&x.select(Axis(1), columns));
            for (total, vote) in positive_votes.iter_mut().zip(votes.iter()) {
                if *vote == 1 {
                    *total += 1;
                }
            }
        }
        positive_votes
            .into_iter()
            .map(|votes| usize::from(votes * 2 > self.trees.len()))
            .collect()
    }
}

pub fn train_and_evaluate_random_forest(split: &HoldoutSplit) -> Result<ModelReport> {
    check_trainable(split)?;

    info!(
        "Training random forest ({} trees) on {} samples",
        FOREST_TREES,
        split.x_train.nrows()
    );
    let model = RandomForest::fit(&split.x_train, &split.y_train, FOREST_TREES, FOREST_SEED)?;

    let train_pred = model.predict(&split.x_train);
    let test_pred = model.predict(&split.x_test);
    Ok(report("Random Forest", split, train_pred, test_pred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn separable_split() -> HoldoutSplit {
        let x: Array2<f64> = array![
            [0.0, 0.1],
            [0.1, 0.0],
            [0.2, 0.1],
            [0.1, 0.2],
            [0.9, 1.0],
            [1.0, 0.9],
            [0.8, 0.9],
            [0.9, 0.8]
        ];
        let y = array![0usize, 0, 0, 0, 1, 1, 1, 1];
        HoldoutSplit {
            x_train: x.clone(),
            x_test: x,
            y_train: y.clone(),
            y_test: y,
            feature_names: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn test_decision_tree_fits_separable_data() {
        let report = train_and_evaluate_decision_tree(&separable_split()).unwrap();
        assert_eq!(report.train.accuracy, 1.0);
        assert_eq!(report.test.confusion_matrix, [[4, 0], [0, 4]]);
    }

    #[test]
    fn test_logistic_regression_fits_separable_data() {
        let report = train_and_evaluate_logistic_regression(&separable_split()).unwrap();
        assert!(report.train.accuracy >= 0.99, "accuracy {}", report.train.accuracy);
    }

    #[test]
    fn test_random_forest_fits_separable_data() {
        let report = train_and_evaluate_random_forest(&separable_split()).unwrap();
        assert!(report.train.accuracy >= 0.99, "accuracy {}", report.train.accuracy);
        assert_eq!(report.name, "Random Forest");
    }

    #[test]
    fn test_random_forest_is_seeded() {
        let split = separable_split();
        let a = RandomForest::fit(&split.x_train, &split.y_train, 10, 42).unwrap();
        let b = RandomForest::fit(&split.x_train, &split.y_train, 10, 42).unwrap();
        assert_eq!(a.n_trees(), 10);
        let points = array![[0.05, 0.05], [0.95, 0.95], [0.5, 0.5]];
        assert_eq!(a.predict(&points), b.predict(&points));
    }

    #[test]
    fn test_single_class_training_rejected() {
        let mut split = separable_split();
        split.y_train.fill(1);
        assert!(matches!(
            train_and_evaluate_logistic_regression(&split),
            Err(PipelineError::Model(_))
        ));
    }
}
