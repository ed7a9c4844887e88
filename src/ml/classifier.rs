use crate::error::{AppError, Result};
use crate::ml::models::{ForestConfig, ModelMetadata, ModelMetrics, ModelType};
use crate::ml::regressor::ndarray_to_densematrix;
use crate::models::RiskLevel;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::collections::BTreeMap;

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// One ensemble member.
///
/// A bootstrap sample holding a single class cannot grow a tree, so it votes
/// for that class unconditionally.
#[derive(Serialize, Deserialize)]
enum Voter {
    Tree(Tree),
    Constant(RiskLevel),
}

impl Voter {
    fn vote(&self, x: &DenseMatrix<f64>, n_rows: usize) -> Result<Vec<RiskLevel>> {
        match self {
            Voter::Constant(level) => Ok(vec![*level; n_rows]),
            Voter::Tree(tree) => tree
                .predict(x)
                .map_err(|e| AppError::Model(format!("Risk prediction failed: {}", e)))?
                .into_iter()
                .map(|label| {
                    usize::try_from(label)
                        .ok()
                        .and_then(RiskLevel::from_index)
                        .ok_or_else(|| {
                            AppError::Internal(format!("Tree produced unknown label {}", label))
                        })
                })
                .collect(),
        }
    }
}

/// Risk-level classifier made of bagged decision trees.
///
/// Class probabilities are vote fractions over the classes present in the
/// training labels, so they always sum to 1 and never mention a class the
/// model has not seen.
#[derive(Serialize, Deserialize)]
pub struct RiskPredictor {
    /// Model metadata
    metadata: ModelMetadata,

    /// Hyperparameters
    config: ForestConfig,

    /// Classes seen at training time, in ordinal order
    classes: Vec<RiskLevel>,

    /// Ensemble members
    voters: Vec<Voter>,
}

impl RiskPredictor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            metadata: ModelMetadata::new("Risk Predictor", ModelType::BaggedDecisionTrees, &config),
            config,
            classes: Vec::new(),
            voters: Vec::new(),
        }
    }

    /// Fit the ensemble and report in-sample metrics
    pub fn train(&mut self, features: &Array2<f64>, labels: &[RiskLevel]) -> Result<ModelMetrics> {
        if features.nrows() == 0 || features.nrows() != labels.len() {
            return Err(AppError::Internal(format!(
                "Risk predictor needs matching non-empty inputs, got {} rows and {} labels",
                features.nrows(),
                labels.len()
            )));
        }

        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();

        let voters = (0..self.config.n_trees)
            .into_par_iter()
            .map(|member| {
                let seed = self.config.seed.wrapping_add(member as u64);
                self.fit_voter(features, labels, seed)
            })
            .collect::<Result<Vec<_>>>()?;

        self.classes = classes;
        self.voters = voters;

        let predictions = self.predict(features)?;
        let metrics = ModelMetrics::calculate(labels, &predictions, &self.classes);

        self.metadata.n_training_samples = features.nrows();
        self.metadata.n_features = features.ncols();
        self.metadata.trained_at = chrono::Utc::now();

        Ok(metrics)
    }

    fn fit_voter(&self, features: &Array2<f64>, labels: &[RiskLevel], seed: u64) -> Result<Voter> {
        let n_rows = features.nrows();
        let mut rng = StdRng::seed_from_u64(seed);
        let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();

        let first = labels[sample[0]];
        if sample.iter().all(|&i| labels[i] == first) {
            return Ok(Voter::Constant(first));
        }

        let x = Array2::from_shape_fn((n_rows, features.ncols()), |(r, c)| {
            features[[sample[r], c]]
        });
        let y: Vec<i32> = sample.iter().map(|&i| labels[i].index() as i32).collect();

        let mut params = DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_min_samples_leaf(self.config.min_samples_leaf);
        if let Some(depth) = self.config.max_depth {
            params = params.with_max_depth(depth);
        }

        let tree = DecisionTreeClassifier::fit(&ndarray_to_densematrix(&x), &y, params)
            .map_err(|e| AppError::Model(format!("Failed to train risk tree: {}", e)))?;

        Ok(Voter::Tree(tree))
    }

    /// Class probabilities for each row
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Vec<BTreeMap<RiskLevel, f64>>> {
        if self.voters.is_empty() {
            return Err(AppError::NotTrained);
        }

        let n_rows = features.nrows();
        let x = ndarray_to_densematrix(features);

        let mut counts = vec![BTreeMap::<RiskLevel, usize>::new(); n_rows];
        for voter in &self.voters {
            for (row, level) in voter.vote(&x, n_rows)?.into_iter().enumerate() {
                *counts[row].entry(level).or_insert(0) += 1;
            }
        }

        let n_voters = self.voters.len() as f64;
        Ok(counts
            .into_iter()
            .map(|row_counts| {
                self.classes
                    .iter()
                    .map(|class| {
                        let votes = row_counts.get(class).copied().unwrap_or(0);
                        (*class, votes as f64 / n_voters)
                    })
                    .collect()
            })
            .collect())
    }

    /// Most voted class for each row (ties go to the lower band)
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<RiskLevel>> {
        let probabilities = self.predict_proba(features)?;
        Ok(probabilities.iter().map(most_probable).collect())
    }

    /// Classes seen at training time
    pub fn classes(&self) -> &[RiskLevel] {
        &self.classes
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn is_trained(&self) -> bool {
        !self.voters.is_empty()
    }
}

/// Class with the highest probability, first in ordinal order on ties
pub fn most_probable(probabilities: &BTreeMap<RiskLevel, f64>) -> RiskLevel {
    let mut best: Option<(RiskLevel, f64)> = None;
    for (&level, &p) in probabilities {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((level, p)),
        }
    }
    best.map(|(level, _)| level).unwrap_or(RiskLevel::Low)
}
