//! Isolation-forest outlier model over historical Present scans.
//!
//! Each scan becomes a 3-feature vector: a stable hash bucket of the
//! payload, the hour of day and the day of week. The fitted model scores
//! how easily a point is isolated by random axis-aligned splits; points
//! isolated in few splits are outliers.
//!
//! The model is trained for reporting only. Classification never
//! consults it.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{ScanEvent, ScanStatus};

/// Dimensionality of a scan feature vector.
pub const FEATURE_DIM: usize = 3;
/// Buckets for the payload hash feature.
pub const PAYLOAD_HASH_BUCKETS: u64 = 10_000;
/// Fewer qualifying scans than this and no model is fitted.
pub const MIN_TRAINING_EVENTS: usize = 6;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub type FeatureVector = [f64; FEATURE_DIM];

/// 64-bit FNV-1a over the payload bytes. Stable across runs and platforms.
pub fn payload_hash(payload: &str) -> u64 {
    payload.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Feature vector: (payload hash mod 10000, hour 0–23, weekday 0–6 from Monday).
pub fn scan_features(payload: &str, at: DateTime<Utc>) -> FeatureVector {
    [
        (payload_hash(payload) % PAYLOAD_HASH_BUCKETS) as f64,
        at.hour() as f64,
        at.weekday().num_days_from_monday() as f64,
    ]
}

/// Isolation forest hyper-parameters.
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Upper bound on the per-tree sub-sample.
    pub max_samples: usize,
    /// Expected share of outliers in the training data.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree, nodes stored in an arena with the root at index 0.
#[derive(Debug, Clone, PartialEq)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(data: &[FeatureVector], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, sample, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[FeatureVector],
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if depth >= height_limit || rows.len() <= 1 {
            return idx;
        }

        // Only features that still vary inside this node can split it.
        let mut splittable = Vec::with_capacity(FEATURE_DIM);
        for feature in 0..FEATURE_DIM {
            let (lo, hi) = column_range(data, &rows, feature);
            if hi > lo {
                splittable.push((feature, lo, hi));
            }
        }
        if splittable.is_empty() {
            return idx;
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let value = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < value);

        let left = self.grow(data, left_rows, depth + 1, height_limit, rng);
        let right = self.grow(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[idx] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        idx
    }

    fn path_length(&self, point: &FeatureVector) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    idx = if point[*feature] < *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn column_range(data: &[FeatureVector], rows: &[usize], feature: usize) -> (f64, f64) {
    rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
        let v = data[r][feature];
        (lo.min(v), hi.max(v))
    })
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted isolation forest.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
    training_size: usize,
}

impl IsolationForest {
    /// Fit on `data`. Returns `None` for an empty data set.
    pub fn fit(data: &[FeatureVector], params: &ForestParams) -> Option<Self> {
        if data.is_empty() || params.n_trees == 0 {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = params.max_samples.clamp(1, data.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.n_trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, sample, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            threshold: f64::INFINITY,
            training_size: data.len(),
        };

        let mut scores: Vec<f64> = data.iter().map(|p| forest.score(p)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        forest.threshold = quantile(&scores, 1.0 - params.contamination);

        tracing::debug!(
            trees = forest.trees.len(),
            sample_size,
            threshold = forest.threshold,
            "isolation forest fitted"
        );
        Some(forest)
    }

    /// Anomaly score in (0, 1]. Around 0.5 is ordinary; near 1 is an outlier.
    pub fn score(&self, point: &FeatureVector) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|t| t.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        if norm == 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / norm)
    }

    /// Score above which a point is flagged.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_outlier(&self, point: &FeatureVector) -> bool {
        self.score(point) > self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn training_size(&self) -> usize {
        self.training_size
    }
}

/// Linear-interpolated quantile of sorted values, `q` in [0, 1].
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::INFINITY;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Fit the outlier model over the Present events in `events`.
///
/// Other statuses are ignored. Returns `None` when fewer than
/// [`MIN_TRAINING_EVENTS`] Present events exist.
pub fn train_anomaly_detector(events: &[ScanEvent]) -> Option<IsolationForest> {
    let features: Vec<FeatureVector> = events
        .iter()
        .filter(|e| e.status == ScanStatus::Present)
        .map(|e| scan_features(&e.payload, e.timestamp))
        .collect();

    if features.len() < MIN_TRAINING_EVENTS {
        tracing::info!(
            present = features.len(),
            required = MIN_TRAINING_EVENTS,
            "not enough Present scans to train anomaly model"
        );
        return None;
    }

    IsolationForest::fit(&features, &ForestParams::default())
}
