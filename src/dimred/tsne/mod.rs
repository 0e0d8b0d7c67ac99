//! # t-distributed Stochastic Neighbor Embedding
//!
//! Exact t-SNE: pairwise affinities are computed for every pair of tracks and the
//! gradient is evaluated in full on each iteration. This is `O(n^2)` per step,
//! which is fine for catalog batches of a few dozen tracks but not meant for large
//! inputs. The initial layout comes from a ChaCha generator, so a fixed seed gives
//! bit-identical output.

use ndarray::{Array1, Array2, ArrayView2, Zip};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::dimred::{Embedding, Reducer, Reduction};
use crate::error::{Result, TrackscapeError};
use crate::standardize::StandardizedMatrix;
use crate::utils::{pairwise_squared_distances, squared_euclidean};

const OUTPUT_DIM: usize = 2;
const MACHINE_EPSILON: f64 = f64::EPSILON;
/// Floor for a row sum of Gaussian affinities that underflowed to zero.
const MIN_AFFINITY_SUM: f64 = 1e-8;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
/// 2 (dof + 1) / dof with one degree of freedom for a 2-D Student-t kernel.
const GRADIENT_SCALE: f64 = 4.0;
const INIT_SCALE: f64 = 1e-4;
const CHECK_EVERY: usize = 50;
const MIN_GAIN: f64 = 0.01;

/// Effective neighbor count used to calibrate the Gaussian bandwidths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Perplexity {
    /// `min(30, max((n - 1) / 3, 1))` for a batch of `n` tracks.
    Auto,
    Fixed(f64),
}

impl Default for Perplexity {
    fn default() -> Self {
        Perplexity::Auto
    }
}

impl Perplexity {
    pub fn resolve(&self, n_samples: usize) -> f64 {
        match *self {
            Perplexity::Auto => ((n_samples as f64 - 1.0) / 3.0).clamp(1.0, 30.0),
            Perplexity::Fixed(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    /// `max(n / early_exaggeration / 4, 50)`.
    Auto,
    Fixed(f64),
}

pub struct TsneBuilder {
    perplexity: Perplexity,
    seed: u64,
    max_iter: usize,
    learning_rate: LearningRate,
    early_exaggeration: f64,
    exaggeration_iter: usize,
    min_grad_norm: f64,
    n_iter_without_progress: usize,
}

impl Default for TsneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TsneBuilder {
    pub fn new() -> Self {
        TsneBuilder {
            perplexity: Perplexity::Auto,
            seed: 42,
            max_iter: 1000,
            learning_rate: LearningRate::Auto,
            early_exaggeration: 12.0,
            exaggeration_iter: 250,
            min_grad_norm: 1e-7,
            n_iter_without_progress: 300,
        }
    }

    pub fn perplexity(mut self, perplexity: Perplexity) -> Self {
        self.perplexity = perplexity;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn learning_rate(mut self, learning_rate: LearningRate) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn early_exaggeration(mut self, factor: f64) -> Self {
        self.early_exaggeration = factor;
        self
    }

    pub fn exaggeration_iter(mut self, iterations: usize) -> Self {
        self.exaggeration_iter = iterations;
        self
    }

    pub fn min_grad_norm(mut self, min_grad_norm: f64) -> Self {
        self.min_grad_norm = min_grad_norm;
        self
    }

    pub fn n_iter_without_progress(mut self, iterations: usize) -> Self {
        self.n_iter_without_progress = iterations;
        self
    }

    /// Checks everything that does not depend on the batch size.
    pub fn build(self) -> Result<NeighborReducer> {
        if self.max_iter == 0 {
            return Err(invalid("max_iter", "must be at least 1".to_string()));
        }
        if self.exaggeration_iter > self.max_iter {
            return Err(invalid(
                "exaggeration_iter",
                format!(
                    "{} exceeds max_iter {}",
                    self.exaggeration_iter, self.max_iter
                ),
            ));
        }
        if !(self.early_exaggeration.is_finite() && self.early_exaggeration >= 1.0) {
            return Err(invalid(
                "early_exaggeration",
                format!("must be finite and >= 1, got {}", self.early_exaggeration),
            ));
        }
        if let LearningRate::Fixed(rate) = self.learning_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(invalid(
                    "learning_rate",
                    format!("must be finite and positive, got {}", rate),
                ));
            }
        }
        if let Perplexity::Fixed(p) = self.perplexity {
            if !(p.is_finite() && p > 0.0) {
                return Err(invalid(
                    "perplexity",
                    format!("must be finite and positive, got {}", p),
                ));
            }
        }

        Ok(self.finish())
    }

    fn finish(self) -> NeighborReducer {
        NeighborReducer {
            perplexity: self.perplexity,
            seed: self.seed,
            max_iter: self.max_iter,
            learning_rate: self.learning_rate,
            early_exaggeration: self.early_exaggeration,
            exaggeration_iter: self.exaggeration_iter,
            min_grad_norm: self.min_grad_norm,
            n_iter_without_progress: self.n_iter_without_progress,
        }
    }
}

fn invalid(name: &'static str, reason: String) -> TrackscapeError {
    TrackscapeError::InvalidParameter { name, reason }
}

/// Result of one t-SNE optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct TsneResult {
    pub embedding: Array2<f64>,
    pub kl_divergence: f64,
    pub n_iter: usize,
    pub perplexity: f64,
}

/// t-SNE as a pipeline [`Reducer`]. Construct through [`TsneBuilder`].
#[derive(Debug, Clone)]
pub struct NeighborReducer {
    perplexity: Perplexity,
    seed: u64,
    max_iter: usize,
    learning_rate: LearningRate,
    early_exaggeration: f64,
    exaggeration_iter: usize,
    min_grad_norm: f64,
    n_iter_without_progress: usize,
}

impl Default for NeighborReducer {
    fn default() -> Self {
        TsneBuilder::new().finish()
    }
}

impl NeighborReducer {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Perplexity this reducer uses for a batch of `n_samples`, checked against the batch size.
    pub fn checked_perplexity(&self, n_samples: usize) -> Result<f64> {
        if n_samples < 2 {
            return Err(TrackscapeError::InsufficientSamples {
                reducer: "t-SNE",
                n_samples,
                required: "at least 2 samples".to_string(),
            });
        }
        let perplexity = self.perplexity.resolve(n_samples);
        if !(perplexity.is_finite() && perplexity > 0.0) {
            return Err(invalid(
                "perplexity",
                format!("must be finite and positive, got {}", perplexity),
            ));
        }
        if perplexity >= n_samples as f64 {
            return Err(TrackscapeError::InsufficientSamples {
                reducer: "t-SNE",
                n_samples,
                required: format!("more samples than perplexity {}", perplexity),
            });
        }
        Ok(perplexity)
    }

    pub fn embed(&self, x: ArrayView2<f64>) -> Result<TsneResult> {
        let n_samples = x.nrows();
        let perplexity = self.checked_perplexity(n_samples)?;

        let distances = pairwise_squared_distances(x);
        let (conditional, betas) = conditional_probabilities(distances.view(), perplexity);
        let mean_sigma = betas.mapv(|b| (1.0 / b).sqrt()).mean().unwrap_or_default();
        log::debug!(
            "t-SNE affinities for {} samples, perplexity {:.2}, mean sigma {:.6}",
            n_samples,
            perplexity,
            mean_sigma
        );
        let mut p = joint_probabilities(conditional);

        let learning_rate = match self.learning_rate {
            LearningRate::Auto => (n_samples as f64 / self.early_exaggeration / 4.0).max(50.0),
            LearningRate::Fixed(rate) => rate,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let init = Normal::new(0.0, INIT_SCALE)
            .map_err(|e| TrackscapeError::Numerical(format!("initial layout: {}", e)))?;
        let mut y =
            Array2::from_shape_simple_fn((n_samples, OUTPUT_DIM), || init.sample(&mut rng));

        // Early exaggeration pulls natural clusters apart before the fine-tuning phase
        p.mapv_inplace(|v| v * self.early_exaggeration);
        let explore = GradientDescent {
            start: 0,
            stop: self.exaggeration_iter,
            momentum: 0.5,
            learning_rate,
            min_grad_norm: self.min_grad_norm,
            n_iter_without_progress: self.exaggeration_iter,
        };
        let (mut kl_divergence, mut last_iter) = explore.run(p.view(), &mut y);
        log::debug!(
            "t-SNE early exaggeration: KL divergence {:.6} after {} iterations",
            kl_divergence,
            last_iter
        );

        p.mapv_inplace(|v| v / self.early_exaggeration);
        let remaining = self.max_iter - self.exaggeration_iter;
        if remaining > 0 {
            let start = if self.exaggeration_iter == 0 { 0 } else { last_iter + 1 };
            let refine = GradientDescent {
                start,
                stop: self.max_iter,
                momentum: 0.8,
                learning_rate,
                min_grad_norm: self.min_grad_norm,
                n_iter_without_progress: self.n_iter_without_progress,
            };
            let (kl, iter) = refine.run(p.view(), &mut y);
            kl_divergence = kl;
            last_iter = iter;
        } else {
            let mut grad = Array2::zeros(y.dim());
            kl_divergence = kl_divergence_and_gradient(p.view(), y.view(), &mut grad);
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(TrackscapeError::Numerical(
                "t-SNE optimization diverged to non-finite coordinates".to_string(),
            ));
        }

        Ok(TsneResult {
            embedding: y,
            kl_divergence,
            n_iter: last_iter + 1,
            perplexity,
        })
    }
}

impl Reducer for NeighborReducer {
    fn name(&self) -> &'static str {
        "t-SNE"
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        self.checked_perplexity(n_samples).map(|_| ())
    }

    fn reduce(&self, x: &StandardizedMatrix) -> Result<Reduction> {
        let result = self.embed(x.view())?;
        log::info!(
            "t-SNE on {} tracks: KL divergence {:.4} after {} iterations (perplexity {:.2}, seed {})",
            x.nrows(),
            result.kl_divergence,
            result.n_iter,
            result.perplexity,
            self.seed
        );

        Ok(Reduction {
            method: self.name(),
            embedding: Embedding::new(result.embedding)?,
            axis_titles: [
                "t-SNE Dimension 1".to_string(),
                "t-SNE Dimension 2".to_string(),
            ],
            explained_variance: None,
            kl_divergence: Some(result.kl_divergence),
        })
    }
}

/// Row-normalized Gaussian affinities `p(j|i)` and the precision `beta_i = 1 / (2 sigma_i^2)`
/// of every row, each found by bisection so the row entropy equals `ln(perplexity)`.
pub(crate) fn conditional_probabilities(
    distances: ArrayView2<f64>,
    perplexity: f64,
) -> (Array2<f64>, Array1<f64>) {
    let n = distances.nrows();
    let desired_entropy = perplexity.ln();
    let mut p = Array2::zeros((n, n));
    let mut betas = Array1::ones(n);

    Zip::indexed(&mut betas)
        .and(p.rows_mut())
        .and(distances.rows())
        .par_for_each(|i, beta_out, mut p_row, d_row| {
            let mut beta = 1.0;
            let mut beta_min = f64::NEG_INFINITY;
            let mut beta_max = f64::INFINITY;

            for _ in 0..PERPLEXITY_STEPS {
                let mut sum_p = 0.0;
                for j in 0..n {
                    let v = if j == i { 0.0 } else { (-d_row[j] * beta).exp() };
                    p_row[j] = v;
                    sum_p += v;
                }
                if sum_p == 0.0 {
                    sum_p = MIN_AFFINITY_SUM;
                }

                let mut sum_disti_pi = 0.0;
                for j in 0..n {
                    p_row[j] /= sum_p;
                    sum_disti_pi += d_row[j] * p_row[j];
                }

                let entropy = sum_p.ln() + beta * sum_disti_pi;
                let diff = entropy - desired_entropy;
                if diff.abs() <= PERPLEXITY_TOLERANCE {
                    break;
                }

                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max == f64::INFINITY {
                        beta * 2.0
                    } else {
                        (beta + beta_max) / 2.0
                    };
                } else {
                    beta_max = beta;
                    beta = if beta_min == f64::NEG_INFINITY {
                        beta / 2.0
                    } else {
                        (beta + beta_min) / 2.0
                    };
                }
            }

            *beta_out = beta;
        });

    (p, betas)
}

/// Symmetrizes conditional affinities into a joint distribution over ordered pairs.
fn joint_probabilities(conditional: Array2<f64>) -> Array2<f64> {
    let mut p = &conditional + &conditional.t();
    let sum_p = p.sum().max(MACHINE_EPSILON);
    for ((i, j), v) in p.indexed_iter_mut() {
        *v = if i == j {
            0.0
        } else {
            (*v / sum_p).max(MACHINE_EPSILON)
        };
    }
    p
}

/// KL(P || Q) for the current layout, writing its gradient into `grad`.
fn kl_divergence_and_gradient(
    p: ArrayView2<f64>,
    y: ArrayView2<f64>,
    grad: &mut Array2<f64>,
) -> f64 {
    let n = y.nrows();

    // Student-t kernel
    let mut num = Array2::zeros((n, n));
    let mut sum_num = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 1.0 / (1.0 + squared_euclidean(y.row(i), y.row(j)));
            num[[i, j]] = v;
            num[[j, i]] = v;
            sum_num += 2.0 * v;
        }
    }
    let sum_num = sum_num.max(MACHINE_EPSILON);

    grad.fill(0.0);
    let mut kl = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = (num[[i, j]] / sum_num).max(MACHINE_EPSILON);
            let pij = p[[i, j]];
            kl += pij * (pij.max(MACHINE_EPSILON) / q).ln();

            let mult = GRADIENT_SCALE * (pij - q) * num[[i, j]];
            for d in 0..OUTPUT_DIM {
                grad[[i, d]] += mult * (y[[i, d]] - y[[j, d]]);
            }
        }
    }
    kl
}

/// One momentum phase of the optimizer, with delta-bar-delta gains.
struct GradientDescent {
    start: usize,
    stop: usize,
    momentum: f64,
    learning_rate: f64,
    min_grad_norm: f64,
    n_iter_without_progress: usize,
}

impl GradientDescent {
    /// Returns the KL divergence of the final layout and the index of the last iteration run.
    fn run(&self, p: ArrayView2<f64>, y: &mut Array2<f64>) -> (f64, usize) {
        let mut update = Array2::<f64>::zeros(y.dim());
        let mut gains = Array2::<f64>::ones(y.dim());
        let mut grad = Array2::<f64>::zeros(y.dim());

        let mut best_error = f64::MAX;
        let mut best_iter = self.start;
        let mut iter = self.start;

        for i in self.start..self.stop {
            iter = i;
            let error = kl_divergence_and_gradient(p, y.view(), &mut grad);
            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();

            Zip::from(&mut gains)
                .and(&mut grad)
                .and(&update)
                .for_each(|gain, g, &u| {
                    *gain = if u * *g < 0.0 { *gain + 0.2 } else { *gain * 0.8 };
                    *gain = gain.max(MIN_GAIN);
                    *g *= *gain;
                });

            Zip::from(&mut update).and(&grad).for_each(|u, &g| {
                *u = self.momentum * *u - self.learning_rate * g;
            });
            *y += &update;

            if (i + 1) % CHECK_EVERY == 0 {
                log::debug!(
                    "t-SNE iteration {}: KL divergence {:.6}, gradient norm {:.3e}",
                    i + 1,
                    error,
                    grad_norm
                );
                if error < best_error {
                    best_error = error;
                    best_iter = i;
                } else if i - best_iter > self.n_iter_without_progress {
                    log::debug!("t-SNE stopped after {} iterations without progress", i - best_iter);
                    break;
                }
                if grad_norm <= self.min_grad_norm {
                    log::debug!("t-SNE converged at iteration {}, gradient norm {:.3e}", i + 1, grad_norm);
                    break;
                }
            }
        }

        // Loss of the layout the last step produced
        let error = kl_divergence_and_gradient(p, y.view(), &mut grad);
        (error, iter)
    }
}
