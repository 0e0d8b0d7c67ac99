//! # Principal Component Analysis
//!
//! Dense PCA over the covariance matrix of a small standardized batch. The
//! covariance is at most `9 x 9` here, so a full symmetric eigendecomposition from
//! `nalgebra` is both exact and cheap.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

use crate::dimred::{Embedding, ExplainedVariance, Reducer, Reduction};
use crate::error::{Result, TrackscapeError};
use crate::standardize::StandardizedMatrix;

/// Fewest samples for which a two-component decomposition is meaningful.
pub const MIN_SAMPLES: usize = 3;

pub struct PcaBuilder {
    n_components: usize,
}

impl Default for PcaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PcaBuilder {
    pub fn new() -> Self {
        PcaBuilder { n_components: 2 }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn build(self) -> Pca {
        Pca {
            n_components: self.n_components,
            components: None,
            mean: None,
            explained_variance_ratio: None,
            total_variance: None,
            eigenvalues: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    components: Option<Array2<f64>>,
    mean: Option<Array1<f64>>,
    explained_variance_ratio: Option<Array1<f64>>,
    total_variance: Option<f64>,
    eigenvalues: Option<Array1<f64>>,
}

impl Pca {
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        let (n_samples, n_features) = x.dim();
        if self.n_components == 0 || self.n_components > n_features {
            return Err(TrackscapeError::InvalidParameter {
                name: "n_components",
                reason: format!(
                    "must be between 1 and {} features, got {}",
                    n_features, self.n_components
                ),
            });
        }
        let min_samples = MIN_SAMPLES.max(self.n_components);
        if n_samples < min_samples {
            return Err(TrackscapeError::InsufficientSamples {
                reducer: "PCA",
                n_samples,
                required: format!("at least {} samples", min_samples),
            });
        }

        // Center the data
        let mean = x.sum_axis(Axis(0)) / n_samples as f64;
        let centered = &x - &mean;

        // Sample covariance, matching the n - 1 normalisation of the explained variance
        let cov = centered.t().dot(&centered) / (n_samples as f64 - 1.0);
        let cov = DMatrix::from_fn(n_features, n_features, |i, j| cov[[i, j]]);
        let eigen = SymmetricEigen::new(cov);

        if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err(TrackscapeError::Numerical(
                "covariance eigendecomposition produced non-finite eigenvalues".to_string(),
            ));
        }

        // SymmetricEigen leaves eigenpairs unordered
        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues: Array1<f64> = order
            .iter()
            .map(|&k| eigen.eigenvalues[k].max(0.0))
            .collect();

        let mut components = Array2::zeros((self.n_components, n_features));
        for (row, &k) in order.iter().take(self.n_components).enumerate() {
            let vector = eigen.eigenvectors.column(k);
            let sign = dominant_sign(vector.iter().copied());
            for j in 0..n_features {
                components[[row, j]] = sign * vector[j];
            }
        }

        let total_variance = eigenvalues.sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            eigenvalues.mapv(|v| (v / total_variance).clamp(0.0, 1.0))
        } else {
            log::warn!("standardized batch has zero total variance, explained variance is 0");
            Array1::zeros(n_features)
        };

        log::debug!(
            "PCA eigenvalues {:?}, total variance {:.4}",
            eigenvalues.as_slice(),
            total_variance
        );

        self.components = Some(components);
        self.mean = Some(mean);
        self.explained_variance_ratio = Some(
            explained_variance_ratio
                .slice(s![..self.n_components])
                .to_owned(),
        );
        self.total_variance = Some(total_variance);
        self.eigenvalues = Some(eigenvalues.slice(s![..self.n_components]).to_owned());

        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        match (&self.components, &self.mean) {
            (Some(components), Some(mean)) => {
                if x.ncols() != mean.len() {
                    return Err(TrackscapeError::InvalidParameter {
                        name: "x",
                        reason: format!(
                            "fitted on {} features, got {}",
                            mean.len(),
                            x.ncols()
                        ),
                    });
                }
                let centered = &x - mean;
                Ok(centered.dot(&components.t()))
            }
            _ => Err(TrackscapeError::InvalidParameter {
                name: "pca",
                reason: "PCA has not been fitted yet".to_string(),
            }),
        }
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Principal axes, one row per component, in descending eigenvalue order.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    pub fn total_variance(&self) -> Option<f64> {
        self.total_variance
    }

    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.eigenvalues.as_ref()
    }
}

/// `1.0` or `-1.0` such that the largest-magnitude loading becomes positive.
fn dominant_sign(loadings: impl Iterator<Item = f64>) -> f64 {
    let dominant = loadings.fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if dominant < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Two-component PCA as a pipeline [`Reducer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearReducer;

impl LinearReducer {
    pub fn new() -> Self {
        LinearReducer
    }
}

impl Reducer for LinearReducer {
    fn name(&self) -> &'static str {
        "PCA"
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        if n_samples < MIN_SAMPLES {
            return Err(TrackscapeError::InsufficientSamples {
                reducer: "PCA",
                n_samples,
                required: format!("at least {} samples", MIN_SAMPLES),
            });
        }
        Ok(())
    }

    fn reduce(&self, x: &StandardizedMatrix) -> Result<Reduction> {
        self.validate(x.nrows())?;
        let mut pca = PcaBuilder::new().n_components(2).build();
        let projected = pca.fit_transform(x.view())?;

        let ratio = pca.explained_variance_ratio().ok_or_else(|| {
            TrackscapeError::Numerical("PCA did not report explained variance".to_string())
        })?;
        // A rank-2 batch puts all variance in two components and rounding can push the sum past 1
        let first = ratio[0];
        let second = ratio[1].min(1.0 - first).max(0.0);
        let explained_variance = ExplainedVariance { first, second };
        log::info!("PCA on {} tracks: {}", x.nrows(), explained_variance);

        Ok(Reduction {
            method: self.name(),
            embedding: Embedding::new(projected)?,
            axis_titles: [
                "Principal Component 1".to_string(),
                "Principal Component 2".to_string(),
            ],
            explained_variance: Some(explained_variance),
            kl_divergence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMatrix;
    use crate::standardize::Standardizer;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn standardized(rows: &[[f64; 9]]) -> StandardizedMatrix {
        let data = Array2::from_shape_fn((rows.len(), 9), |(i, j)| rows[i][j]);
        Standardizer::new().standardize(&FeatureMatrix::from_array(data).unwrap())
    }

    fn batch() -> StandardizedMatrix {
        standardized(&[
            [0.8, 0.9, -4.0, 0.05, 0.01, 0.0, 0.3, 0.7, 128.0],
            [0.3, 0.2, -18.0, 0.04, 0.92, 0.6, 0.1, 0.2, 72.0],
            [0.5, 0.5, -9.0, 0.30, 0.40, 0.1, 0.7, 0.5, 100.0],
            [0.6, 0.7, -6.5, 0.10, 0.15, 0.0, 0.2, 0.9, 118.0],
            [0.2, 0.4, -12.0, 0.08, 0.70, 0.8, 0.4, 0.1, 90.0],
            [0.9, 0.8, -5.0, 0.20, 0.05, 0.0, 0.9, 0.8, 124.0],
        ])
    }

    #[test]
    fn test_perfectly_correlated_features() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let mut pca = PcaBuilder::new().n_components(2).build();
        pca.fit(x.view()).unwrap();

        let ratio = pca.explained_variance_ratio().unwrap();
        assert_abs_diff_eq!(ratio[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ratio[1], 0.0, epsilon = 1e-10);

        let components = pca.components().unwrap();
        let norm = 5.0f64.sqrt();
        assert_abs_diff_eq!(components[[0, 0]], 1.0 / norm, epsilon = 1e-10);
        assert_abs_diff_eq!(components[[0, 1]], 2.0 / norm, epsilon = 1e-10);
    }

    #[test]
    fn test_eigenvalues_match_covariance() {
        // Independent axes with variances 4 and 1
        let x = array![[2.0, 0.0], [-2.0, 0.0], [0.0, 1.0], [0.0, -1.0]];
        let mut pca = PcaBuilder::new().n_components(2).build();
        pca.fit(x.view()).unwrap();

        let eigenvalues = pca.eigenvalues().unwrap();
        assert_abs_diff_eq!(eigenvalues[0], 8.0 / 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(eigenvalues[1], 2.0 / 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(pca.total_variance().unwrap(), 10.0 / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_transform_shape() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 7.0], [7.0, 8.0, 8.0]];

        let mut pca_1 = PcaBuilder::new().n_components(1).build();
        let transformed_1 = pca_1.fit_transform(x.view()).unwrap();
        assert_eq!(transformed_1.shape(), &[3, 1]);

        let mut pca_3 = PcaBuilder::new().n_components(3).build();
        let transformed_3 = pca_3.fit_transform(x.view()).unwrap();
        assert_eq!(transformed_3.shape(), &[3, 3]);
    }

    #[test]
    fn test_transform_without_fit() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let pca = PcaBuilder::new().build();
        let err = pca.transform(x.view()).unwrap_err();
        assert!(err.to_string().contains("PCA has not been fitted yet"));
    }

    #[test]
    fn test_too_few_samples() {
        let x = array![[1.0, 2.0], [3.0, 5.0]];
        let mut pca = PcaBuilder::new().build();
        let err = pca.fit(x.view()).unwrap_err();
        assert!(matches!(
            err,
            TrackscapeError::InsufficientSamples { n_samples: 2, .. }
        ));
    }

    #[test]
    fn test_invalid_component_count() {
        let x = array![[1.0, 2.0], [3.0, 5.0], [4.0, 1.0]];
        let mut pca = PcaBuilder::new().n_components(3).build();
        assert!(matches!(
            pca.fit(x.view()),
            Err(TrackscapeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_explained_variance_bounds() {
        let reduction = LinearReducer::new().reduce(&batch()).unwrap();
        let ev = reduction.explained_variance.unwrap();

        assert!((0.0..=1.0).contains(&ev.first));
        assert!((0.0..=1.0).contains(&ev.second));
        assert!(ev.total() <= 1.0);
        assert!(ev.first >= ev.second);
        assert!(reduction.kl_divergence.is_none());
    }

    #[test]
    fn test_row_count_and_minimal_batch() {
        let reduction = LinearReducer::new().reduce(&batch()).unwrap();
        assert_eq!(reduction.embedding.len(), 6);

        let minimal = standardized(&[
            [0.9, 0.95, -3.0, 0.10, 0.02, 0.00, 0.30, 0.80, 170.0],
            [0.2, 0.10, -22.0, 0.03, 0.95, 0.85, 0.08, 0.15, 65.0],
            [0.5, 0.55, -9.0, 0.06, 0.40, 0.20, 0.15, 0.50, 110.0],
        ]);
        let reduction = LinearReducer::new().reduce(&minimal).unwrap();
        assert_eq!(reduction.embedding.len(), 3);
        assert!(reduction.embedding.is_finite());
        assert!(reduction.explained_variance.unwrap().total() <= 1.0);
    }

    #[test]
    fn test_deterministic_orientation() {
        let first = LinearReducer::new().reduce(&batch()).unwrap();
        let second = LinearReducer::new().reduce(&batch()).unwrap();
        assert_eq!(first.embedding, second.embedding);
    }

    #[test]
    fn test_constant_batch_has_zero_variance() {
        let flat = standardized(&[[0.5; 9], [0.5; 9], [0.5; 9]]);
        let reduction = LinearReducer::new().reduce(&flat).unwrap();
        let ev = reduction.explained_variance.unwrap();

        assert_eq!(ev.total(), 0.0);
        assert!(reduction.embedding.is_finite());
    }
}
