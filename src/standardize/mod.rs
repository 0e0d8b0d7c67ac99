//! Per-column standardization of a [`FeatureMatrix`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::features::{AudioFeature, FeatureMatrix};

/// Feature matrix rescaled to zero mean and unit population variance per column.
///
/// Columns listed in [`StandardizedMatrix::degenerate_columns`] had zero variance
/// in the batch and hold `0.0` in every row.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedMatrix {
    data: Array2<f64>,
    mean: Array1<f64>,
    std_dev: Array1<f64>,
    degenerate: Vec<AudioFeature>,
}

impl StandardizedMatrix {
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn column(&self, feature: AudioFeature) -> ArrayView1<'_, f64> {
        self.data.column(feature.index())
    }

    /// Column means of the raw batch.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Column population standard deviations of the raw batch.
    pub fn std_dev(&self) -> &Array1<f64> {
        &self.std_dev
    }

    pub fn degenerate_columns(&self) -> &[AudioFeature] {
        &self.degenerate
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Standardizer;

impl Standardizer {
    pub fn new() -> Self {
        Standardizer
    }

    pub fn standardize(&self, matrix: &FeatureMatrix) -> StandardizedMatrix {
        let x = matrix.view();
        let n = x.nrows() as f64;

        let mean = x.sum_axis(Axis(0)) / n;
        let std_dev = x.std_axis(Axis(0), 0.0);

        let mut degenerate = Vec::new();
        let mut data = x.to_owned();
        for (j, mut col) in data.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (mean[j], std_dev[j]);
            if is_zero_scale(s, m) {
                let feature = matrix.columns()[j];
                log::warn!(
                    "feature `{}` is constant across {} tracks, standardizing it to 0",
                    feature,
                    x.nrows()
                );
                degenerate.push(feature);
                col.fill(0.0);
            } else {
                col.mapv_inplace(|v| (v - m) / s);
            }
        }

        StandardizedMatrix {
            data,
            mean,
            std_dev,
            degenerate,
        }
    }
}

/// A constant column can still show a tiny spread after the mean is subtracted in
/// floating point, so anything at rounding-noise scale counts as zero.
fn is_zero_scale(std_dev: f64, mean: f64) -> bool {
    std_dev <= 10.0 * f64::EPSILON * mean.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn matrix(rows: &[[f64; 9]]) -> FeatureMatrix {
        let data = Array2::from_shape_fn((rows.len(), 9), |(i, j)| rows[i][j]);
        FeatureMatrix::from_array(data).unwrap()
    }

    fn sample() -> FeatureMatrix {
        matrix(&[
            [0.8, 0.9, -4.0, 0.05, 0.01, 0.0, 0.3, 0.7, 128.0],
            [0.3, 0.2, -18.0, 0.04, 0.92, 0.6, 0.1, 0.2, 72.0],
            [0.5, 0.5, -9.0, 0.30, 0.40, 0.1, 0.7, 0.5, 100.0],
            [0.6, 0.7, -6.5, 0.10, 0.15, 0.0, 0.2, 0.9, 118.0],
        ])
    }

    #[test]
    fn test_zero_mean_unit_variance() {
        let standardized = Standardizer::new().standardize(&sample());

        for col in standardized.view().axis_iter(Axis(1)) {
            let mean = col.mean().unwrap();
            let std = col.std(0.0);
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(std, 1.0, epsilon = 1e-6);
        }
        assert!(standardized.degenerate_columns().is_empty());
    }

    #[test]
    fn test_idempotent() {
        let once = Standardizer::new().standardize(&sample());
        let again = Standardizer::new()
            .standardize(&FeatureMatrix::from_array(once.view().to_owned()).unwrap());

        for (a, b) in once.view().iter().zip(again.view().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_column_becomes_zero() {
        let mut rows = [
            [0.8, 0.9, -4.0, 0.05, 0.01, 0.0, 0.3, 0.7, 128.0],
            [0.3, 0.2, -18.0, 0.04, 0.92, 0.6, 0.1, 0.2, 72.0],
            [0.5, 0.5, -9.0, 0.30, 0.40, 0.1, 0.7, 0.5, 100.0],
        ];
        for row in rows.iter_mut() {
            row[AudioFeature::Instrumentalness.index()] = 0.1;
        }

        let standardized = Standardizer::new().standardize(&matrix(&rows));

        assert!(standardized.view().iter().all(|v| v.is_finite()));
        assert_eq!(
            standardized.degenerate_columns(),
            &[AudioFeature::Instrumentalness]
        );
        assert_eq!(
            standardized.column(AudioFeature::Instrumentalness).to_vec(),
            vec![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_single_row_is_all_zero() {
        let standardized = Standardizer::new().standardize(&matrix(&[[1.0; 9]]));
        assert_eq!(standardized.degenerate_columns().len(), 9);
        assert!(standardized.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_keeps_raw_statistics() {
        let standardized = Standardizer::new().standardize(&sample());
        assert_abs_diff_eq!(standardized.mean()[8], 104.5, epsilon = 1e-12);
        let expected = array![128.0, 72.0, 100.0, 118.0].std(0.0);
        assert_abs_diff_eq!(standardized.std_dev()[8], expected, epsilon = 1e-12);
    }
}
