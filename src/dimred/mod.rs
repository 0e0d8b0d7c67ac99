//! # Dimensionality Reduction
//!
//! Both reducers take a [`StandardizedMatrix`] and return one 2-D point per track,
//! in the same row order as the input. They sit behind the [`Reducer`] trait so the
//! pipeline can run either of them, or both on the same standardized data.
//!
//! ## Available Reducers
//! - **PCA** ([`pca`]): orthogonal linear projection with explained-variance accounting
//! - **t-SNE** ([`tsne`]): exact t-distributed stochastic neighbor embedding
//!
//! ## Algorithm Selection Guide
//! - Use **PCA** when the axes should stay interpretable and the global layout matters
//! - Use **t-SNE** to see local neighborhoods; distances between far-apart groups carry little meaning

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, TrackscapeError};
use crate::standardize::StandardizedMatrix;

pub mod pca;
pub mod tsne;

pub use pca::LinearReducer;
pub use tsne::{NeighborReducer, Perplexity, TsneBuilder};

/// Ordered 2-D coordinates, one row per track.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    points: Array2<f64>,
}

impl Embedding {
    pub fn new(points: Array2<f64>) -> Result<Self> {
        if points.ncols() != 2 {
            return Err(TrackscapeError::Numerical(format!(
                "embedding must have 2 columns, got {}",
                points.ncols()
            )));
        }
        Ok(Embedding { points })
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn point(&self, index: usize) -> [f64; 2] {
        let row = self.points.row(index);
        [row[0], row[1]]
    }

    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.points.axis_iter(Axis(0)).map(|row| [row[0], row[1]])
    }

    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.points.column(0)
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.points.column(1)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|v| v.is_finite())
    }
}

/// Share of total variance captured by the first two principal components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplainedVariance {
    pub first: f64,
    pub second: f64,
}

impl ExplainedVariance {
    pub fn total(&self) -> f64 {
        self.first + self.second
    }
}

impl fmt::Display for ExplainedVariance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PC1 {:.1}%, PC2 {:.1}% (total {:.1}%)",
            self.first * 100.0,
            self.second * 100.0,
            self.total() * 100.0
        )
    }
}

/// Output of one reducer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub method: &'static str,
    pub embedding: Embedding,
    pub axis_titles: [String; 2],
    /// Present for the linear reducer only.
    pub explained_variance: Option<ExplainedVariance>,
    /// Final Kullback-Leibler divergence, present for t-SNE only.
    pub kl_divergence: Option<f64>,
}

/// A strategy that maps a standardized matrix to a 2-D embedding.
pub trait Reducer {
    /// Short name used for panel titles and logs.
    fn name(&self) -> &'static str;

    /// Rejects batch sizes the reducer cannot handle, before any work is done.
    fn validate(&self, n_samples: usize) -> Result<()>;

    fn reduce(&self, x: &StandardizedMatrix) -> Result<Reduction>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_embedding_columns() {
        let embedding = Embedding::new(array![[1.0, -1.0], [2.0, -2.0], [3.0, -3.0]]).unwrap();
        assert_eq!(embedding.len(), 3);
        assert_eq!(embedding.x(), array![1.0, 2.0, 3.0]);
        assert_eq!(embedding.y(), array![-1.0, -2.0, -3.0]);
        assert_eq!(embedding.point(1), [2.0, -2.0]);
        assert!(embedding.is_finite());
    }

    #[test]
    fn test_embedding_rejects_wrong_width() {
        let err = Embedding::new(Array2::zeros((4, 3))).unwrap_err();
        assert!(matches!(err, TrackscapeError::Numerical(_)));
    }

    #[test]
    fn test_explained_variance_display() {
        let ev = ExplainedVariance {
            first: 0.5,
            second: 0.25,
        };
        assert_eq!(ev.to_string(), "PC1 50.0%, PC2 25.0% (total 75.0%)");
    }
}
