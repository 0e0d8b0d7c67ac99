use ndarray::{Array2, ArrayView1, ArrayView2};
use num_traits::Float;

/// Squared Euclidean distance between two equally long vectors.
pub fn squared_euclidean<T: Float>(a: ArrayView1<T>, b: ArrayView1<T>) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc + (x - y) * (x - y))
}

/// Symmetric `n x n` matrix of squared Euclidean distances between the rows of `x`.
pub fn pairwise_squared_distances<T: Float>(x: ArrayView2<T>) -> Array2<T> {
    let n = x.nrows();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = squared_euclidean(x.row(i), x.row(j));
            d[[i, j]] = dist;
            d[[j, i]] = dist;
        }
    }
    d
}
