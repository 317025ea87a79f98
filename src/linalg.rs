//! Small dense linear-algebra helpers on top of ndarray, with nalgebra doing
//! the symmetric eigen-decomposition.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2};

const EIGEN_EPS: f64 = 1e-15;
const EIGEN_MAX_ITER: usize = 10_000;

/// Eigen-decomposition of a symmetric matrix.
#[derive(Clone, Debug)]
pub struct Eigen {
    /// Eigenvalues, in the column order of `vectors`
    pub values: Array1<f64>,
    /// Orthonormal eigenvectors as columns
    pub vectors: Array2<f64>,
}

/// Decompose a symmetric matrix. `None` if the iteration does not converge
/// or the input holds non-finite entries.
pub fn symmetric_eigen(m: &Array2<f64>) -> Option<Eigen> {
    if m.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let n = m.nrows();
    let dm = DMatrix::from_fn(n, n, |i, j| m[[i, j]]);
    let eig = SymmetricEigen::try_new(dm, EIGEN_EPS, EIGEN_MAX_ITER)?;
    let values = Array1::from_iter(eig.eigenvalues.iter().copied());
    let vectors = Array2::from_shape_fn((n, n), |(i, j)| eig.eigenvectors[(i, j)]);
    if values.iter().any(|x| !x.is_finite()) {
        return None;
    }
    Some(Eigen { values, vectors })
}

/// `a·bᵀ`
pub fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

/// Replace `m` by `(m + mᵀ)/2`.
pub fn symmetrize(m: &mut Array2<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[[i, j]] + m[[j, i]]);
            m[[i, j]] = avg;
            m[[j, i]] = avg;
        }
    }
}

/// `B·diag(values)·Bᵀ`
pub fn compose(vectors: &Array2<f64>, values: &Array1<f64>) -> Array2<f64> {
    let scaled = vectors * &values.view().insert_axis(ndarray::Axis(0));
    scaled.dot(&vectors.t())
}

pub fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

pub fn all_finite(m: &Array2<f64>) -> bool {
    m.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_eigen_reconstructs_matrix() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let eig = symmetric_eigen(&m).unwrap();
        let back = compose(&eig.vectors, &eig.values);
        for (a, b) in m.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_eigen_rejects_non_finite() {
        let m = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        assert!(symmetric_eigen(&m).is_none());
    }

    #[test]
    fn test_symmetrize() {
        let mut m = array![[1.0, 2.0], [4.0, 1.0]];
        symmetrize(&mut m);
        assert_eq!(m, array![[1.0, 3.0], [3.0, 1.0]]);
    }

    #[test]
    fn test_outer() {
        let o = outer(&array![1.0, 2.0], &array![3.0, 4.0]);
        assert_eq!(o, array![[3.0, 4.0], [6.0, 8.0]]);
    }
}
