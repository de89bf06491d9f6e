//! Dense linear algebra for `ndarray` inputs, backed by `nalgebra`.
//!
//! - [`eigh`]: symmetric eigendecomposition, eigenvalues ascending.
//! - [`cholesky`] / [`cho_solve`]: `A = LLᵀ` and normal-equation solves.
//! - [`generalized_eigh`]: `A w = λ B w` by Cholesky whitening of `B`.
//! - [`pinv`]: Moore–Penrose pseudo-inverse by SVD.
use nalgebra::{linalg::Cholesky, DMatrix, SymmetricEigen, SVD};
use ndarray::{Array1, Array2, Axis};

use crate::error::{Error, Result};

// ── ndarray ⇄ nalgebra ───────────────────────────────────────────────────────

fn to_na(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_na(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn check_square(a: &Array2<f64>, what: &str) -> Result<usize> {
    let (m, n) = a.dim();
    if m != n {
        return Err(Error::Linalg(format!("{what}: matrix is {m}×{n}, not square")));
    }
    Ok(n)
}

fn factor(a: &Array2<f64>, what: &str) -> Result<Cholesky<f64, nalgebra::Dyn>> {
    check_square(a, what)?;
    Cholesky::new(to_na(a))
        .ok_or_else(|| Error::Linalg(format!("{what}: matrix is not positive definite")))
}

// ── Decompositions ───────────────────────────────────────────────────────────

/// Eigendecomposition of a symmetric matrix.
///
/// Returns eigenvalues in **ascending** order and the matching unit-norm
/// eigenvectors as columns.
pub fn eigh(a: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    check_square(a, "eigh")?;
    // Symmetric part; covariances are symmetric only up to rounding.
    let sym = (a + &a.t()) * 0.5;
    let se = SymmetricEigen::new(to_na(&sym));
    if se.eigenvalues.iter().any(|x| !x.is_finite()) {
        return Err(Error::Linalg("eigh: non-finite eigenvalue".into()));
    }
    let mut order: Vec<usize> = (0..se.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| se.eigenvalues[i].total_cmp(&se.eigenvalues[j]));
    let evals = Array1::from_iter(order.iter().map(|&i| se.eigenvalues[i]));
    let evecs = from_na(&se.eigenvectors).select(Axis(1), &order);
    Ok((evals, evecs))
}

/// Lower-triangular Cholesky factor `L` with `A = LLᵀ`.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    Ok(from_na(&factor(a, "cholesky")?.l()))
}

/// Solve `A X = B` for symmetric positive definite `A`.
pub fn cho_solve(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    let chol = factor(a, "cho_solve")?;
    if b.nrows() != a.nrows() {
        return Err(Error::Linalg(format!(
            "cho_solve: rhs has {} rows, matrix is {}×{}",
            b.nrows(),
            a.nrows(),
            a.nrows()
        )));
    }
    Ok(from_na(&chol.solve(&to_na(b))))
}

/// Generalized symmetric-definite eigenproblem `A w = λ B w`.
///
/// Returns eigenvalues ascending and eigenvectors as columns, normalised so
/// that `WᵀBW = I`. `B` must be positive definite.
pub fn generalized_eigh(a: &Array2<f64>, b: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = check_square(a, "generalized_eigh")?;
    if b.dim() != (n, n) {
        return Err(Error::Linalg(format!(
            "generalized_eigh: A is {n}×{n} but B is {:?}",
            b.dim()
        )));
    }
    let l = factor(b, "generalized_eigh")?.l();
    let l_inv = l
        .solve_lower_triangular(&DMatrix::identity(n, n))
        .ok_or_else(|| Error::Linalg("generalized_eigh: singular Cholesky factor".into()))?;
    let c = &l_inv * to_na(a) * l_inv.transpose();
    let (evals, v) = eigh(&from_na(&c))?;
    Ok((evals, from_na(&l_inv.transpose()).dot(&v)))
}

/// Moore–Penrose pseudo-inverse of an `m×n` matrix.
///
/// Singular values below `max(m, n) · ε · σ_max` are treated as zero.
pub fn pinv(a: &Array2<f64>) -> Result<Array2<f64>> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Ok(Array2::zeros((n, m)));
    }
    let svd = SVD::new(to_na(a), true, true);
    let smax = svd.singular_values.max();
    let cutoff = m.max(n) as f64 * f64::EPSILON * smax;
    let p = svd
        .pseudo_inverse(cutoff)
        .map_err(|e| Error::Linalg(format!("pinv: {e}")))?;
    Ok(from_na(&p))
}
