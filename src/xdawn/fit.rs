//! Xdawn filter estimation.
//!
//! For every class `k` with prototype response `Pₖ` (`[n_channels, n_t]`):
//!
//! ```text
//! Σ_sig  = cov(all epochs, concatenated in time)
//! Σ_k    = cov(Pₖ)                     (or cov(Pₖ·Tₖ) with overlap correction)
//! Σ_k w  = λ Σ_sig w                   → W_k, columns sorted by λ descending,
//!                                        each scaled to unit norm
//! filters_k  = W_kᵀ[..n_components]    [n_components, n_channels]
//! patterns_k = pinv(W_kᵀ)[.., ..n_components]   [n_channels, n_components]
//! ```
//!
//! # Overlap correction
//!
//! When trials overlap in time their plain average mixes neighbouring
//! responses. The epochs are laid back onto a pseudo-continuous signal `y`
//! at their onsets and the per-class responses are recovered from the
//! linear model `y ≈ Σₖ Pₖ Tₖ`, where `Tₖ` (`[n_t, n_samples]`) has a one
//! at `(lag, onset + lag)` for every trial of class `k`.
use ndarray::{s, Array2, Array3, Axis};
use tracing::debug;

use crate::config::Solver;
use crate::covariance::{CovarianceEstimator, Regularization};
use crate::error::{Error, Result};
use crate::linalg::{cho_solve, generalized_eigh, pinv};

/// Event timing needed by the overlap-correcting estimator.
#[derive(Debug, Clone, Copy)]
pub struct OverlapInfo<'a> {
    /// Onset sample of every epoch, in storage order.
    pub onsets: &'a [usize],
    pub solver: Solver,
}

/// Output of [`fit_xdawn`], one entry per class in ascending label order.
#[derive(Debug, Clone)]
pub struct XdawnFit {
    pub classes: Vec<i32>,
    /// `[n_components, n_channels]`, rows = components.
    pub filters: Vec<Array2<f64>>,
    /// `[n_channels, n_components]`, columns = components.
    pub patterns: Vec<Array2<f64>>,
    /// Prototype response per class, `[n_channels, n_times]`.
    pub evokeds: Vec<Array2<f64>>,
}

/// Sorted unique labels.
pub fn unique_classes(labels: &[i32]) -> Vec<i32> {
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Concatenate epochs along time: `[n_epochs, C, T]` → `[C, n_epochs·T]`.
pub fn hstack_epochs(data: &Array3<f64>) -> Array2<f64> {
    let (_, n_ch, n_t) = data.dim();
    let n_total = data.len() / n_ch.max(1);
    Array2::from_shape_fn((n_ch, n_total), |(c, k)| data[[k / n_t, c, k % n_t]])
}

/// Inverse of [`hstack_epochs`].
pub fn split_epochs(data: &Array2<f64>, n_epochs: usize) -> Array3<f64> {
    let (n_ch, n_total) = data.dim();
    let n_t = n_total / n_epochs.max(1);
    Array3::from_shape_fn((n_epochs, n_ch, n_t), |(e, c, t)| data[[c, e * n_t + t]])
}

/// Lay the epochs onto a pseudo-continuous signal at their onsets.
///
/// Onsets are taken relative to the earliest one. Where epochs overlap, a
/// later epoch (in storage order) overwrites the samples of an earlier one.
pub fn construct_signal_from_epochs(data: &Array3<f64>, onsets: &[usize]) -> Result<Array2<f64>> {
    let (n_epochs, n_ch, n_t) = data.dim();
    if onsets.len() != n_epochs {
        return Err(Error::config(format!(
            "{} onsets for {n_epochs} epochs",
            onsets.len()
        )));
    }
    let first = onsets.iter().copied().min().unwrap_or(0);
    let last = onsets.iter().copied().max().unwrap_or(0);
    let mut raw = Array2::<f64>::zeros((n_ch, last - first + n_t));
    for (e, &onset) in onsets.iter().enumerate() {
        let pos = onset - first;
        raw.slice_mut(s![.., pos..pos + n_t])
            .assign(&data.slice(s![e, .., ..]));
    }
    Ok(raw)
}

/// Design matrix `[n_samples, n_classes·n_lags]` of the overlap model.
///
/// Column block `k` belongs to `classes[k]`; within it column `lag` has a
/// one at row `onset + lag` for each trial of that class.
pub fn toeplitz_design(
    n_samples: usize,
    rel_onsets: &[usize],
    labels: &[i32],
    classes: &[i32],
    n_lags: usize,
) -> Array2<f64> {
    let mut x = Array2::<f64>::zeros((n_samples, classes.len() * n_lags));
    for (&onset, label) in rel_onsets.iter().zip(labels) {
        let Some(ci) = classes.iter().position(|c| c == label) else {
            continue;
        };
        for lag in 0..n_lags {
            let row = onset + lag;
            if row < n_samples {
                x[[row, ci * n_lags + lag]] += 1.0;
            }
        }
    }
    x
}

/// Least-squares evoked responses corrected for trial overlap.
///
/// Returns, per class (in `classes` order), the deconvolved response
/// `[n_channels, n_times]` and its Toeplitz block `[n_times, n_samples]`.
pub fn least_square_evoked(
    data: &Array3<f64>,
    onsets: &[usize],
    labels: &[i32],
    classes: &[i32],
    solver: Solver,
) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>)> {
    let n_t = data.shape()[2];
    let raw = construct_signal_from_epochs(data, onsets)?;
    let first = onsets.iter().copied().min().unwrap_or(0);
    let rel: Vec<usize> = onsets.iter().map(|&o| o - first).collect();
    let x = toeplitz_design(raw.ncols(), &rel, labels, classes, n_t);

    // coefs: [n_channels, n_classes·n_t]
    let coefs = match solver {
        Solver::Pinv => raw.dot(&pinv(&x)?.t()),
        Solver::Cholesky => {
            let xtx = x.t().dot(&x);
            let xty = x.t().dot(&raw.t());
            cho_solve(&xtx, &xty)?.reversed_axes()
        }
    };
    debug!(?solver, n_samples = raw.ncols(), n_regressors = x.ncols(), "overlap regression");

    let mut evokeds = Vec::with_capacity(classes.len());
    let mut toeplitzs = Vec::with_capacity(classes.len());
    for k in 0..classes.len() {
        let cols = k * n_t..(k + 1) * n_t;
        evokeds.push(coefs.slice(s![.., cols.clone()]).to_owned());
        toeplitzs.push(x.slice(s![.., cols]).t().to_owned());
    }
    Ok((evokeds, toeplitzs))
}

/// Fit Xdawn filters and patterns for every class in `labels`.
///
/// `signal_cov`, when given, must be `[n_channels, n_channels]`. With
/// `overlap` the prototypes come from [`least_square_evoked`], otherwise
/// they are class means.
pub fn fit_xdawn(
    data: &Array3<f64>,
    labels: &[i32],
    n_components: usize,
    reg: &Regularization,
    signal_cov: Option<&Array2<f64>>,
    overlap: Option<OverlapInfo<'_>>,
    estimator: &dyn CovarianceEstimator,
) -> Result<XdawnFit> {
    let (n_epochs, n_ch, _) = data.dim();
    if n_epochs == 0 || n_ch == 0 {
        return Err(Error::config(format!("cannot fit Xdawn on data of shape {:?}", data.dim())));
    }
    if labels.len() != n_epochs {
        return Err(Error::config(format!(
            "{} labels for {n_epochs} epochs",
            labels.len()
        )));
    }
    if n_components == 0 || n_components > n_ch {
        return Err(Error::config(format!(
            "n_components must be in 1..={n_ch}, got {n_components}"
        )));
    }
    reg.validate()?;

    let classes = unique_classes(labels);

    let signal_cov = match signal_cov {
        Some(cov) => {
            if cov.dim() != (n_ch, n_ch) {
                return Err(Error::config(format!(
                    "signal_cov must be an array of shape ({n_ch}, {n_ch}), got {:?}",
                    cov.dim()
                )));
            }
            cov.clone()
        }
        None => estimator.estimate(hstack_epochs(data).view(), reg)?,
    };

    let (evokeds, toeplitzs) = match overlap {
        Some(ov) => {
            let (evo, toep) = least_square_evoked(data, ov.onsets, labels, &classes, ov.solver)?;
            (evo, toep.into_iter().map(Some).collect::<Vec<_>>())
        }
        None => {
            let mut evo = Vec::with_capacity(classes.len());
            for &c in &classes {
                let idx: Vec<usize> = (0..n_epochs).filter(|&e| labels[e] == c).collect();
                let mean = data
                    .select(Axis(0), &idx)
                    .mean_axis(Axis(0))
                    .ok_or_else(|| Error::config(format!("class {c} has no epochs")))?;
                evo.push(mean);
            }
            (evo, vec![None; classes.len()])
        }
    };

    let mut filters = Vec::with_capacity(classes.len());
    let mut patterns = Vec::with_capacity(classes.len());
    for ((class, evo), toeplitz) in classes.iter().zip(&evokeds).zip(&toeplitzs) {
        let evo_cov = match toeplitz {
            Some(t) => estimator.estimate(evo.dot(t).view(), reg)?,
            None => estimator.estimate(evo.view(), reg)?,
        };

        let (evals, evecs) = generalized_eigh(&evo_cov, &signal_cov)?;
        // Descending eigenvalues, unit-norm columns.
        let mut evecs = evecs.slice(s![.., ..;-1]).to_owned();
        for mut col in evecs.columns_mut() {
            let norm = col.dot(&col).sqrt();
            if norm > 0.0 {
                col /= norm;
            }
        }
        debug!(class, top_eigenvalue = evals[evals.len() - 1], "xdawn class fitted");

        let full_patterns = pinv(&evecs.t().to_owned())?;
        filters.push(evecs.slice(s![.., ..n_components]).t().to_owned());
        patterns.push(full_patterns.slice(s![.., ..n_components]).to_owned());
    }

    Ok(XdawnFit { classes, filters, patterns, evokeds })
}
