//! Array-level Xdawn: fit on `[n_epochs, n_channels, n_times]` tensors with
//! integer labels, transform into the stacked component space.
use ndarray::{concatenate, Array2, Array3, Axis};

use crate::covariance::{Regularization, ShrunkCovariance};
use crate::error::{Error, Result};

use super::fit::fit_xdawn;

/// Projection of trials into and out of Xdawn component space.
pub trait SpatialTransform {
    /// `[n_epochs, n_channels, n_times]` → `[n_epochs, n_sources, n_times]`.
    fn transform(&self, data: &Array3<f64>) -> Result<Array3<f64>>;

    /// Component space back to sensor space.
    ///
    /// Not defined without a class context; denoise through
    /// [`FittedXdawn::apply`](crate::FittedXdawn::apply).
    fn inverse_transform(&self, _data: &Array3<f64>) -> Result<Array3<f64>> {
        Err(Error::Unsupported(
            "inverse_transform is ambiguous without a class, use Xdawn::apply instead".into(),
        ))
    }
}

/// Multiply every trial by `filters` (`[n_sources, n_channels]`).
pub(crate) fn project(filters: &Array2<f64>, data: &Array3<f64>) -> Result<Array3<f64>> {
    let (n_epochs, n_ch, n_t) = data.dim();
    if filters.ncols() != n_ch {
        return Err(Error::config(format!(
            "data must have {} channels, got {n_ch} instead",
            filters.ncols()
        )));
    }
    let mut out = Array3::<f64>::zeros((n_epochs, filters.nrows(), n_t));
    for (mut dst, src) in out.outer_iter_mut().zip(data.outer_iter()) {
        dst.assign(&filters.dot(&src));
    }
    Ok(out)
}

/// Unfitted array-level estimator.
#[derive(Debug, Clone)]
pub struct XdawnTransformer {
    pub n_components: usize,
    pub reg: Regularization,
    pub signal_cov: Option<Array2<f64>>,
}

impl Default for XdawnTransformer {
    fn default() -> Self {
        Self { n_components: 2, reg: Regularization::None, signal_cov: None }
    }
}

impl XdawnTransformer {
    pub fn new(n_components: usize, reg: Regularization) -> Self {
        Self { n_components, reg, signal_cov: None }
    }

    /// Fit on `data` with per-epoch `labels`; `None` fits a single class on
    /// all epochs.
    pub fn fit(&self, data: &Array3<f64>, labels: Option<&[i32]>) -> Result<FittedTransformer> {
        let n_epochs = data.shape()[0];
        let ones;
        let labels = match labels {
            Some(l) => {
                if l.len() != n_epochs {
                    return Err(Error::config(format!(
                        "data and labels must have the same length ({n_epochs} vs {})",
                        l.len()
                    )));
                }
                l
            }
            None => {
                ones = vec![1; n_epochs];
                &ones[..]
            }
        };

        let fit = fit_xdawn(
            data,
            labels,
            self.n_components,
            &self.reg,
            self.signal_cov.as_ref(),
            None,
            &ShrunkCovariance,
        )?;

        let filters = stack_rows(&fit.filters)?;
        let transposed: Vec<Array2<f64>> = fit.patterns.iter().map(|p| p.t().to_owned()).collect();
        let patterns = stack_rows(&transposed)?;
        Ok(FittedTransformer {
            n_components: self.n_components,
            classes: fit.classes,
            filters,
            patterns,
        })
    }
}

fn stack_rows(blocks: &[Array2<f64>]) -> Result<Array2<f64>> {
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| Error::Linalg(e.to_string()))
}

/// Fitted array-level model. Rows of both matrices are components, class
/// blocks of `n_components` rows in ascending label order.
#[derive(Debug, Clone)]
pub struct FittedTransformer {
    pub n_components: usize,
    pub classes: Vec<i32>,
    /// `[n_components·n_classes, n_channels]`.
    pub filters: Array2<f64>,
    /// `[n_components·n_classes, n_channels]`.
    pub patterns: Array2<f64>,
}

impl SpatialTransform for FittedTransformer {
    fn transform(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        project(&self.filters, data)
    }
}
