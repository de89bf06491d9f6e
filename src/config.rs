//! Reader and Xdawn configuration.
//!
//! Both structs have `pub` fields and a [`Default`] impl so they can be built
//! with struct-update syntax:
//!
//! ```
//! use exg_spatial::{Regularization, XdawnConfig};
//!
//! let cfg = XdawnConfig {
//!     n_components: 3,
//!     reg: Regularization::LedoitWolf,
//!     ..XdawnConfig::default()
//! };
//! assert_eq!(cfg.n_components, 3);
//! ```
use std::str::FromStr;

use ndarray::Array2;

use crate::covariance::Regularization;
use crate::error::{Error, Result};

/// Configuration for [`read_segments_file`](crate::raw::read_segments_file).
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Upper bound on the bytes pulled from disk per chunk.
    ///
    /// The effective chunk is rounded down to a whole number of time points
    /// (a multiple of the on-disk channel count), with a floor of one time
    /// point.
    ///
    /// Default: `100_000_000` (100 MB).
    pub max_chunk_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { max_chunk_bytes: 100_000_000 }
    }
}

/// Whether [`Xdawn::fit`](crate::Xdawn::fit) deconvolves overlapping trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectOverlap {
    /// Correct only when the smallest inter-onset interval is shorter than
    /// the epoch window.
    #[default]
    Auto,
    Always,
    Never,
}

/// Least-squares strategy for the overlap-correcting regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Solver {
    /// `β = pinv(X) · y`.
    #[default]
    Pinv,
    /// `β = (XᵀX)⁻¹ Xᵀy` through a Cholesky factorisation.
    Cholesky,
}

impl Solver {
    /// Look a solver up by name (`"pinv"` or `"cholesky"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pinv" => Some(Solver::Pinv),
            "cholesky" => Some(Solver::Cholesky),
            _ => None,
        }
    }
}

impl FromStr for Solver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Solver::from_name(s).ok_or_else(|| {
            Error::config(format!("unknown solver '{s}' (expected 'pinv' or 'cholesky')"))
        })
    }
}

/// Configuration for the Xdawn estimators.
#[derive(Debug, Clone)]
pub struct XdawnConfig {
    /// Components kept per class by `transform` and by the default `apply`
    /// exclusion set.
    ///
    /// Default: `2`.
    pub n_components: usize,

    /// Covariance regularisation for both the signal and the class
    /// covariances.
    ///
    /// Default: [`Regularization::None`] (sample covariance).
    pub reg: Regularization,

    /// Pre-computed `[n_channels, n_channels]` signal covariance. Estimated
    /// from the pooled epochs when `None`.
    ///
    /// Default: `None`.
    pub signal_cov: Option<Array2<f64>>,

    /// Overlap correction policy (class-aware estimator only).
    ///
    /// Default: [`CorrectOverlap::Auto`].
    pub correct_overlap: CorrectOverlap,

    /// Regression solver used when overlap correction is active.
    ///
    /// Default: [`Solver::Pinv`].
    pub solver: Solver,
}

impl Default for XdawnConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            reg: Regularization::None,
            signal_cov: None,
            correct_overlap: CorrectOverlap::Auto,
            solver: Solver::Pinv,
        }
    }
}
