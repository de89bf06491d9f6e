//! Covariance estimation with optional shrinkage.
//!
//! `data` is always `[n_channels, n_samples]`.
//!
//! | [`Regularization`] | estimate |
//! |---|---|
//! | `None` | unbiased sample covariance, `XcXcᵀ / (n − 1)` |
//! | `Shrinkage(s)` | `(1 − s)·S + s·μ·I` |
//! | `LedoitWolf` | same form, `s` from the Ledoit–Wolf formula |
//! | `Oas` | same form, `s` from Oracle Approximating Shrinkage |
//!
//! with `S = XcXcᵀ / n` (biased) and `μ = tr(S) / n_channels`.
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Covariance regularisation mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Regularization {
    #[default]
    None,
    /// Fixed shrinkage fraction in `[0, 1]`.
    Shrinkage(f64),
    LedoitWolf,
    Oas,
}

impl Regularization {
    /// Automatic shrinkage estimator by name: `"ledoit_wolf"` or `"oas"`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ledoit_wolf" => Ok(Regularization::LedoitWolf),
            "oas" => Ok(Regularization::Oas),
            other => Err(Error::config(format!(
                "unknown regularization '{other}' (expected 'ledoit_wolf' or 'oas')"
            ))),
        }
    }

    /// Reject shrinkage fractions outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if let Regularization::Shrinkage(s) = *self {
            if !(0.0..=1.0).contains(&s) {
                return Err(Error::config(format!(
                    "shrinkage must satisfy 0 <= shrinkage <= 1, got {s}"
                )));
            }
        }
        Ok(())
    }
}

/// Parses `none`, a float shrinkage, `ledoit_wolf` or `oas`.
impl FromStr for Regularization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Regularization::None);
        }
        if let Ok(v) = s.parse::<f64>() {
            let reg = Regularization::Shrinkage(v);
            reg.validate()?;
            return Ok(reg);
        }
        Regularization::from_name(s)
    }
}

/// Something that turns `[n_channels, n_samples]` data into a covariance.
pub trait CovarianceEstimator {
    fn estimate(&self, data: ArrayView2<f64>, reg: &Regularization) -> Result<Array2<f64>>;
}

/// Default estimator: sample covariance plus the shrinkage family.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShrunkCovariance;

impl CovarianceEstimator for ShrunkCovariance {
    fn estimate(&self, data: ArrayView2<f64>, reg: &Regularization) -> Result<Array2<f64>> {
        regularized_covariance(data, reg)
    }
}

fn centered(data: ArrayView2<f64>) -> Result<Array2<f64>> {
    let mean = data
        .mean_axis(Axis(1))
        .ok_or_else(|| Error::config("covariance of data with no samples"))?;
    Ok(&data - &mean.insert_axis(Axis(1)))
}

fn shrunk(emp: Array2<f64>, shrinkage: f64) -> Array2<f64> {
    let p = emp.nrows();
    let mu = emp.diag().sum() / p as f64;
    let mut cov = emp * (1.0 - shrinkage);
    for i in 0..p {
        cov[[i, i]] += shrinkage * mu;
    }
    cov
}

fn ledoit_wolf_shrinkage(xc: &Array2<f64>, emp: &Array2<f64>) -> f64 {
    let (p, n) = xc.dim();
    let (p_f, n_f) = (p as f64, n as f64);
    let x2 = xc.mapv(|v| v * v);
    let trace_terms = x2.sum_axis(Axis(1)) / n_f;
    let mu = trace_terms.sum() / p_f;

    let beta_: f64 = x2.sum_axis(Axis(0)).iter().map(|s| s * s).sum();
    let delta_: f64 = emp.iter().map(|v| v * v).sum();

    let beta = (beta_ / n_f - delta_) / (p_f * n_f);
    let delta = (delta_ - 2.0 * mu * trace_terms.sum() + p_f * mu * mu) / p_f;
    let beta = beta.min(delta);
    if beta == 0.0 {
        0.0
    } else {
        beta / delta
    }
}

fn oas_shrinkage(emp: &Array2<f64>, n_samples: usize) -> f64 {
    let p = emp.nrows() as f64;
    let mu = emp.diag().sum() / p;
    let alpha = emp.iter().map(|v| v * v).sum::<f64>() / (p * p);
    let num = alpha + mu * mu;
    let den = (n_samples as f64 + 1.0) * (alpha - mu * mu / p);
    if den == 0.0 {
        1.0
    } else {
        (num / den).min(1.0)
    }
}

/// Estimate the `[n_channels, n_channels]` covariance of `data`.
pub fn regularized_covariance(data: ArrayView2<f64>, reg: &Regularization) -> Result<Array2<f64>> {
    reg.validate()?;
    let n = data.ncols();
    let xc = centered(data)?;
    match *reg {
        Regularization::None => {
            if n < 2 {
                return Err(Error::config(
                    "sample covariance needs at least two samples",
                ));
            }
            Ok(xc.dot(&xc.t()) / (n - 1) as f64)
        }
        Regularization::Shrinkage(s) => {
            let emp = xc.dot(&xc.t()) / n as f64;
            Ok(shrunk(emp, s))
        }
        Regularization::LedoitWolf => {
            let emp = xc.dot(&xc.t()) / n as f64;
            let s = ledoit_wolf_shrinkage(&xc, &emp);
            Ok(shrunk(emp, s))
        }
        Regularization::Oas => {
            let emp = xc.dot(&xc.t()) / n as f64;
            let s = oas_shrinkage(&emp, n);
            Ok(shrunk(emp, s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sample() -> Array2<f64> {
        Array2::from_shape_fn((3, 200), |(c, t)| {
            let x = t as f64 * 0.37;
            match c {
                0 => x.sin(),
                1 => 0.5 * x.sin() + (1.3 * x).cos(),
                _ => (2.1 * x).sin() * 0.3,
            }
        })
    }

    #[test]
    fn sample_covariance_matches_hand_computation() {
        let d = array![[1.0, 2.0, 3.0, 4.0], [2.0, 1.0, 0.0, 1.0]];
        let c = regularized_covariance(d.view(), &Regularization::None).unwrap();
        assert_abs_diff_eq!(c[[0, 0]], 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[1, 1]], 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[0, 1]], -2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[1, 0]], c[[0, 1]], epsilon = 1e-15);
    }

    #[test]
    fn full_shrinkage_is_scaled_identity() {
        let d = sample();
        let c = regularized_covariance(d.view(), &Regularization::Shrinkage(1.0)).unwrap();
        assert_abs_diff_eq!(c[[0, 1]], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(c[[0, 0]], c[[2, 2]], epsilon = 1e-12);
    }

    #[test]
    fn shrinkage_preserves_trace() {
        let d = sample();
        let emp = regularized_covariance(d.view(), &Regularization::Shrinkage(0.0)).unwrap();
        for reg in [Regularization::Shrinkage(0.3), Regularization::LedoitWolf, Regularization::Oas] {
            let c = regularized_covariance(d.view(), &reg).unwrap();
            assert_abs_diff_eq!(c.diag().sum(), emp.diag().sum(), epsilon = 1e-10);
        }
    }

    #[test]
    fn automatic_shrinkage_is_a_fraction() {
        let d = sample();
        let xc = centered(d.view()).unwrap();
        let emp = xc.dot(&xc.t()) / d.ncols() as f64;
        let lw = ledoit_wolf_shrinkage(&xc, &emp);
        let oas = oas_shrinkage(&emp, d.ncols());
        assert!((0.0..=1.0).contains(&lw), "ledoit-wolf shrinkage {lw}");
        assert!((0.0..=1.0).contains(&oas), "oas shrinkage {oas}");
    }

    #[test]
    fn invalid_specs_are_config_errors() {
        let d = sample();
        assert!(matches!(
            regularized_covariance(d.view(), &Regularization::Shrinkage(1.5)),
            Err(Error::Config(_))
        ));
        assert!(matches!(Regularization::from_name("diagonal"), Err(Error::Config(_))));
        assert!(matches!("-0.1".parse::<Regularization>(), Err(Error::Config(_))));
    }

    #[test]
    fn parse_names_and_floats() {
        assert_eq!("none".parse::<Regularization>().unwrap(), Regularization::None);
        assert_eq!("0.25".parse::<Regularization>().unwrap(), Regularization::Shrinkage(0.25));
        assert_eq!("oas".parse::<Regularization>().unwrap(), Regularization::Oas);
        assert_eq!("ledoit_wolf".parse::<Regularization>().unwrap(), Regularization::LedoitWolf);
    }
}
