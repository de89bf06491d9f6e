//! Container-level Xdawn: fits on [`Epochs`], denoises any [`Instance`].
//!
//! ```text
//! Epochs ──fit──▶ FittedXdawn ──transform──▶ [n_epochs, n_components·n_classes, n_times]
//!                      │
//!                      └──apply(inst)──▶ { event name → denoised inst }
//!
//! apply, per class:   sources = F · X        F: [n_ch, n_ch], rows = components
//!                     sources[zeroed] = 0
//!                     X'      = P · sources  P: [n_ch, n_ch], columns = components
//! ```
use std::fmt;
use std::path::Path;

use ndarray::{s, Array2, Array3, Axis};
use tracing::{debug, info};

use crate::config::{CorrectOverlap, XdawnConfig};
use crate::container::{Epochs, Evoked, Instance};
use crate::covariance::{CovarianceEstimator, ShrunkCovariance};
use crate::error::{Error, Result};
use crate::io::StWriter;

use super::class_map::ClassMap;
use super::fit::{fit_xdawn, hstack_epochs, split_epochs, OverlapInfo};
use super::transformer::{project, SpatialTransform};

/// Class-aware Xdawn estimator.
pub struct Xdawn {
    pub config: XdawnConfig,
    estimator: Box<dyn CovarianceEstimator>,
}

impl fmt::Debug for Xdawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xdawn").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Default for Xdawn {
    fn default() -> Self {
        Self::new(XdawnConfig::default())
    }
}

impl Xdawn {
    pub fn new(config: XdawnConfig) -> Self {
        Self { config, estimator: Box::new(ShrunkCovariance) }
    }

    /// Use a custom covariance estimator for both signal and class
    /// covariances.
    pub fn with_estimator(config: XdawnConfig, estimator: Box<dyn CovarianceEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Whether the trials of `epochs` overlap under `policy`.
    ///
    /// `Auto` compares the smallest gap between sorted onsets with the epoch
    /// window `(tmax − tmin)·sfreq` (truncated to whole samples).
    pub fn resolve_overlap(policy: CorrectOverlap, epochs: &Epochs) -> bool {
        match policy {
            CorrectOverlap::Always => true,
            CorrectOverlap::Never => false,
            CorrectOverlap::Auto => {
                let mut onsets: Vec<usize> = epochs.events.iter().map(|e| e.onset).collect();
                onsets.sort_unstable();
                let window = ((epochs.tmax() - epochs.tmin) * epochs.info.sfreq) as usize;
                onsets
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .min()
                    .is_some_and(|isi| isi < window)
            }
        }
    }

    /// Fit on the data channels of `epochs`. `labels` defaults to the event
    /// codes.
    ///
    /// All components are kept; [`FittedXdawn::transform`] and the default
    /// exclusion of [`FittedXdawn::apply`] use `config.n_components`.
    pub fn fit(&self, epochs: &Epochs, labels: Option<&[i32]>) -> Result<FittedXdawn> {
        let picks = epochs.info.data_picks();
        if picks.is_empty() {
            return Err(Error::config("epochs have no data channels"));
        }
        let n_ch = picks.len();
        if self.config.n_components == 0 || self.config.n_components > n_ch {
            return Err(Error::config(format!(
                "n_components must be in 1..={n_ch}, got {}",
                self.config.n_components
            )));
        }

        let data = epochs.data.select(Axis(1), &picks);
        let event_labels;
        let labels = match labels {
            Some(l) => l,
            None => {
                event_labels = epochs.labels();
                &event_labels[..]
            }
        };

        let correct_overlap = Self::resolve_overlap(self.config.correct_overlap, epochs);
        if correct_overlap && epochs.baseline.is_some() {
            return Err(Error::config("cannot correct overlap if epochs were baselined"));
        }
        debug!(correct_overlap, n_channels = n_ch, n_epochs = epochs.n_epochs(), "fitting xdawn");

        let onsets: Vec<usize> = epochs.events.iter().map(|e| e.onset).collect();
        let overlap = correct_overlap.then_some(OverlapInfo {
            onsets: &onsets,
            solver: self.config.solver,
        });

        let fit = fit_xdawn(
            &data,
            labels,
            n_ch,
            &self.config.reg,
            self.config.signal_cov.as_ref(),
            overlap,
            self.estimator.as_ref(),
        )?;

        let info = epochs.info.pick(&picks);
        let mut filters = ClassMap::new();
        let mut patterns = ClassMap::new();
        let mut evokeds = ClassMap::new();
        for (k, &code) in fit.classes.iter().enumerate() {
            let name = epochs
                .event_id
                .iter()
                .find(|(_, id)| *id == code)
                .map(|(n, _)| n.clone())
                .unwrap_or_else(|| code.to_string());
            let nave = labels.iter().filter(|&&l| l == code).count();
            filters.insert(name.clone(), fit.filters[k].clone());
            patterns.insert(name.clone(), fit.patterns[k].clone());
            evokeds.insert(
                name.clone(),
                Evoked {
                    info: info.clone(),
                    data: fit.evokeds[k].clone(),
                    tmin: epochs.tmin,
                    comment: name,
                    nave,
                },
            );
        }

        Ok(FittedXdawn {
            n_components: self.config.n_components,
            classes: fit.classes,
            filters,
            patterns,
            evokeds,
            event_id: epochs.event_id.clone(),
            correct_overlap,
        })
    }
}

/// Immutable result of [`Xdawn::fit`]. Maps iterate in ascending event code.
#[derive(Debug, Clone)]
pub struct FittedXdawn {
    pub n_components: usize,
    /// Event codes, ascending.
    pub classes: Vec<i32>,
    /// `[n_channels, n_channels]` per class, rows = components.
    pub filters: ClassMap<Array2<f64>>,
    /// `[n_channels, n_channels]` per class, columns = components.
    pub patterns: ClassMap<Array2<f64>>,
    pub evokeds: ClassMap<Evoked>,
    pub event_id: Vec<(String, i32)>,
    /// Whether overlap correction was used at fit time.
    pub correct_overlap: bool,
}

impl FittedXdawn {
    /// Number of fitted channels (= components per class).
    pub fn n_channels(&self) -> usize {
        self.filters.values().next().map_or(0, |f| f.ncols())
    }

    /// The first `n_components` filters of every class, stacked.
    pub fn stacked_filters(&self) -> Array2<f64> {
        let n = self.n_components;
        let n_cls = self.filters.len();
        let mut out = Array2::<f64>::zeros((n * n_cls, self.n_channels()));
        for (k, f) in self.filters.values().enumerate() {
            out.slice_mut(s![k * n..(k + 1) * n, ..]).assign(&f.slice(s![..n, ..]));
        }
        out
    }

    /// Spatially filter the data channels of `epochs`.
    pub fn transform_epochs(&self, epochs: &Epochs) -> Result<Array3<f64>> {
        let picks = epochs.info.data_picks();
        self.transform(&epochs.data.select(Axis(1), &picks))
    }

    /// Denoise `inst` once per requested class.
    ///
    /// Components not in `include` are zeroed when `include` is non-empty;
    /// otherwise components `n_components..` plus any in `exclude` are
    /// zeroed. Only data channels are touched.
    pub fn apply(
        &self,
        inst: &Instance,
        event_ids: Option<&[&str]>,
        include: Option<&[usize]>,
        exclude: Option<&[usize]>,
    ) -> Result<ClassMap<Instance>> {
        let names: Vec<&str> = match event_ids {
            Some(ids) => ids.to_vec(),
            None => self.filters.keys().collect(),
        };
        for name in &names {
            if !self.filters.contains_key(name) {
                return Err(Error::config(format!("unknown event '{name}'")));
            }
        }

        let n_ch = self.n_channels();
        let mut zeroed: Vec<usize> = (self.n_components..n_ch).collect();
        zeroed.extend(exclude.unwrap_or_default());
        zeroed.sort_unstable();
        zeroed.dedup();
        let include = include.unwrap_or_default();
        if let Some(&bad) = include.iter().chain(&zeroed).find(|&&i| i >= n_ch) {
            return Err(Error::config(format!(
                "component index {bad} out of range for {n_ch} components"
            )));
        }

        let picks = inst.info().data_picks();
        let mut out = ClassMap::new();
        match inst {
            Instance::Raw(raw) => {
                if !raw.preload {
                    return Err(Error::config("raw data must be preloaded to apply Xdawn"));
                }
                let data = raw.data.select(Axis(0), &picks);
                for &name in &names {
                    let clean = self.pick_sources(&data, include, &zeroed, name)?;
                    let mut raw_r = raw.clone();
                    for (i, &p) in picks.iter().enumerate() {
                        raw_r.data.row_mut(p).assign(&clean.row(i));
                    }
                    out.insert(name, Instance::Raw(raw_r));
                }
            }
            Instance::Epochs(epochs) => {
                if !epochs.preload {
                    return Err(Error::config("epochs must be preloaded to apply Xdawn"));
                }
                let data = hstack_epochs(&epochs.data.select(Axis(1), &picks));
                for &name in &names {
                    let clean = split_epochs(
                        &self.pick_sources(&data, include, &zeroed, name)?,
                        epochs.n_epochs(),
                    );
                    let mut epochs_r = epochs.clone();
                    for (i, &p) in picks.iter().enumerate() {
                        epochs_r
                            .data
                            .slice_mut(s![.., p, ..])
                            .assign(&clean.slice(s![.., i, ..]));
                    }
                    out.insert(name, Instance::Epochs(epochs_r));
                }
            }
            Instance::Evoked(evoked) => {
                let data = evoked.data.select(Axis(0), &picks);
                for &name in &names {
                    let clean = self.pick_sources(&data, include, &zeroed, name)?;
                    let mut evoked_r = evoked.clone();
                    for (i, &p) in picks.iter().enumerate() {
                        evoked_r.data.row_mut(p).assign(&clean.row(i));
                    }
                    out.insert(name, Instance::Evoked(evoked_r));
                }
            }
        }
        Ok(out)
    }

    fn pick_sources(
        &self,
        data: &Array2<f64>,
        include: &[usize],
        exclude: &[usize],
        name: &str,
    ) -> Result<Array2<f64>> {
        let filters = &self.filters[name];
        let patterns = &self.patterns[name];
        if filters.ncols() != data.nrows() {
            return Err(Error::config(format!(
                "data must have {} channels, got {} instead",
                filters.ncols(),
                data.nrows()
            )));
        }

        info!("Transforming to Xdawn space");
        let mut sources = filters.dot(data);

        if !include.is_empty() {
            let mut n_zeroed = 0;
            for (i, mut row) in sources.rows_mut().into_iter().enumerate() {
                if !include.contains(&i) {
                    row.fill(0.0);
                    n_zeroed += 1;
                }
            }
            info!("Zeroing out {n_zeroed} Xdawn components");
        } else if !exclude.is_empty() {
            for &i in exclude {
                sources.row_mut(i).fill(0.0);
            }
            info!("Zeroing out {} Xdawn components", exclude.len());
        }

        info!("Inverse transforming to sensor space");
        Ok(patterns.dot(&sources))
    }

    /// Dump `classes`, `filters_<name>`, `patterns_<name>` and
    /// `evoked_<name>` to a safetensors file, plus `denoised_<name>` for
    /// every entry of `denoised` (the output of [`FittedXdawn::apply`]).
    pub fn write_safetensors(
        &self,
        path: &Path,
        denoised: Option<&ClassMap<Instance>>,
    ) -> Result<()> {
        let mut w = StWriter::new();
        w.add_i32("classes", &self.classes);
        for (name, f) in self.filters.iter() {
            w.add_array(&format!("filters_{name}"), f);
            w.add_array(&format!("patterns_{name}"), &self.patterns[name]);
            w.add_array(&format!("evoked_{name}"), &self.evokeds[name].data);
        }
        for (name, inst) in denoised.into_iter().flat_map(|m| m.iter()) {
            let key = format!("denoised_{name}");
            match inst {
                Instance::Raw(r) => w.add_array(&key, &r.data),
                Instance::Epochs(e) => w.add_array(&key, &e.data),
                Instance::Evoked(e) => w.add_array(&key, &e.data),
            }
        }
        debug!(n_tensors = w.len(), path = %path.display(), "writing fitted xdawn");
        w.write(path)
    }
}

impl SpatialTransform for FittedXdawn {
    fn transform(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        project(&self.stacked_filters(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ChannelKind, Event, Info, Raw};
    use approx::assert_abs_diff_eq;

    fn epochs(onsets: &[usize], n_times: usize) -> Epochs {
        let names = (0..3).map(|i| format!("EEG {i}")).collect();
        let info = Info::new(names, 100.0, ChannelKind::Eeg);
        let data = Array3::from_shape_fn((onsets.len(), 3, n_times), |(e, c, t)| {
            let x = t as f64 * 0.21 + e as f64 * 1.3;
            let erp = if e % 2 == 0 { (0.3 * t as f64).sin() } else { 0.0 };
            match c {
                0 => x.sin() + erp,
                1 => (1.9 * x).cos() - 0.5 * erp,
                _ => (0.6 * x).sin() + 0.2 * (3.1 * x).cos(),
            }
        });
        let events = onsets
            .iter()
            .enumerate()
            .map(|(i, &o)| Event::new(o, 0, if i % 2 == 0 { 1 } else { 2 }))
            .collect();
        Epochs::new(info, data, events, vec![("aud".into(), 1), ("vis".into(), 2)], 0.0).unwrap()
    }

    #[test]
    fn auto_overlap_follows_inter_onset_interval() {
        let spaced = epochs(&[0, 100, 200, 300], 20);
        assert!(!Xdawn::resolve_overlap(CorrectOverlap::Auto, &spaced));
        let dense = epochs(&[0, 10, 200, 300], 20);
        assert!(Xdawn::resolve_overlap(CorrectOverlap::Auto, &dense));
        assert!(Xdawn::resolve_overlap(CorrectOverlap::Always, &spaced));
        assert!(!Xdawn::resolve_overlap(CorrectOverlap::Never, &dense));
    }

    #[test]
    fn baseline_with_overlap_correction_is_rejected() {
        let mut ep = epochs(&[0, 10, 20, 30], 20);
        ep.baseline = Some((None, Some(0.0)));
        let err = Xdawn::default().fit(&ep, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn maps_are_keyed_by_event_name() {
        let fitted = Xdawn::default().fit(&epochs(&[0, 100, 200, 300, 400, 500], 20), None).unwrap();
        assert_eq!(fitted.filters.keys().collect::<Vec<_>>(), vec!["aud", "vis"]);
        assert_eq!(fitted.filters["aud"].dim(), (3, 3));
        assert_eq!(fitted.evokeds["vis"].nave, 3);
        assert!(!fitted.correct_overlap);
    }

    #[test]
    fn keeping_every_component_reproduces_the_input() {
        let ep = epochs(&[0, 100, 200, 300, 400, 500], 20);
        let fitted = Xdawn::default().fit(&ep, None).unwrap();
        let evoked = ep.average().unwrap();
        let out = fitted
            .apply(&Instance::Evoked(evoked.clone()), Some(&["aud"]), Some(&[0, 1, 2]), None)
            .unwrap();
        let Instance::Evoked(clean) = &out["aud"] else {
            panic!("expected evoked output");
        };
        for (a, b) in clean.data.iter().zip(evoked.data.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn unknown_event_and_unloaded_raw_are_config_errors() {
        let ep = epochs(&[0, 100, 200, 300], 20);
        let fitted = Xdawn::default().fit(&ep, None).unwrap();
        let mut raw = Raw::new(ep.info.clone(), Array2::zeros((3, 50))).unwrap();
        assert!(matches!(
            fitted.apply(&Instance::Raw(raw.clone()), Some(&["tactile"]), None, None),
            Err(Error::Config(_))
        ));
        raw.preload = false;
        assert!(matches!(
            fitted.apply(&Instance::Raw(raw), None, None, None),
            Err(Error::Config(_))
        ));
    }
}
