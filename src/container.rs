//! Minimal recording containers: continuous [`Raw`], segmented [`Epochs`]
//! and averaged [`Evoked`] data, plus the [`Instance`] variant that
//! [`FittedXdawn::apply`](crate::FittedXdawn::apply) dispatches over.
//!
//! Only the pieces the reader and Xdawn need are modelled: channel metadata,
//! events, epoch timing, baseline state and the preload flag.
use ndarray::{s, Array2, Array3, Axis};

use crate::error::{Error, Result};

/// One event: onset sample, duration in samples, trigger code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub onset: usize,
    pub duration: usize,
    pub id: i32,
}

impl Event {
    pub fn new(onset: usize, duration: usize, id: i32) -> Self {
        Self { onset, duration, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Eeg,
    Meg,
    Eog,
    Stim,
    Misc,
}

impl ChannelKind {
    /// Channels that carry brain/physiological data (not triggers/misc).
    #[inline]
    pub fn is_data(self) -> bool {
        matches!(self, ChannelKind::Eeg | ChannelKind::Meg | ChannelKind::Eog)
    }
}

/// Channel metadata shared by all containers.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    pub ch_kinds: Vec<ChannelKind>,
    pub bads: Vec<String>,
}

impl Info {
    /// Info where every channel has the same kind.
    pub fn new(ch_names: Vec<String>, sfreq: f64, kind: ChannelKind) -> Self {
        let ch_kinds = vec![kind; ch_names.len()];
        Self { sfreq, ch_names, ch_kinds, bads: vec![] }
    }

    #[inline]
    pub fn n_chan(&self) -> usize {
        self.ch_names.len()
    }

    /// Indices of data channels that are not marked bad.
    pub fn data_picks(&self) -> Vec<usize> {
        self.ch_kinds
            .iter()
            .enumerate()
            .filter(|(i, k)| k.is_data() && !self.bads.contains(&self.ch_names[*i]))
            .map(|(i, _)| i)
            .collect()
    }

    /// Info restricted to `picks`, in pick order.
    pub fn pick(&self, picks: &[usize]) -> Info {
        let ch_names: Vec<String> = picks.iter().map(|&i| self.ch_names[i].clone()).collect();
        let bads = self.bads.iter().filter(|b| ch_names.contains(*b)).cloned().collect();
        Info {
            sfreq: self.sfreq,
            ch_kinds: picks.iter().map(|&i| self.ch_kinds[i]).collect(),
            ch_names,
            bads,
        }
    }
}

/// Continuous recording, `data` is `[n_channels, n_times]`.
#[derive(Debug, Clone)]
pub struct Raw {
    pub info: Info,
    pub data: Array2<f64>,
    pub preload: bool,
}

impl Raw {
    pub fn new(info: Info, data: Array2<f64>) -> Result<Self> {
        if data.nrows() != info.n_chan() {
            return Err(Error::config(format!(
                "raw data has {} rows but info lists {} channels",
                data.nrows(),
                info.n_chan()
            )));
        }
        Ok(Self { info, data, preload: true })
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }
}

/// Baseline window `(start, end)` in seconds; `None` ends mean the epoch
/// edges.
pub type Baseline = (Option<f64>, Option<f64>);

/// Segmented trials, `data` is `[n_epochs, n_channels, n_times]`.
#[derive(Debug, Clone)]
pub struct Epochs {
    pub info: Info,
    pub data: Array3<f64>,
    /// One event per epoch, in storage order.
    pub events: Vec<Event>,
    /// Event name → trigger code.
    pub event_id: Vec<(String, i32)>,
    /// Time of the first sample relative to the event, in seconds.
    pub tmin: f64,
    /// Baseline window applied to `data`, if any.
    pub baseline: Option<Baseline>,
    pub preload: bool,
}

impl Epochs {
    /// Wrap existing epoch data (no baseline applied).
    pub fn new(
        info: Info,
        data: Array3<f64>,
        events: Vec<Event>,
        event_id: Vec<(String, i32)>,
        tmin: f64,
    ) -> Result<Self> {
        let (n_epochs, n_ch, _) = data.dim();
        if events.len() != n_epochs {
            return Err(Error::config(format!(
                "{} events for {n_epochs} epochs",
                events.len()
            )));
        }
        if n_ch != info.n_chan() {
            return Err(Error::config(format!(
                "epochs have {n_ch} channels but info lists {}",
                info.n_chan()
            )));
        }
        Ok(Self { info, data, events, event_id, tmin, baseline: None, preload: true })
    }

    /// Cut epochs `[tmin, tmax]` (seconds, inclusive) around each event whose
    /// code appears in `event_id`. Events whose window falls off the data
    /// are dropped.
    pub fn from_raw(
        raw: &Raw,
        events: &[Event],
        event_id: Vec<(String, i32)>,
        tmin: f64,
        tmax: f64,
        baseline: Option<Baseline>,
    ) -> Result<Self> {
        if tmax < tmin {
            return Err(Error::config(format!("tmax ({tmax}) < tmin ({tmin})")));
        }
        let sfreq = raw.info.sfreq;
        let tmin_s = (tmin * sfreq).round() as i64;
        let tmax_s = (tmax * sfreq).round() as i64;
        let n_times = (tmax_s - tmin_s + 1) as usize;

        let kept: Vec<Event> = events
            .iter()
            .filter(|ev| event_id.iter().any(|(_, id)| *id == ev.id))
            .filter(|ev| {
                let start = ev.onset as i64 + tmin_s;
                start >= 0 && start as usize + n_times <= raw.n_times()
            })
            .copied()
            .collect();
        if kept.is_empty() {
            return Err(Error::config("no events fall inside the recording"));
        }

        let mut data = Array3::<f64>::zeros((kept.len(), raw.info.n_chan(), n_times));
        for (e, ev) in kept.iter().enumerate() {
            let start = (ev.onset as i64 + tmin_s) as usize;
            data.slice_mut(s![e, .., ..])
                .assign(&raw.data.slice(s![.., start..start + n_times]));
        }

        let mut epochs = Epochs::new(raw.info.clone(), data, kept, event_id, tmin)?;
        if let Some(bl) = baseline {
            epochs.apply_baseline(bl)?;
        }
        Ok(epochs)
    }

    #[inline]
    pub fn n_epochs(&self) -> usize {
        self.data.shape()[0]
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.shape()[2]
    }

    /// Time of the last sample, in seconds.
    pub fn tmax(&self) -> f64 {
        self.tmin + (self.n_times() as f64 - 1.0) / self.info.sfreq
    }

    /// Trigger code of every epoch, in storage order.
    pub fn labels(&self) -> Vec<i32> {
        self.events.iter().map(|e| e.id).collect()
    }

    /// Number of epochs labelled with the event called `name`.
    pub fn count(&self, name: &str) -> usize {
        match self.event_id.iter().find(|(n, _)| n == name) {
            Some(&(_, id)) => self.events.iter().filter(|e| e.id == id).count(),
            None => 0,
        }
    }

    /// Subtract, per epoch and channel, the mean over the baseline window.
    pub fn apply_baseline(&mut self, baseline: Baseline) -> Result<()> {
        let sfreq = self.info.sfreq;
        let n_times = self.n_times();
        let to_idx = |t: f64| ((t - self.tmin) * sfreq).round().max(0.0) as usize;
        let b0 = baseline.0.map_or(0, to_idx);
        let b1 = baseline.1.map_or(n_times, |t| (to_idx(t) + 1).min(n_times));
        if b0 >= b1 {
            return Err(Error::config(format!("empty baseline window {baseline:?}")));
        }
        let means = self.data.slice(s![.., .., b0..b1]).mean_axis(Axis(2));
        if let Some(means) = means {
            self.data -= &means.insert_axis(Axis(2));
        }
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Average over all epochs.
    pub fn average(&self) -> Result<Evoked> {
        let data = self
            .data
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::config("cannot average zero epochs"))?;
        Ok(Evoked {
            info: self.info.clone(),
            data,
            tmin: self.tmin,
            comment: String::from("average"),
            nave: self.n_epochs(),
        })
    }
}

/// Averaged response, `data` is `[n_channels, n_times]`.
#[derive(Debug, Clone)]
pub struct Evoked {
    pub info: Info,
    pub data: Array2<f64>,
    pub tmin: f64,
    pub comment: String,
    /// Number of epochs averaged.
    pub nave: usize,
}

/// Any container `apply` accepts.
#[derive(Debug, Clone)]
pub enum Instance {
    Raw(Raw),
    Epochs(Epochs),
    Evoked(Evoked),
}

impl Instance {
    pub fn info(&self) -> &Info {
        match self {
            Instance::Raw(r) => &r.info,
            Instance::Epochs(e) => &e.info,
            Instance::Evoked(e) => &e.info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("EEG {:03}", i + 1)).collect()
    }

    #[test]
    fn data_picks_skip_stim_and_bads() {
        let mut info = Info::new(names(4), 100.0, ChannelKind::Eeg);
        info.ch_kinds[3] = ChannelKind::Stim;
        info.bads.push("EEG 002".into());
        assert_eq!(info.data_picks(), vec![0, 2]);
        let picked = info.pick(&[2, 1]);
        assert_eq!(picked.ch_names, vec!["EEG 003", "EEG 002"]);
        assert_eq!(picked.bads, vec!["EEG 002"]);
    }

    #[test]
    fn from_raw_drops_events_off_the_edges() {
        let info = Info::new(names(2), 10.0, ChannelKind::Eeg);
        let data = Array2::from_shape_fn((2, 100), |(c, t)| (c * 1000 + t) as f64);
        let raw = Raw::new(info, data).unwrap();
        let events = [Event::new(1, 0, 1), Event::new(50, 0, 1), Event::new(97, 0, 2)];
        let ep = Epochs::from_raw(
            &raw,
            &events,
            vec![("a".into(), 1), ("b".into(), 2)],
            -0.2,
            0.3,
            None,
        )
        .unwrap();
        assert_eq!(ep.n_epochs(), 1);
        assert_eq!(ep.n_times(), 6);
        assert_eq!(ep.data[[0, 1, 0]], 1048.0);
        assert_abs_diff_eq!(ep.tmax(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn baseline_zeroes_pre_stimulus_mean() {
        let info = Info::new(names(1), 10.0, ChannelKind::Eeg);
        let data = Array3::from_shape_fn((2, 1, 5), |(e, _, t)| (e + 1) as f64 * 3.0 + t as f64);
        let mut ep = Epochs::new(info, data, vec![Event::new(0, 0, 1); 2], vec![("a".into(), 1)], -0.2)
            .unwrap();
        ep.apply_baseline((None, Some(0.0))).unwrap();
        for e in 0..2 {
            let m = ep.data.slice(s![e, 0, 0..3]).mean().unwrap();
            assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
        }
        assert!(ep.baseline.is_some());
    }

    #[test]
    fn count_by_name() {
        let info = Info::new(names(1), 10.0, ChannelKind::Eeg);
        let events = vec![Event::new(0, 0, 1), Event::new(10, 0, 2), Event::new(20, 0, 1)];
        let ep = Epochs::new(
            info,
            Array3::zeros((3, 1, 4)),
            events,
            vec![("a".into(), 1), ("b".into(), 2)],
            0.0,
        )
        .unwrap();
        assert_eq!(ep.count("a"), 2);
        assert_eq!(ep.count("b"), 1);
        assert_eq!(ep.count("c"), 0);
    }
}
