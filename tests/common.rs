/// Shared helpers for the integration tests: seeded synthetic recordings.
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::Path;

use exg_spatial::{ChannelKind, Epochs, Event, Info};

#[allow(unused)]
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[allow(unused)]
pub fn channel_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("EEG {i:03}")).collect()
}

#[allow(unused)]
/// Largest element-wise difference, in logical (row-major) order.
pub fn max_abs_diff<'a, A, B>(a: A, b: B) -> f64
where
    A: IntoIterator<Item = &'a f64>,
    B: IntoIterator<Item = &'a f64>,
{
    let a: Vec<f64> = a.into_iter().copied().collect();
    let b: Vec<f64> = b.into_iter().copied().collect();
    assert_eq!(a.len(), b.len(), "length mismatch");
    a.iter().zip(&b).map(|(x, y)| (x - y).abs()).fold(0.0_f64, f64::max)
}

#[allow(unused)]
/// Per-class ERP waveform: a damped sinusoid whose frequency depends on the
/// class, `[n_times]`.
pub fn erp_waveform(class: i32, n_times: usize) -> Vec<f64> {
    let f = 0.05 + 0.03 * class as f64;
    (0..n_times)
        .map(|t| {
            let t = t as f64;
            (2.0 * std::f64::consts::PI * f * t).sin() * (-t / n_times as f64).exp()
        })
        .collect()
}

#[allow(unused)]
/// Continuous `[n_ch, n_samples]` recording: Gaussian noise plus, for every
/// event, its class ERP projected through a class-specific spatial pattern.
pub fn synthetic_raw(
    n_ch: usize,
    n_samples: usize,
    events: &[Event],
    n_times: usize,
    noise: f64,
    seed: u64,
) -> Array2<f64> {
    let mut rng = rng(seed);
    let normal = Normal::new(0.0, noise).unwrap();
    let mut data = Array2::from_shape_fn((n_ch, n_samples), |_| normal.sample(&mut rng));
    for ev in events {
        let wave = erp_waveform(ev.id, n_times);
        for c in 0..n_ch {
            let gain = ((c as f64 + 1.0) * ev.id as f64 * 0.7).cos();
            for (k, w) in wave.iter().enumerate() {
                if ev.onset + k < n_samples {
                    data[[c, ev.onset + k]] += gain * w;
                }
            }
        }
    }
    data
}

#[allow(unused)]
/// Non-overlapping two-class epochs cut from [`synthetic_raw`].
pub fn synthetic_epochs(n_ch: usize, n_per_class: usize, n_times: usize, seed: u64) -> Epochs {
    let gap = n_times * 2;
    let events: Vec<Event> = (0..2 * n_per_class)
        .map(|i| Event::new(10 + i * gap, 0, if i % 2 == 0 { 1 } else { 2 }))
        .collect();
    let n_samples = 10 + 2 * n_per_class * gap + n_times;
    let raw = synthetic_raw(n_ch, n_samples, &events, n_times, 0.3, seed);
    let data = Array3::from_shape_fn((events.len(), n_ch, n_times), |(e, c, t)| {
        raw[[c, events[e].onset + t]]
    });
    let info = Info::new(channel_names(n_ch), 100.0, ChannelKind::Eeg);
    Epochs::new(info, data, events, vec![("target".into(), 1), ("standard".into(), 2)], 0.0)
        .unwrap()
}

#[allow(unused)]
/// Write `data` (`[n_ch, n_t]`) as multiplexed little-endian `i16`.
pub fn write_multiplexed_i16(path: &Path, data: &Array2<i16>) {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for t in 0..data.ncols() {
        for c in 0..data.nrows() {
            bytes.extend_from_slice(&data[[c, t]].to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}
