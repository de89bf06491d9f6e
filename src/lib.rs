//! # exg-spatial: block-indexed raw reading and Xdawn denoising in pure Rust
//!
//! `exg-spatial` reads multiplexed raw sample files in bounded, calibrated
//! chunks and fits Xdawn spatial filters that enhance event-related
//! responses. The Xdawn estimator follows
//! [MNE-Python](https://mne.tools)'s `mne.preprocessing.Xdawn`, including
//! the least-squares correction for overlapping trials.
//!
//! No BLAS or LAPACK: [`linalg`] wraps `nalgebra`'s pure-Rust SVD,
//! symmetric eigensolver and Cholesky behind `ndarray` signatures.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.bin (multiplexed i16/i32/f32/f64)
//!   │
//!   ├─ raw::blk_read_lims()        read/write limits across fixed buffers
//!   ├─ raw::read_segments_file()   ≤ 100 MB chunks → select → calibrate
//!   ├─ raw::synthesize_stim_channel()   optional trigger row from events
//!   │
//!   ├─ Epochs::from_raw()          cut [tmin, tmax] around each event
//!   ├─ Xdawn::fit()                Σ_sig, per-class Σ_k, Σ_k w = λ Σ_sig w
//!   │     └─ least_square_evoked() Toeplitz regression when trials overlap
//!   │
//!   ├─ FittedXdawn::transform()    [E, C, T] → [E, n_components·n_classes, T]
//!   └─ FittedXdawn::apply()        { event → Raw | Epochs | Evoked, denoised }
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use exg_spatial::raw::{read_segments_file, Calibration, ChannelSelection,
//!                        SampleFormat, SegmentFile};
//! use exg_spatial::{ChannelKind, Epochs, Event, Info, Instance, Raw,
//!                   ReaderConfig, Xdawn, XdawnConfig};
//! use ndarray::Array2;
//!
//! // 1. Read 8 channels of little-endian i16 samples.
//! let file = SegmentFile::new("data/recording.bin", 8, SampleFormat::I16Le);
//! let n = file.n_samples().unwrap();
//! let mut data = Array2::<f64>::zeros((8, n));
//! read_segments_file(&file, &mut data, &ChannelSelection::All, 0, n,
//!                    &Calibration::None, None, &ReaderConfig::default()).unwrap();
//!
//! // 2. Wrap and epoch.
//! let names = (1..=8).map(|i| format!("EEG {i:03}")).collect();
//! let raw = Raw::new(Info::new(names, 256.0, ChannelKind::Eeg), data).unwrap();
//! let events = vec![Event::new(300, 0, 1), Event::new(700, 0, 2)];
//! let epochs = Epochs::from_raw(&raw, &events,
//!     vec![("target".into(), 1), ("standard".into(), 2)], -0.1, 0.6, None).unwrap();
//!
//! // 3. Fit and denoise.
//! let fitted = Xdawn::new(XdawnConfig::default()).fit(&epochs, None).unwrap();
//! let clean = fitted.apply(&Instance::Raw(raw), None, None, None).unwrap();
//! for (event, inst) in clean.iter() {
//!     println!("{event}: {} channels", inst.info().n_chan());
//! }
//! ```

pub mod config;
pub mod container;
pub mod covariance;
pub mod error;
pub mod io;
pub mod linalg;
pub mod raw;
pub mod xdawn;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{CorrectOverlap, ReaderConfig, Solver, XdawnConfig};

// containers
pub use container::{Baseline, ChannelKind, Epochs, Event, Evoked, Info, Instance, Raw};

// covariance
pub use covariance::{regularized_covariance, CovarianceEstimator, Regularization, ShrunkCovariance};

// errors
pub use error::{Error, Result};

// io: safetensors helpers
pub use io::{load_f64, StWriter};

// raw reader
pub use raw::{
    blk_read_lims, mult_cal_one, read_segments_blocked, read_segments_file,
    synthesize_stim_channel, BlockLimits, Calibration, ChannelSelection, SampleFormat,
    SegmentFile,
};

// xdawn
pub use xdawn::{
    ClassMap, FittedTransformer, FittedXdawn, SpatialTransform, Xdawn, XdawnTransformer,
};
