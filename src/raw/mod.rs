//! Block-indexed raw-data reading.
//!
//! - [`blocks`]: read/write limits for ranges that straddle fixed buffers.
//! - [`segments`]: chunked, calibrated reads of multiplexed sample files.
//! - [`stim`]: stimulus channel synthesis from an event list.
//!
//! # Quick start
//! ```no_run
//! use exg_spatial::raw::{read_segments_file, Calibration, ChannelSelection,
//!                        SampleFormat, SegmentFile};
//! use exg_spatial::ReaderConfig;
//! use ndarray::Array2;
//!
//! let file = SegmentFile::new("data/recording.bin", 32, SampleFormat::I16Le);
//! let cals = vec![1e-7; 32];
//! let mut data = Array2::<f64>::zeros((32, 1000));
//! read_segments_file(&file, &mut data, &ChannelSelection::All, 0, 1000,
//!                    &Calibration::Scale(&cals), None, &ReaderConfig::default()).unwrap();
//! ```
pub mod blocks;
pub mod segments;
pub mod stim;

pub use blocks::{blk_read_lims, BlockLimits};
pub use segments::{
    mult_cal_one, read_segments_blocked, read_segments_file,
    Calibration, ChannelSelection, SampleFormat, SegmentFile,
};
pub use stim::synthesize_stim_channel;
