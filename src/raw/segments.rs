//! Chunked reader for multiplexed raw sample files.
//!
//! # On-disk layout
//! ```text
//! t0: ch0 ch1 … ch(N-1) │ t1: ch0 ch1 … ch(N-1) │ t2: …
//! ```
//! Samples are interleaved by channel at every time step, so element `k` of
//! a chunk belongs to channel `k % N` and time `k / N`.
//!
//! # Calibration
//! ```text
//! data[o, t] = raw[sel[o], t] × cals[o]          (selection + scale)
//! data[o, t] = Σ_c mixing[o, c] × raw[c, t]      (mixing matrix)
//! ```
//! A mixing matrix is assumed to be pre-calibrated: when one is supplied the
//! channel selection and per-channel scale are not applied.
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};
use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::raw::blocks::blk_read_lims;

// ── Sample formats ────────────────────────────────────────────────────────

/// On-disk sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Little-endian `i16` (`'<i2'`), the most common vendor format.
    #[default]
    I16Le,
    I16Be,
    I32Le,
    I32Be,
    F32Le,
    F32Be,
    F64Le,
}

impl SampleFormat {
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16Le | SampleFormat::I16Be => 2,
            SampleFormat::I32Le | SampleFormat::I32Be
            | SampleFormat::F32Le | SampleFormat::F32Be => 4,
            SampleFormat::F64Le => 8,
        }
    }

    /// Decode one sample; `b` must hold exactly `bytes_per_sample()` bytes.
    #[inline]
    fn decode(self, b: &[u8]) -> f64 {
        match self {
            SampleFormat::I16Le => i16::from_le_bytes([b[0], b[1]]) as f64,
            SampleFormat::I16Be => i16::from_be_bytes([b[0], b[1]]) as f64,
            SampleFormat::I32Le => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            SampleFormat::I32Be => i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            SampleFormat::F32Le => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            SampleFormat::F32Be => f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            SampleFormat::F64Le => {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
        }
    }

    /// Decode a multiplexed byte chunk into `[n_channels, n_samples]`.
    fn demultiplex(self, bytes: &[u8], n_channels: usize) -> Array2<f64> {
        let bps = self.bytes_per_sample();
        let n_samples = bytes.len() / (bps * n_channels);
        Array2::from_shape_fn((n_channels, n_samples), |(c, t)| {
            let k = (t * n_channels + c) * bps;
            self.decode(&bytes[k..k + bps])
        })
    }
}

/// Parses numpy-style dtype strings: `<i2`, `>i2`, `<i4`, `>i4`, `<f4`,
/// `>f4`, `<f8`.
impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<i2" => Ok(SampleFormat::I16Le),
            ">i2" => Ok(SampleFormat::I16Be),
            "<i4" => Ok(SampleFormat::I32Le),
            ">i4" => Ok(SampleFormat::I32Be),
            "<f4" => Ok(SampleFormat::F32Le),
            ">f4" => Ok(SampleFormat::F32Be),
            "<f8" => Ok(SampleFormat::F64Le),
            other => Err(Error::config(format!("unsupported sample dtype '{other}'"))),
        }
    }
}

// ── Channel selection / calibration ──────────────────────────────────────

/// Which source rows end up in the destination, in destination order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelection {
    All,
    /// Contiguous rows; copied through a view without a gather.
    Range(Range<usize>),
    /// Arbitrary rows (subset or permutation), gathered one by one.
    Indices(Vec<usize>),
}

impl ChannelSelection {
    /// Number of output rows produced from `n_in` source rows.
    pub fn n_out(&self, n_in: usize) -> usize {
        match self {
            ChannelSelection::All => n_in,
            ChannelSelection::Range(r) => r.len(),
            ChannelSelection::Indices(idx) => idx.len(),
        }
    }
}

/// Scaling applied after selection, or a full mixing matrix.
#[derive(Debug, Clone, Copy)]
pub enum Calibration<'a> {
    None,
    /// One factor per destination row.
    Scale(&'a [f64]),
    /// `[n_out, n_in]`, pre-calibrated.
    Mixing(ArrayView2<'a, f64>),
}

/// Take one chunk `one` (`[n_in, n_t]`), select/scale or mix it, and store it
/// in `dest` (`[n_out, n_t]`).
pub fn mult_cal_one(
    mut dest: ArrayViewMut2<f64>,
    one: ArrayView2<f64>,
    sel: &ChannelSelection,
    cal: &Calibration,
) -> Result<()> {
    if dest.ncols() != one.ncols() {
        return Err(Error::config(format!(
            "chunk has {} samples but destination has {}",
            one.ncols(),
            dest.ncols()
        )));
    }
    let n_in = one.nrows();

    if let Calibration::Mixing(mult) = cal {
        if mult.ncols() != n_in || mult.nrows() != dest.nrows() {
            return Err(Error::config(format!(
                "mixing matrix is {:?}, expected [{}, {}]",
                mult.dim(),
                dest.nrows(),
                n_in
            )));
        }
        dest.assign(&mult.dot(&one));
        return Ok(());
    }

    if sel.n_out(n_in) != dest.nrows() {
        return Err(Error::config(format!(
            "selection yields {} rows, destination has {}",
            sel.n_out(n_in),
            dest.nrows()
        )));
    }
    match sel {
        ChannelSelection::All => dest.assign(&one),
        ChannelSelection::Range(r) => {
            if r.end > n_in {
                return Err(Error::config(format!(
                    "channel range {r:?} exceeds {n_in} channels"
                )));
            }
            dest.assign(&one.slice(s![r.clone(), ..]));
        }
        ChannelSelection::Indices(idx) => {
            for (o, &i) in idx.iter().enumerate() {
                if i >= n_in {
                    return Err(Error::config(format!(
                        "channel index {i} out of range for {n_in} channels"
                    )));
                }
                dest.row_mut(o).assign(&one.row(i));
            }
        }
    }

    if let Calibration::Scale(cals) = cal {
        if cals.len() != dest.nrows() {
            return Err(Error::config(format!(
                "{} calibration factors for {} channels",
                cals.len(),
                dest.nrows()
            )));
        }
        for (mut row, &c) in dest.rows_mut().into_iter().zip(cals.iter()) {
            row *= c;
        }
    }
    Ok(())
}

// ── File reader ──────────────────────────────────────────────────────────

/// A raw multiplexed sample file and the metadata needed to read it.
#[derive(Debug, Clone)]
pub struct SegmentFile {
    pub path: PathBuf,
    /// Channels stored on disk (a synthesized stim channel is not counted).
    pub n_channels: usize,
    pub format: SampleFormat,
    /// Byte offset of sample 0 (size of any header before the data).
    pub data_offset: u64,
}

impl SegmentFile {
    pub fn new(path: impl Into<PathBuf>, n_channels: usize, format: SampleFormat) -> Self {
        Self { path: path.into(), n_channels, format, data_offset: 0 }
    }

    fn check_channels(&self) -> Result<usize> {
        if self.n_channels == 0 {
            return Err(Error::config(format!(
                "{} declares zero channels",
                self.path.display()
            )));
        }
        Ok(self.n_channels)
    }

    /// Number of complete samples in the file.
    pub fn n_samples(&self) -> Result<usize> {
        self.check_channels()?;
        let len = std::fs::metadata(&self.path)?.len();
        let payload = len.saturating_sub(self.data_offset) as usize;
        Ok(payload / (self.n_channels * self.format.bytes_per_sample()))
    }

    fn open_at(&self, sample: usize) -> Result<File> {
        let mut fid = File::open(&self.path)?;
        let pos = self.data_offset
            + (sample * self.n_channels * self.format.bytes_per_sample()) as u64;
        fid.seek(SeekFrom::Start(pos))?;
        Ok(fid)
    }
}

/// Fill `buf` completely or report how many bytes were available.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if got < buf.len() {
        return Err(Error::ShortRead { expected: buf.len(), got });
    }
    Ok(())
}

/// Read samples `[start, stop)` of `file` into `data` in bounded chunks.
///
/// `data` is `[n_out, stop - start]` where `n_out` is the number of selected
/// channels, plus one trailing row when `stim` is given. With `stim` the
/// selection is forced to all on-disk channels, the last row is copied from
/// `stim[start..stop]` and calibration (if a scale) applies to the on-disk
/// channels only.
///
/// On a short read the columns filled by earlier chunks stay written.
#[allow(clippy::too_many_arguments)]
pub fn read_segments_file(
    file: &SegmentFile,
    data: &mut Array2<f64>,
    sel: &ChannelSelection,
    start: usize,
    stop: usize,
    cal: &Calibration,
    stim: Option<&[i32]>,
    cfg: &ReaderConfig,
) -> Result<()> {
    if stop <= start {
        return Err(Error::config(format!("empty sample range [{start}, {stop})")));
    }
    if data.ncols() != stop - start {
        return Err(Error::config(format!(
            "destination has {} columns for {} samples",
            data.ncols(),
            stop - start
        )));
    }
    let n_ch = file.check_channels()?;
    let bps = file.format.bytes_per_sample();

    let all = ChannelSelection::Range(0..n_ch);
    let (sel, cal) = match stim {
        Some(stim) => {
            if stim.len() < stop {
                return Err(Error::config(format!(
                    "stim channel has {} samples, need {stop}",
                    stim.len()
                )));
            }
            let cal = match *cal {
                Calibration::Scale(cals) if cals.len() == n_ch + 1 => {
                    Calibration::Scale(&cals[..n_ch])
                }
                other => other,
            };
            (&all, cal)
        }
        None => (sel, *cal),
    };
    let Some(n_out) = data.nrows().checked_sub(usize::from(stim.is_some())) else {
        return Err(Error::config("destination has no row for the stim channel"));
    };

    // Chunk sizes count samples (channels × time points), not bytes.
    let data_left = (stop - start) * n_ch;
    let block_size = ((cfg.max_chunk_bytes / bps) / n_ch) * n_ch;
    let block_size = block_size.max(n_ch).min(data_left);

    let mut fid = file.open_at(start)?;
    let mut bytes = vec![0u8; block_size * bps];
    let mut sample_start = 0;
    while sample_start * n_ch < data_left {
        let count = block_size.min(data_left - sample_start * n_ch);
        let chunk = &mut bytes[..count * bps];
        read_full(&mut fid, chunk)?;

        let one = file.format.demultiplex(chunk, n_ch);
        let sample_stop = sample_start + one.ncols();
        debug!(sample_start, sample_stop, n_ch, "read chunk");

        mult_cal_one(
            data.slice_mut(s![..n_out, sample_start..sample_stop]),
            one.view(),
            sel,
            &cal,
        )?;
        if let Some(stim) = stim {
            let src = &stim[start + sample_start..start + sample_stop];
            for (d, &v) in data.slice_mut(s![n_out, sample_start..sample_stop]).iter_mut().zip(src) {
                *d = v as f64;
            }
        }
        sample_start = sample_stop;
    }
    Ok(())
}

/// Read samples `[start, stop)` buffer by buffer, for files written as a
/// sequence of `buf_len`-sample records.
///
/// Produces the same result as [`read_segments_file`] without a stim
/// channel; each touched buffer is read from its first sample and trimmed
/// with the limits from [`blk_read_lims`].
pub fn read_segments_blocked(
    file: &SegmentFile,
    data: &mut Array2<f64>,
    sel: &ChannelSelection,
    start: usize,
    stop: usize,
    cal: &Calibration,
    buf_len: usize,
) -> Result<()> {
    let lims = blk_read_lims(start, stop, buf_len)?;
    if data.ncols() != stop - start {
        return Err(Error::config(format!(
            "destination has {} columns for {} samples",
            data.ncols(),
            stop - start
        )));
    }
    let n_ch = file.check_channels()?;
    let bps = file.format.bytes_per_sample();
    let mut bytes = vec![0u8; buf_len * n_ch * bps];

    for (block, r, d) in lims.iter() {
        let mut fid = file.open_at(block * buf_len)?;
        let chunk = &mut bytes[..r.end * n_ch * bps];
        read_full(&mut fid, chunk)?;
        let one = file.format.demultiplex(chunk, n_ch);
        debug!(block, ?r, ?d, "read buffer");
        mult_cal_one(data.slice_mut(s![.., d]), one.slice(s![.., r]), sel, cal)?;
    }
    Ok(())
}
