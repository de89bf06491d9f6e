//! Read/write limits for a sample range that straddles fixed-size buffers.
//!
//! ```text
//!                 +---------+---------+---------+
//! File layout:    |  buf0   |  buf1   |  buf2   |
//!                 +---------+---------+---------+
//! File time:      0        10        20        30
//! Requested:        2                      27
//! ```
//!
//! For `start = 2, stop = 27, buf_len = 10` three buffers are touched:
//!
//! ```text
//! block  r_lims     d_lims
//!   0    (2, 10)    (0, 8)
//!   1    (0, 10)    (8, 18)
//!   2    (0, 7)     (18, 25)
//! ```
//!
//! so that `data[d.0..d.1] = this_buf[r.0..r.1]` for every block fills the
//! destination exactly once.
use std::ops::Range;

use crate::error::{Error, Result};

/// Per-buffer read and write limits for one `[start, stop)` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLimits {
    /// Index of the first buffer touched (`start / buf_len`).
    pub first_block: usize,
    /// Offsets inside each source buffer, one pair per buffer touched.
    pub r_lims: Vec<(usize, usize)>,
    /// Offsets inside the destination, one pair per buffer touched.
    pub d_lims: Vec<(usize, usize)>,
}

impl BlockLimits {
    /// Number of buffers touched by the request.
    #[inline]
    pub fn n_blocks(&self) -> usize {
        self.r_lims.len()
    }

    /// Iterate `(buffer_index, read_range, write_range)` in buffer order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Range<usize>, Range<usize>)> + '_ {
        self.r_lims
            .iter()
            .zip(self.d_lims.iter())
            .enumerate()
            .map(move |(bi, (&(rs, re), &(ds, de)))| (self.first_block + bi, rs..re, ds..de))
    }
}

/// Compute the buffers and offsets needed to read samples `[start, stop)`
/// from a file stored as consecutive buffers of `buf_len` samples.
///
/// A `stop` that falls exactly on a buffer boundary never pulls in an empty
/// trailing buffer.
///
/// # Errors
///
/// [`Error::Config`] when `stop <= start` or `buf_len == 0`.
pub fn blk_read_lims(start: usize, stop: usize, buf_len: usize) -> Result<BlockLimits> {
    if buf_len == 0 {
        return Err(Error::config("buf_len must be positive"));
    }
    if stop <= start {
        return Err(Error::config(format!(
            "empty sample range: start={start} stop={stop}"
        )));
    }

    let first_block = start / buf_len;
    let block_start = first_block * buf_len;
    let last_used = stop - 1;
    let block_stop = last_used - last_used % buf_len + buf_len;
    let n_blk = (block_stop - block_start).div_ceil(buf_len);

    let start_offset = start - block_start;
    let end_offset = block_stop - stop;

    let mut r_lims = Vec::with_capacity(n_blk);
    let mut d_lims = Vec::with_capacity(n_blk);
    for bi in 0..n_blk {
        let (d_sidx, r_sidx) = if bi == 0 {
            (0, start_offset)
        } else {
            (bi * buf_len - start_offset, 0)
        };
        let (d_eidx, r_eidx) = if bi == n_blk - 1 {
            (stop - start, buf_len - end_offset)
        } else {
            ((bi + 1) * buf_len - start_offset, buf_len)
        };
        r_lims.push((r_sidx, r_eidx));
        d_lims.push((d_sidx, d_eidx));
    }

    Ok(BlockLimits { first_block, r_lims, d_lims })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straddling_three_buffers() {
        let lims = blk_read_lims(2, 27, 10).unwrap();
        assert_eq!(lims.first_block, 0);
        assert_eq!(lims.r_lims, vec![(2, 10), (0, 10), (0, 7)]);
        assert_eq!(lims.d_lims, vec![(0, 8), (8, 18), (18, 25)]);
    }

    #[test]
    fn full_single_buffer() {
        let lims = blk_read_lims(0, 10, 10).unwrap();
        assert_eq!(lims.n_blocks(), 1);
        assert_eq!(lims.r_lims, vec![(0, 10)]);
        assert_eq!(lims.d_lims, vec![(0, 10)]);
    }

    #[test]
    fn stop_on_boundary_has_no_empty_tail() {
        let lims = blk_read_lims(5, 10, 10).unwrap();
        assert_eq!(lims.r_lims, vec![(5, 10)]);
        assert_eq!(lims.d_lims, vec![(0, 5)]);

        let lims = blk_read_lims(5, 20, 10).unwrap();
        assert_eq!(lims.r_lims, vec![(5, 10), (0, 10)]);
        assert_eq!(lims.d_lims, vec![(0, 5), (5, 15)]);
    }

    #[test]
    fn single_sample() {
        let lims = blk_read_lims(13, 14, 10).unwrap();
        assert_eq!(lims.first_block, 1);
        assert_eq!(lims.r_lims, vec![(3, 4)]);
        assert_eq!(lims.d_lims, vec![(0, 1)]);
    }

    #[test]
    fn iter_reports_absolute_block_index() {
        let lims = blk_read_lims(25, 41, 10).unwrap();
        let blocks: Vec<usize> = lims.iter().map(|(b, _, _)| b).collect();
        assert_eq!(blocks, vec![2, 3, 4]);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(blk_read_lims(4, 4, 10), Err(Error::Config(_))));
        assert!(matches!(blk_read_lims(0, 4, 0), Err(Error::Config(_))));
    }
}
