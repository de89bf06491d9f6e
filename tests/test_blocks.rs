mod common;
use exg_spatial::raw::blk_read_lims;
use exg_spatial::Error;

/// Every (start, stop, buf_len) with small values: the write ranges tile the
/// destination, the read ranges stay inside a buffer and match in length.
#[test]
fn limits_tile_destination_for_all_small_ranges() {
    for buf_len in 1..=12 {
        for start in 0..40 {
            for stop in start + 1..=48 {
                let lims = blk_read_lims(start, stop, buf_len).unwrap();
                let mut covered = 0;
                for (block, r, d) in lims.iter() {
                    assert_eq!(d.start, covered, "gap at ({start},{stop},{buf_len})");
                    assert_eq!(r.len(), d.len(), "length mismatch at ({start},{stop},{buf_len})");
                    assert!(r.start < r.end && r.end <= buf_len);
                    // The file sample behind each destination sample is start + d.
                    assert_eq!(block * buf_len + r.start, start + d.start);
                    covered = d.end;
                }
                assert_eq!(covered, stop - start);
            }
        }
    }
}

#[test]
fn block_count_matches_buffers_touched() {
    for buf_len in 1..=9 {
        for start in 0..30 {
            for stop in start + 1..=36 {
                let lims = blk_read_lims(start, stop, buf_len).unwrap();
                let expected = (stop - 1) / buf_len - start / buf_len + 1;
                assert_eq!(lims.n_blocks(), expected, "({start},{stop},{buf_len})");
                assert_eq!(lims.first_block, start / buf_len);
            }
        }
    }
}

#[test]
fn aligned_stop_adds_no_empty_trailing_block() {
    let lims = blk_read_lims(5, 20, 10).unwrap();
    assert_eq!(lims.n_blocks(), 2);
    assert_eq!(lims.r_lims.last(), Some(&(0, 10)));
}

#[test]
fn reading_through_limits_reproduces_the_range() {
    let buf_len = 7;
    let file: Vec<usize> = (0..70).collect();
    for (start, stop) in [(0, 70), (3, 4), (6, 8), (13, 61), (21, 28)] {
        let lims = blk_read_lims(start, stop, buf_len).unwrap();
        let mut dest = vec![usize::MAX; stop - start];
        for (block, r, d) in lims.iter() {
            let buf = &file[block * buf_len..(block + 1) * buf_len];
            dest[d].copy_from_slice(&buf[r]);
        }
        assert_eq!(dest, file[start..stop]);
    }
}

#[test]
fn degenerate_requests_are_rejected() {
    assert!(matches!(blk_read_lims(5, 5, 10), Err(Error::Config(_))));
    assert!(matches!(blk_read_lims(6, 5, 10), Err(Error::Config(_))));
    assert!(matches!(blk_read_lims(0, 5, 0), Err(Error::Config(_))));
}
