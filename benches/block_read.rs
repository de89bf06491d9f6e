use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use exg_spatial::raw::{blk_read_lims, read_segments_blocked, read_segments_file};
use exg_spatial::{Calibration, ChannelSelection, ReaderConfig, SampleFormat, SegmentFile};
use ndarray::Array2;

const N_CH: usize = 32;
const N_T: usize = 60_000;

fn write_fixture(dir: &tempfile::TempDir) -> SegmentFile {
    let path = dir.path().join("bench.bin");
    let bytes: Vec<u8> = (0..N_CH * N_T)
        .flat_map(|k| ((k % 4093) as i16 - 2046).to_le_bytes())
        .collect();
    std::fs::write(&path, bytes).unwrap();
    SegmentFile::new(path, N_CH, SampleFormat::I16Le)
}

fn bench_blk_read_lims(c: &mut Criterion) {
    c.bench_function("blk_read_lims [3, 59_997) / 1000", |b| {
        b.iter(|| {
            let lims = blk_read_lims(black_box(3), black_box(59_997), black_box(1000)).unwrap();
            black_box(lims.n_blocks())
        })
    });
}

fn bench_read_segments(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir);
    let cals = vec![1e-7; N_CH];
    let cal = Calibration::Scale(&cals);
    let mut data = Array2::<f64>::zeros((N_CH, N_T));

    c.bench_function("read_segments_file [32×60000 i16, 1 MB chunks]", |b| {
        let cfg = ReaderConfig { max_chunk_bytes: 1_000_000 };
        b.iter(|| {
            read_segments_file(&file, &mut data, &ChannelSelection::All, 0, N_T, &cal, None, &cfg)
                .unwrap();
            black_box(data[[0, 0]])
        })
    });

    let sel = ChannelSelection::Indices((0..N_CH).rev().collect());
    c.bench_function("read_segments_file gather [32×60000 i16]", |b| {
        let cfg = ReaderConfig::default();
        b.iter(|| {
            read_segments_file(&file, &mut data, &sel, 0, N_T, &cal, None, &cfg).unwrap();
            black_box(data[[0, 0]])
        })
    });

    c.bench_function("read_segments_blocked [32×60000 i16, 1000-sample buffers]", |b| {
        b.iter(|| {
            read_segments_blocked(&file, &mut data, &ChannelSelection::All, 0, N_T, &cal, 1000)
                .unwrap();
            black_box(data[[0, 0]])
        })
    });
}

criterion_group!(benches, bench_blk_read_lims, bench_read_segments);
criterion_main!(benches);
