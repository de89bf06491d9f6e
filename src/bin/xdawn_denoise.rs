use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use exg_spatial::raw::{read_segments_file, synthesize_stim_channel};
use exg_spatial::{
    Calibration, ChannelKind, ChannelSelection, CorrectOverlap, Epochs, Event, Info, Instance,
    Raw, ReaderConfig, Regularization, SampleFormat, SegmentFile, Solver, Xdawn,
    XdawnConfig,
};

#[derive(Clone, Copy, ValueEnum)]
enum OverlapArg {
    Auto,
    Always,
    Never,
}

#[derive(Parser)]
#[command(name = "xdawn_denoise", about = "Fit Xdawn on a multiplexed recording and denoise its evoked responses")]
struct Args {
    /// Multiplexed sample file (time-major, channels interleaved)
    #[arg(long)]
    input: PathBuf,

    /// Event list, one `onset duration code` triple per line
    #[arg(long)]
    events: PathBuf,

    /// Channels stored in the file
    #[arg(long)]
    n_channels: usize,

    /// Sampling rate in Hz
    #[arg(long)]
    sfreq: f64,

    /// numpy-style sample dtype (<i2, >i2, <i4, >i4, <f4, >f4, <f8)
    #[arg(long, default_value = "<i2")]
    dtype: SampleFormat,

    /// Calibration factor applied to every channel
    #[arg(long, default_value_t = 1.0)]
    cal: f64,

    /// Byte offset of the first sample
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Epoch start relative to the event, seconds
    #[arg(long, default_value_t = -0.1)]
    tmin: f64,

    /// Epoch end relative to the event, seconds
    #[arg(long, default_value_t = 0.6)]
    tmax: f64,

    /// Xdawn components kept per class
    #[arg(long, default_value_t = 2)]
    n_components: usize,

    /// Covariance regularisation: none, a shrinkage in [0, 1], ledoit_wolf or oas
    #[arg(long, default_value = "none")]
    reg: Regularization,

    #[arg(long, value_enum, default_value = "auto")]
    correct_overlap: OverlapArg,

    /// Overlap regression solver: pinv or cholesky
    #[arg(long, default_value = "pinv")]
    solver: Solver,

    /// Append a stimulus channel synthesized from the events
    #[arg(long)]
    stim: bool,

    /// Upper bound on bytes read per chunk
    #[arg(long, default_value_t = 100_000_000)]
    max_chunk_bytes: usize,

    /// Output safetensors: fitted filters, patterns and per-class denoised evokeds
    #[arg(long)]
    output: PathBuf,
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events from {}", path.display()))?;
    let mut events = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [onset, duration, code] = fields[..] else {
            bail!("line {}: expected 'onset duration code', got '{line}'", i + 1);
        };
        events.push(Event::new(
            onset.parse().with_context(|| format!("line {}: bad onset", i + 1))?,
            duration.parse().with_context(|| format!("line {}: bad duration", i + 1))?,
            code.parse().with_context(|| format!("line {}: bad code", i + 1))?,
        ));
    }
    Ok(events)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut file = SegmentFile::new(&args.input, args.n_channels, args.dtype);
    file.data_offset = args.offset;
    let n_times = file.n_samples().context("sizing input file")?;
    let events = read_events(&args.events)?;
    info!(n_channels = args.n_channels, n_times, n_events = events.len(), "loaded input");

    // ── Read ─────────────────────────────────────────────────────────────────
    let stim = if args.stim {
        Some(synthesize_stim_channel(&events, n_times)?)
    } else {
        None
    };
    let n_rows = args.n_channels + usize::from(stim.is_some());
    let cals = vec![args.cal; args.n_channels];
    let mut data = ndarray::Array2::<f64>::zeros((n_rows, n_times));
    let cfg = ReaderConfig { max_chunk_bytes: args.max_chunk_bytes };
    read_segments_file(
        &file,
        &mut data,
        &ChannelSelection::All,
        0,
        n_times,
        &Calibration::Scale(&cals),
        stim.as_deref(),
        &cfg,
    )
    .with_context(|| format!("reading {}", args.input.display()))?;

    let mut names: Vec<String> = (1..=args.n_channels).map(|i| format!("EEG {i:03}")).collect();
    if stim.is_some() {
        names.push("STI 014".into());
    }
    let mut info = Info::new(names, args.sfreq, ChannelKind::Eeg);
    if stim.is_some() {
        info.ch_kinds[args.n_channels] = ChannelKind::Stim;
    }
    let raw = Raw::new(info, data)?;

    // ── Epoch + fit ──────────────────────────────────────────────────────────
    let mut codes: Vec<i32> = events.iter().map(|e| e.id).collect();
    codes.sort_unstable();
    codes.dedup();
    let event_id = codes.iter().map(|c| (c.to_string(), *c)).collect();
    let epochs = Epochs::from_raw(&raw, &events, event_id, args.tmin, args.tmax, None)?;
    info!(n_epochs = epochs.n_epochs(), n_times = epochs.n_times(), "epoched");

    let config = XdawnConfig {
        n_components: args.n_components,
        reg: args.reg,
        correct_overlap: match args.correct_overlap {
            OverlapArg::Auto => CorrectOverlap::Auto,
            OverlapArg::Always => CorrectOverlap::Always,
            OverlapArg::Never => CorrectOverlap::Never,
        },
        solver: args.solver,
        ..XdawnConfig::default()
    };
    let fitted = Xdawn::new(config).fit(&epochs, None)?;
    info!(classes = ?fitted.classes, correct_overlap = fitted.correct_overlap, "fitted");

    // ── Denoise + write ──────────────────────────────────────────────────────
    let evoked = epochs.average()?;
    let denoised = fitted.apply(&Instance::Evoked(evoked), None, None, None)?;

    fitted
        .write_safetensors(&args.output, Some(&denoised))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(output = %args.output.display(), "written");

    Ok(())
}
