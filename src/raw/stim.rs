//! Synthesized stimulus channel.
//!
//! Vendor formats that store triggers as an event list rather than as a
//! channel get one built here: a zero array with each event's trigger code
//! written over `[onset, onset + duration)`.
use crate::container::Event;
use crate::error::{Error, Result};

/// Build an `n_samp`-long stim channel from `(onset, duration, trigger)`
/// events. Later events overwrite earlier ones where they overlap.
///
/// # Errors
///
/// [`Error::Config`] if any event extends past `n_samp`.
pub fn synthesize_stim_channel(events: &[Event], n_samp: usize) -> Result<Vec<i32>> {
    let mut stim = vec![0i32; n_samp];
    for ev in events {
        let end = ev.onset.checked_add(ev.duration).filter(|&e| e <= n_samp);
        let Some(end) = end else {
            return Err(Error::config(format!(
                "event at {} with duration {} runs past {n_samp} samples",
                ev.onset, ev.duration
            )));
        };
        stim[ev.onset..end].fill(ev.id);
    }
    Ok(stim)
}
