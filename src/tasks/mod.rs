//! Background Tasks Module
//!
//! Contains the background task each store runs for its whole lifetime.
//!
//! # Tasks
//! - Reaper: sleeps until the earliest scheduled expiration, sweeps expired
//!   entries, and reschedules itself

mod reaper;

pub(crate) use reaper::{spawn_reaper, Reaper};
