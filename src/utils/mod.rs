//! Utility module for the decoding core
//!
//! This module provides common facilities used throughout the crate:
//! - Error handling with custom error types
//! - The foreign-allocation reference counter backing leak diagnostics
//! - Small timestamp helpers shared by the decode and render paths

pub mod error;
pub mod refs;

pub use error::{MediaCoreError, Result};

/// Format a microsecond position for display
///
/// Produces "HH:MM:SS" for positions of an hour or more, "MM:SS" otherwise.
/// Negative positions clamp to zero.
pub fn format_position(position_us: i64) -> String {
    let total_secs = position_us.max(0) / 1_000_000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Format a microsecond position as an SMPTE timecode (HH:MM:SS:FF)
/// against the given frame rate.
pub fn smpte_timecode(position_us: i64, fps: f64) -> String {
    let position_us = position_us.max(0);
    let total_secs = position_us / 1_000_000;
    let frac_us = position_us % 1_000_000;
    let frame = if fps > 0.0 {
        ((frac_us as f64 / 1_000_000.0) * fps) as i64
    } else {
        0
    };

    format!(
        "{:02}:{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        frame
    )
}
