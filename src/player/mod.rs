//! Playback pipeline module
//!
//! This module orchestrates the read -> decode -> render pipeline: the
//! bounded block caches that sit between the decoder and the renderers,
//! the cycle events the three loops signal each other with, the playback
//! clock, and the [`MediaEngine`] that ties them together.

pub mod blocks;
mod clock;
mod events;
mod pipeline;

pub use blocks::{max_blocks, BlockPayload, MediaBlock, MediaBlockBuffer};
pub use clock::RealTimeClock;
pub use events::CycleEvent;
pub use pipeline::{BlockBuffers, EngineState, MediaEngine};

/// A presentation backend for one media type
///
/// Renderers consume materialized blocks on the engine's render cadence.
/// Pixel conversion, resampling and compositing are the renderer's job;
/// the engine only hands over the block whose range covers the clock.
pub trait BlockRenderer: Send {
    /// Present a block against the given clock position (microseconds)
    fn render(&mut self, block: &MediaBlock, clock_position_us: i64);

    /// Release any backend resources; called once during shutdown
    fn close(&mut self) {}
}
