//! Materialized media blocks and their bounded, time-ordered caches
//!
//! A [`MediaBlock`] is a renderer-ready frame with timeline metadata. The
//! decoder materializes frames into per-type [`MediaBlockBuffer`]s; the
//! renderer timer consumes whichever block covers the clock. Buffers are
//! single-producer (decoder) / single-consumer (renderer) but internally
//! locked so other threads can probe positions and fill levels.

use crate::decoder::{DecodedFrame, MediaComponent, MediaFrame, MediaType, SubtitleLine};
use parking_lot::Mutex;

/// Block cache capacity per media type
///
/// The video window covers roughly half a second at 24 fps; audio covers a
/// comparable wall-time span at typical 10 ms sample batches. Subtitle
/// blocks are long-lived, so a small table suffices.
pub fn max_blocks(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Video => 12,
        MediaType::Audio => 120,
        MediaType::Subtitle => 48,
    }
}

/// Media-specific payload of a materialized block
pub enum BlockPayload {
    /// Decoded audio samples, still in the decoder's output layout
    Audio {
        /// The decoded frame; resampling is the renderer's job
        frame: DecodedFrame,
        /// Sample rate in Hz
        sample_rate: u32,
        /// Channel count
        channels: u16,
        /// Samples per channel
        sample_count: usize,
    },

    /// A decoded picture, still in the decoder's pixel format
    Video {
        /// The decoded frame; color conversion is the renderer's job
        frame: DecodedFrame,
        /// Picture width in pixels
        width: u32,
        /// Picture height in pixels
        height: u32,
        /// SMPTE timecode of the block's start position
        smpte_timecode: String,
        /// Name of the hardware decoder that produced the frame, if any
        hardware_decoder: Option<String>,
    },

    /// Parsed subtitle lines
    Subtitle {
        /// The subtitle rects, in decode order
        lines: Vec<SubtitleLine>,
    },
}

/// A renderer-ready frame with timeline metadata
pub struct MediaBlock {
    media_type: MediaType,
    start_time_us: i64,
    end_time_us: i64,
    payload: BlockPayload,
}

impl MediaBlock {
    /// Build a block; the end time is clamped to never precede the start
    pub fn new(
        media_type: MediaType,
        start_time_us: i64,
        end_time_us: i64,
        payload: BlockPayload,
    ) -> MediaBlock {
        MediaBlock {
            media_type,
            start_time_us,
            end_time_us: end_time_us.max(start_time_us),
            payload,
        }
    }

    /// Media type of the block
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Presentation start in microseconds
    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    /// Presentation end in microseconds
    pub fn end_time_us(&self) -> i64 {
        self.end_time_us
    }

    /// Presentation duration in microseconds
    pub fn duration_us(&self) -> i64 {
        self.end_time_us - self.start_time_us
    }

    /// Whether the block's range covers the given position
    pub fn contains(&self, position_us: i64) -> bool {
        position_us >= self.start_time_us && position_us < self.end_time_us.max(self.start_time_us + 1)
    }

    /// The media payload
    pub fn payload(&self) -> &BlockPayload {
        &self.payload
    }
}

/// Bounded, time-ordered cache of blocks for one media type
pub struct MediaBlockBuffer {
    media_type: MediaType,
    capacity: usize,
    blocks: Mutex<Vec<MediaBlock>>,
}

impl MediaBlockBuffer {
    /// Create a buffer with the standard capacity for the media type
    pub fn new(media_type: MediaType) -> Self {
        Self::with_capacity(media_type, max_blocks(media_type))
    }

    /// Create a buffer with an explicit capacity
    pub fn with_capacity(media_type: MediaType, capacity: usize) -> Self {
        Self {
            media_type,
            capacity: capacity.max(1),
            blocks: Mutex::new(Vec::with_capacity(capacity.max(1))),
        }
    }

    /// Media type this buffer caches
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Maximum number of blocks held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Materialize a frame through its component and insert the block
    ///
    /// Blocks are kept ordered by start time. A block with a start time
    /// already present replaces the existing one; when the buffer is at
    /// capacity, the oldest block is evicted. Returns the start time of
    /// the inserted block.
    pub fn add(&self, frame: MediaFrame, component: &MediaComponent) -> i64 {
        let mut blocks = self.blocks.lock();
        let block = component.materialize_frame(frame, &blocks);
        let start = block.start_time_us();
        Self::insert_ordered(&mut blocks, block, self.capacity);
        start
    }

    pub(crate) fn insert(&self, block: MediaBlock) -> i64 {
        let mut blocks = self.blocks.lock();
        let start = block.start_time_us();
        Self::insert_ordered(&mut blocks, block, self.capacity);
        start
    }

    fn insert_ordered(blocks: &mut Vec<MediaBlock>, block: MediaBlock, capacity: usize) {
        match blocks.binary_search_by_key(&block.start_time_us(), |b| b.start_time_us()) {
            Ok(existing) => blocks[existing] = block,
            Err(position) => {
                blocks.insert(position, block);
                if blocks.len() > capacity {
                    blocks.remove(0);
                }
            }
        }
    }

    /// Start time of the block covering the position, if any
    pub fn get_snap_position(&self, position_us: i64) -> Option<i64> {
        let blocks = self.blocks.lock();
        Self::covering_index(&blocks, position_us).map(|i| blocks[i].start_time_us())
    }

    /// Index of the block covering the position, if any
    pub fn index_of(&self, position_us: i64) -> Option<usize> {
        Self::covering_index(&self.blocks.lock(), position_us)
    }

    fn covering_index(blocks: &[MediaBlock], position_us: i64) -> Option<usize> {
        blocks.iter().position(|b| b.contains(position_us))
    }

    /// Run a closure against the block covering the position, or the
    /// nearest block that starts before it when none covers it
    ///
    /// Returns `None` when every cached block starts after the position.
    pub fn with_block_at<R>(
        &self,
        position_us: i64,
        f: impl FnOnce(&MediaBlock) -> R,
    ) -> Option<R> {
        let blocks = self.blocks.lock();
        let index = Self::covering_index(&blocks, position_us).or_else(|| {
            blocks
                .iter()
                .rposition(|b| b.start_time_us() <= position_us)
        })?;
        Some(f(&blocks[index]))
    }

    /// Start time of the oldest cached block
    pub fn range_start(&self) -> Option<i64> {
        self.blocks.lock().first().map(|b| b.start_time_us())
    }

    /// End time of the newest cached block
    pub fn range_end(&self) -> Option<i64> {
        self.blocks.lock().last().map(|b| b.end_time_us())
    }

    /// Number of cached blocks
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Whether the cache holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Whether the cache is at capacity
    pub fn is_full(&self) -> bool {
        self.blocks.lock().len() >= self.capacity
    }

    /// Fill level as a ratio of capacity
    pub fn capacity_percent(&self) -> f64 {
        self.blocks.lock().len() as f64 / self.capacity as f64
    }

    /// Release every cached block
    pub fn clear(&self) {
        self.blocks.lock().clear();
    }
}
