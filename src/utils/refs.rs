//! Reference counting for foreign allocations
//!
//! Every FFmpeg allocation the crate owns (packets, frames, codec contexts,
//! subtitles) is tracked through this registry. The counters make leaks
//! observable: after shutdown, every kind must report zero live handles.
//! Tracking is a debug facility; the counters are plain relaxed atomics and
//! cost nothing worth optimizing away.

use std::sync::atomic::{AtomicI64, Ordering};

/// Kind of foreign allocation being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKind {
    /// An AVPacket owned by a queue or the reader
    Packet,

    /// An AVFrame owned by a media frame or block
    Frame,

    /// An AVCodecContext owned by a component
    CodecContext,

    /// An AVSubtitle owned during a subtitle decode attempt
    Subtitle,
}

/// Serializes tests that assert on the global counters
#[cfg(test)]
pub(crate) static COUNTER_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

static PACKETS: AtomicI64 = AtomicI64::new(0);
static FRAMES: AtomicI64 = AtomicI64::new(0);
static CODEC_CONTEXTS: AtomicI64 = AtomicI64::new(0);
static SUBTITLES: AtomicI64 = AtomicI64::new(0);

fn counter(kind: ForeignKind) -> &'static AtomicI64 {
    match kind {
        ForeignKind::Packet => &PACKETS,
        ForeignKind::Frame => &FRAMES,
        ForeignKind::CodecContext => &CODEC_CONTEXTS,
        ForeignKind::Subtitle => &SUBTITLES,
    }
}

/// Record one allocation of the given kind
pub fn track(kind: ForeignKind) {
    counter(kind).fetch_add(1, Ordering::Relaxed);
}

/// Record one release of the given kind
pub fn untrack(kind: ForeignKind) {
    let previous = counter(kind).fetch_sub(1, Ordering::Relaxed);
    if previous <= 0 {
        log::warn!("foreign release without a matching allocation: {:?}", kind);
    }
}

/// Live handle count for one kind
pub fn count(kind: ForeignKind) -> i64 {
    counter(kind).load(Ordering::Relaxed)
}

/// Live handle count across all kinds
pub fn total_live() -> i64 {
    PACKETS.load(Ordering::Relaxed)
        + FRAMES.load(Ordering::Relaxed)
        + CODEC_CONTEXTS.load(Ordering::Relaxed)
        + SUBTITLES.load(Ordering::Relaxed)
}

/// Log a warning for every kind that still reports live handles
///
/// Called when a container closes; a clean shutdown logs nothing.
pub fn report_leaks(context: &str) {
    for kind in [
        ForeignKind::Packet,
        ForeignKind::Frame,
        ForeignKind::CodecContext,
        ForeignKind::Subtitle,
    ] {
        let live = count(kind);
        if live > 0 {
            log::warn!("{}: {} live {:?} handle(s) at close", context, live, kind);
        }
    }
}
