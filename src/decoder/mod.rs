//! Decoder module for the media core
//!
//! This module owns one side of the foreign-memory boundary: packets queued
//! per stream, codec contexts opened per component, and the pumps that turn
//! queued packets into decoded media frames. Components are grouped by a
//! [`ComponentSet`] which routes demuxed packets by stream index.

mod component;
mod component_set;
mod frame;
mod hw_accel;
mod packet_queue;

pub use component::{MediaComponent, CODEC_LOCK};
pub use component_set::{ComponentSet, DecodeNotifications, OnFrameDecoded, OnSubtitleDecoded};
pub use frame::{DecodedFrame, FramePayload, MediaFrame, SubtitleKind, SubtitleLine};
pub use hw_accel::HardwareAccelerator;
pub use packet_queue::{Packet, PacketQueue};

use ffmpeg_sys_next as ffi;

/// Media type of a decodable stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MediaType {
    /// An audio stream of sample batches
    Audio,

    /// A video stream of pictures
    Video,

    /// A subtitle stream of timed text
    Subtitle,
}

impl MediaType {
    /// All media types this core decodes, in render-priority order
    pub const ALL: [MediaType; 3] = [MediaType::Video, MediaType::Audio, MediaType::Subtitle];

    /// Map an FFmpeg media type; `None` for anything this core does not decode
    pub fn from_av(kind: ffi::AVMediaType) -> Option<MediaType> {
        match kind {
            ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => Some(MediaType::Audio),
            ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => Some(MediaType::Video),
            ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE => Some(MediaType::Subtitle),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
            MediaType::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Convert a timestamp expressed in the given timebase to microseconds
///
/// `AV_NOPTS_VALUE` maps to `None`.
pub(crate) fn timestamp_to_micros(ts: i64, time_base: ffi::AVRational) -> Option<i64> {
    if ts == ffi::AV_NOPTS_VALUE || time_base.den == 0 {
        return None;
    }
    let seconds = ts as f64 * time_base.num as f64 / time_base.den as f64;
    Some((seconds * 1_000_000.0) as i64)
}

/// Convert a rational to frames (or cycles) per second
pub(crate) fn rational_to_f64(q: ffi::AVRational) -> f64 {
    if q.den == 0 {
        0.0
    } else {
        q.num as f64 / q.den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_av() {
        assert_eq!(
            MediaType::from_av(ffi::AVMediaType::AVMEDIA_TYPE_AUDIO),
            Some(MediaType::Audio)
        );
        assert_eq!(
            MediaType::from_av(ffi::AVMediaType::AVMEDIA_TYPE_VIDEO),
            Some(MediaType::Video)
        );
        assert_eq!(
            MediaType::from_av(ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE),
            Some(MediaType::Subtitle)
        );
        assert_eq!(MediaType::from_av(ffi::AVMediaType::AVMEDIA_TYPE_DATA), None);
        assert_eq!(
            MediaType::from_av(ffi::AVMediaType::AVMEDIA_TYPE_ATTACHMENT),
            None
        );
    }

    #[test]
    fn test_timestamp_to_micros() {
        // 90kHz timebase, one second worth of ticks
        let tb = ffi::AVRational { num: 1, den: 90_000 };
        assert_eq!(timestamp_to_micros(90_000, tb), Some(1_000_000));
        assert_eq!(timestamp_to_micros(45_000, tb), Some(500_000));
        assert_eq!(timestamp_to_micros(ffi::AV_NOPTS_VALUE, tb), None);

        let degenerate = ffi::AVRational { num: 1, den: 0 };
        assert_eq!(timestamp_to_micros(100, degenerate), None);
    }

    #[test]
    fn test_rational_to_f64() {
        let fps = ffi::AVRational { num: 30_000, den: 1_001 };
        assert!((rational_to_f64(fps) - 29.97).abs() < 0.01);
        assert_eq!(rational_to_f64(ffi::AVRational { num: 1, den: 0 }), 0.0);
    }
}
