//! Playback options recognized by the decoding core
//!
//! This module defines the option sections a host hands to the core when a
//! container is opened. Loading these from a file or the command line is the
//! host's business; the structs carry serde derives so any format works.

use crate::decoder::MediaType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options applied when components are opened and while the pipeline runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaOptions {
    /// Forced video frame rate; 0 keeps the stream's own rate.
    /// When set, the stream frame rate is stamped and the packet timebase
    /// becomes its inverse.
    pub video_forced_fps: f64,

    /// Decoder overrides by stream index: a non-blank codec name here is
    /// tried before the default decoder for the stream's codec id
    pub decoder_codec: HashMap<i32, String>,

    /// Flags and tuning applied to every decoder this core opens
    pub decoder_params: DecoderParams,

    /// Raw codec options by stream index, passed to avcodec_open2 verbatim
    pub stream_codec_options: HashMap<i32, HashMap<String, String>>,

    /// Hardware device used for video decoding, if any
    pub video_hardware_device: Option<HardwareDeviceInfo>,

    /// External subtitle source; preload is handled outside the core
    pub subtitles_url: Option<String>,

    /// Shift applied to subtitle presentation times, in microseconds
    pub subtitles_delay_us: i64,

    /// Skip the subtitle stream entirely when selecting components
    pub is_subtitle_disabled: bool,

    /// Skip the audio stream entirely when selecting components
    pub is_audio_disabled: bool,

    /// Skip the video stream entirely when selecting components
    pub is_video_disabled: bool,

    /// Soft bound, in bytes, for the reader's packet buffering
    pub download_cache_length: usize,
}

/// Per-decoder flags and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderParams {
    /// Allow non-spec-compliant speedups (sets the codec's fast flag)
    pub enable_fast_decoding: bool,

    /// Decode without frame reordering delay (sets the low-delay flag)
    pub enable_low_delay_decoding: bool,

    /// Decode at reduced resolution when the codec supports it
    pub low_resolution_index: LowResolutionIndex,

    /// Recorded preference for reference-counted frames. Audio and video
    /// decoders always have refcounted frames forced on regardless of this
    /// value; the field exists for hosts that surface the setting.
    pub ref_counted_frames: bool,
}

/// Low-resolution decoding divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LowResolutionIndex {
    /// Full resolution (lowres disabled)
    Full,

    /// Half resolution
    Half,

    /// Quarter resolution
    Quarter,

    /// Eighth resolution
    Eighth,
}

impl LowResolutionIndex {
    /// The value passed as the codec's lowres option
    pub fn as_lowres(self) -> i32 {
        match self {
            LowResolutionIndex::Full => 0,
            LowResolutionIndex::Half => 1,
            LowResolutionIndex::Quarter => 2,
            LowResolutionIndex::Eighth => 3,
        }
    }
}

/// A hardware decoding device as configured by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareDeviceInfo {
    /// FFmpeg hwdevice type name ("cuda", "vaapi", "d3d11va", "videotoolbox")
    pub device_type: String,

    /// Device path or ordinal, when the type needs one
    pub device: Option<String>,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            video_forced_fps: 0.0,
            decoder_codec: HashMap::new(),
            decoder_params: DecoderParams::default(),
            stream_codec_options: HashMap::new(),
            video_hardware_device: None,
            subtitles_url: None,
            subtitles_delay_us: 0,
            is_subtitle_disabled: false,
            is_audio_disabled: false,
            is_video_disabled: false,
            download_cache_length: 16 * 1024 * 1024, // 16MB of packets
        }
    }
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            enable_fast_decoding: false,
            enable_low_delay_decoding: false,
            low_resolution_index: LowResolutionIndex::Full,
            ref_counted_frames: true,
        }
    }
}

impl MediaOptions {
    /// Forced decoder name for a stream, if one is configured and non-blank
    pub fn forced_decoder_name(&self, stream_index: i32) -> Option<&str> {
        self.decoder_codec
            .get(&stream_index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Raw codec options configured for a stream
    pub fn codec_options_for(&self, stream_index: i32) -> HashMap<String, String> {
        self.stream_codec_options
            .get(&stream_index)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether component selection skips the given media type
    pub fn is_stream_disabled(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Audio => self.is_audio_disabled,
            MediaType::Video => self.is_video_disabled,
            MediaType::Subtitle => self.is_subtitle_disabled,
        }
    }
}
