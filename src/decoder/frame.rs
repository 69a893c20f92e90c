//! Decoded frame handles
//!
//! A [`MediaFrame`] is the short-lived product of one successful decode:
//! an owned AVFrame (audio/video) or the parsed lines of an AVSubtitle,
//! stamped with presentation timing in microseconds. Frames exist between
//! the pump and block materialization; their foreign payload is released
//! exactly once, on drop or when a block takes ownership.

use crate::decoder::MediaType;
use crate::utils::refs::{self, ForeignKind};
use ffmpeg_sys_next as ffi;
use std::ffi::CStr;
use std::ptr::NonNull;

/// Owned handle to an AVFrame
pub struct DecodedFrame {
    ptr: NonNull<ffi::AVFrame>,
}

// Moved between the decoder thread and whoever renders the block; only the
// current owner touches the payload.
unsafe impl Send for DecodedFrame {}

impl DecodedFrame {
    /// Allocate a fresh frame object for the codec to fill
    pub(crate) fn alloc() -> Option<DecodedFrame> {
        let raw = unsafe { ffi::av_frame_alloc() };
        NonNull::new(raw).map(|ptr| {
            refs::track(ForeignKind::Frame);
            DecodedFrame { ptr }
        })
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut ffi::AVFrame {
        self.ptr.as_ptr()
    }

    /// Raw pointer for engine callbacks; does not transfer ownership
    pub fn as_ptr(&self) -> *mut ffi::AVFrame {
        self.ptr.as_ptr()
    }

    /// Best-effort presentation timestamp in the stream timebase
    pub fn best_effort_timestamp(&self) -> i64 {
        unsafe { (*self.ptr.as_ptr()).best_effort_timestamp }
    }

    /// Frame duration in the stream timebase; 0 when unknown
    pub fn duration_ticks(&self) -> i64 {
        unsafe { (*self.ptr.as_ptr()).duration }
    }

    /// Audio sample count
    pub fn sample_count(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).nb_samples }
    }

    /// Audio sample rate in Hz
    pub fn sample_rate(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).sample_rate }
    }

    /// Audio channel count
    pub fn channels(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).ch_layout.nb_channels }
    }

    /// Picture width in pixels
    pub fn width(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).width }
    }

    /// Picture height in pixels
    pub fn height(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).height }
    }
}

impl Drop for DecodedFrame {
    fn drop(&mut self) {
        let mut raw = self.ptr.as_ptr();
        unsafe { ffi::av_frame_free(&mut raw) };
        refs::untrack(ForeignKind::Frame);
    }
}

/// Kind of a parsed subtitle line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleKind {
    /// Plain text rect
    Text,

    /// ASS dialogue rect, kept raw; styling is the renderer's business
    Ass,
}

/// One parsed subtitle rect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleLine {
    /// Rect kind
    pub kind: SubtitleKind,

    /// The rect's text, unmodified
    pub text: String,
}

/// Media-specific payload of a decoded frame
pub enum FramePayload {
    /// A batch of decoded audio samples
    Audio(DecodedFrame),

    /// A decoded picture
    Video(DecodedFrame),

    /// Parsed subtitle lines; the AVSubtitle is released at parse time
    Subtitle(Vec<SubtitleLine>),
}

/// A decoded frame with presentation timing
pub struct MediaFrame {
    payload: FramePayload,
    media_type: MediaType,
    stream_index: i32,
    start_time_us: i64,
    end_time_us: i64,
}

impl MediaFrame {
    /// Build a frame from its payload and timing
    ///
    /// `end_time_us` is clamped to never precede the start.
    pub fn new(
        payload: FramePayload,
        media_type: MediaType,
        stream_index: i32,
        start_time_us: i64,
        end_time_us: i64,
    ) -> MediaFrame {
        MediaFrame {
            payload,
            media_type,
            stream_index,
            start_time_us,
            end_time_us: end_time_us.max(start_time_us),
        }
    }

    /// Media type of the originating stream
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Stream this frame was decoded from
    pub fn stream_index(&self) -> i32 {
        self.stream_index
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

    /// Borrow the payload
    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    /// Take the payload, consuming the frame
    pub fn into_payload(self) -> FramePayload {
        self.payload
    }

    /// Raw AVFrame pointer for decode notifications; `None` for subtitles
    pub fn frame_ptr(&self) -> Option<*mut ffi::AVFrame> {
        match &self.payload {
            FramePayload::Audio(frame) | FramePayload::Video(frame) => Some(frame.as_ptr()),
            FramePayload::Subtitle(_) => None,
        }
    }
}

/// Parse the rects of a decoded AVSubtitle into owned lines
///
/// Bitmap rects are skipped; rendering bitmaps is outside the decode core.
pub(crate) unsafe fn parse_subtitle_lines(subtitle: &ffi::AVSubtitle) -> Vec<SubtitleLine> {
    let mut lines = Vec::new();
    for i in 0..subtitle.num_rects as isize {
        let rect = *subtitle.rects.offset(i);
        if rect.is_null() {
            continue;
        }
        match (*rect).type_ {
            ffi::AVSubtitleType::SUBTITLE_TEXT => {
                if !(*rect).text.is_null() {
                    lines.push(SubtitleLine {
                        kind: SubtitleKind::Text,
                        text: CStr::from_ptr((*rect).text).to_string_lossy().into_owned(),
                    });
                }
            }
            ffi::AVSubtitleType::SUBTITLE_ASS => {
                if !(*rect).ass.is_null() {
                    lines.push(SubtitleLine {
                        kind: SubtitleKind::Ass,
                        text: CStr::from_ptr((*rect).ass).to_string_lossy().into_owned(),
                    });
                }
            }
            _ => {
                log::debug!("skipping bitmap subtitle rect");
            }
        }
    }
    lines
}
