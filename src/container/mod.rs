//! Container interface and stream metadata
//!
//! The demuxer is an external collaborator: this module pins the interface
//! the decoding core consumes ([`MediaContainer`]) and provides a thin
//! avformat-backed implementation ([`InputContainer`]) plus the stream
//! metadata snapshot taken when a container opens. Nothing here parses
//! formats; that is the demuxer's own business.

mod options;

pub use options::{DecoderParams, HardwareDeviceInfo, LowResolutionIndex, MediaOptions};

use crate::decoder::{rational_to_f64, timestamp_to_micros, MediaType, Packet};
use crate::utils::error::{MediaCoreError, Result};
use crate::utils::refs;
use ffmpeg_sys_next as ffi;
use std::ffi::{c_void, CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};

/// Borrowed handle to a demuxer stream
///
/// Valid for as long as the container that produced it stays open. The
/// accessors wrap the raw field reads so unsafe stays in one place.
#[derive(Clone, Copy)]
pub struct StreamHandle {
    ptr: *mut ffi::AVStream,
}

impl StreamHandle {
    /// Wrap a raw stream pointer
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid AVStream owned by an open format context that
    /// outlives the handle.
    pub unsafe fn from_raw(ptr: *mut ffi::AVStream) -> StreamHandle {
        StreamHandle { ptr }
    }

    /// Stream index within the container
    pub fn index(&self) -> i32 {
        unsafe { (*self.ptr).index }
    }

    /// The stream's own timebase
    pub fn time_base(&self) -> ffi::AVRational {
        unsafe { (*self.ptr).time_base }
    }

    /// Raw start time in the stream timebase; `AV_NOPTS_VALUE` when unknown
    pub fn start_time(&self) -> i64 {
        unsafe { (*self.ptr).start_time }
    }

    /// Raw duration in the stream timebase; `AV_NOPTS_VALUE` or 0 when unknown
    pub fn duration(&self) -> i64 {
        unsafe { (*self.ptr).duration }
    }

    /// Average frame rate as reported by the demuxer
    pub fn avg_frame_rate(&self) -> ffi::AVRational {
        unsafe { (*self.ptr).avg_frame_rate }
    }

    /// Real base frame rate as reported by the demuxer
    pub fn real_frame_rate(&self) -> ffi::AVRational {
        unsafe { (*self.ptr).r_frame_rate }
    }

    /// Codec parameters carried by the stream
    pub fn codec_parameters(&self) -> *mut ffi::AVCodecParameters {
        unsafe { (*self.ptr).codecpar }
    }

    /// Stamp a forced frame rate onto the stream
    pub(crate) fn set_frame_rate(&self, rate: ffi::AVRational) {
        unsafe {
            (*self.ptr).r_frame_rate = rate;
            (*self.ptr).avg_frame_rate = rate;
        }
    }

    /// Reset the demuxer's discard policy for the stream
    pub(crate) fn set_discard_default(&self) {
        unsafe { (*self.ptr).discard = ffi::AVDiscard::AVDISCARD_DEFAULT };
    }
}

/// Snapshot of one stream's metadata, taken at container open
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream index
    pub index: i32,

    /// Media type, when it is one this core decodes
    pub media_type: Option<MediaType>,

    /// Short codec name ("h264", "aac", ...)
    pub codec_name: String,

    /// Bitrate in bits per second; 0 when unknown
    pub bitrate: i64,

    /// Video width in pixels
    pub width: u32,

    /// Video height in pixels
    pub height: u32,

    /// Frame rate; 0 when unknown or not video
    pub fps: f64,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Audio channel count
    pub channels: u16,

    /// Language tag from the stream metadata
    pub language: Option<String>,

    /// Stream timebase as (numerator, denominator)
    pub time_base: (i32, i32),

    /// Start time in microseconds, when the stream reports one
    pub start_time_us: Option<i64>,

    /// Duration in microseconds, when the stream reports one
    pub duration_us: Option<i64>,
}

impl StreamInfo {
    /// Extract the snapshot for one stream
    pub fn from_stream(stream: StreamHandle) -> StreamInfo {
        let par = stream.codec_parameters();
        let time_base = stream.time_base();

        let (media_type, codec_name, bitrate, width, height, sample_rate, channels) = unsafe {
            let codec_name = CStr::from_ptr(ffi::avcodec_get_name((*par).codec_id))
                .to_string_lossy()
                .into_owned();
            (
                MediaType::from_av((*par).codec_type),
                codec_name,
                (*par).bit_rate,
                (*par).width.max(0) as u32,
                (*par).height.max(0) as u32,
                (*par).sample_rate.max(0) as u32,
                (*par).ch_layout.nb_channels.max(0) as u16,
            )
        };

        let fps = match media_type {
            Some(MediaType::Video) => {
                let avg = stream.avg_frame_rate();
                if avg.den != 0 && avg.num != 0 {
                    rational_to_f64(avg)
                } else {
                    rational_to_f64(stream.real_frame_rate())
                }
            }
            _ => 0.0,
        };

        let language = unsafe {
            let key = CString::new("language").unwrap();
            let entry = ffi::av_dict_get(
                (*stream.ptr).metadata,
                key.as_ptr(),
                std::ptr::null(),
                0,
            );
            if entry.is_null() {
                None
            } else {
                Some(CStr::from_ptr((*entry).value).to_string_lossy().into_owned())
            }
        };

        let duration = stream.duration();
        StreamInfo {
            index: stream.index(),
            media_type,
            codec_name,
            bitrate,
            width,
            height,
            fps,
            sample_rate,
            channels,
            language,
            time_base: (time_base.num, time_base.den),
            start_time_us: timestamp_to_micros(stream.start_time(), time_base),
            duration_us: if duration > 0 {
                timestamp_to_micros(duration, time_base)
            } else {
                None
            },
        }
    }
}

/// Container-level metadata snapshot
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// File path or URL the container was opened from
    pub source: String,

    /// Demuxer format name
    pub format_name: String,

    /// Container duration in microseconds, when reported
    pub duration_us: Option<i64>,

    /// Container start time in microseconds
    pub start_time_us: i64,

    /// Container bitrate in bits per second; 0 when unknown
    pub bitrate: i64,

    /// Network source without a known duration
    pub is_live_stream: bool,

    /// Per-stream snapshots, indexed by stream position
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Snapshot for a stream index, if present
    pub fn stream(&self, index: i32) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }
}

/// The demuxer interface the decoding core consumes
///
/// `read_next_packet` returning `Ok(None)` means end of stream or an abort
/// in progress; hard demuxer failures surface as errors and are logged by
/// the reader without tearing the pipeline down.
pub trait MediaContainer: Send + Sync {
    /// Container metadata snapshot
    fn media_info(&self) -> &MediaInfo;

    /// Options this container was opened with
    fn options(&self) -> &MediaOptions;

    /// Raw stream handle for component initialization
    fn stream(&self, stream_index: i32) -> Option<StreamHandle>;

    /// Read the next demuxed packet; `None` at end of stream
    fn read_next_packet(&self) -> Result<Option<Packet>>;

    /// Whether reads have been aborted via [`Self::signal_abort_reads`]
    fn is_read_aborted(&self) -> bool;

    /// Whether the demuxer has reached end of stream
    fn is_at_end_of_stream(&self) -> bool;

    /// Break any blocking read and fail fast on subsequent ones
    fn signal_abort_reads(&self);

    /// Container start offset in microseconds, inherited by streams that
    /// report no timestamp of their own
    fn media_start_time_offset(&self) -> i64;
}

/// Thin avformat-backed container
///
/// Owns the AVFormatContext and the abort flag wired into its interrupt
/// callback. Packet reads are expected from a single reader thread.
pub struct InputContainer {
    ictx: *mut ffi::AVFormatContext,
    // Boxed so the address handed to the interrupt callback stays stable.
    abort: Box<AtomicBool>,
    eof: AtomicBool,
    info: MediaInfo,
    options: MediaOptions,
}

// The format context is only mutated through read_next_packet (reader
// thread) while other threads read immutable metadata captured at open.
unsafe impl Send for InputContainer {}
unsafe impl Sync for InputContainer {}

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> i32 {
    let abort = &*(opaque as *const AtomicBool);
    abort.load(Ordering::Acquire) as i32
}

impl InputContainer {
    /// Open a file or URL and snapshot its metadata
    pub fn open(source: &str, options: MediaOptions) -> Result<InputContainer> {
        ffmpeg_next::init().map_err(|e| MediaCoreError::Internal(e.to_string()))?;

        let c_source = CString::new(source)?;
        let abort = Box::new(AtomicBool::new(false));

        unsafe {
            let mut ictx = ffi::avformat_alloc_context();
            if ictx.is_null() {
                return Err(MediaCoreError::Internal(
                    "failed to allocate format context".to_string(),
                ));
            }
            (*ictx).interrupt_callback = ffi::AVIOInterruptCB {
                callback: Some(interrupt_callback),
                opaque: abort.as_ref() as *const AtomicBool as *mut c_void,
            };

            let ret = ffi::avformat_open_input(
                &mut ictx,
                c_source.as_ptr(),
                std::ptr::null(),
                std::ptr::null_mut(),
            );
            if ret < 0 {
                // avformat_open_input frees the context on failure
                return Err(MediaCoreError::Container(format!(
                    "cannot open '{}': {}",
                    source,
                    ffmpeg_next::Error::from(ret)
                )));
            }

            let ret = ffi::avformat_find_stream_info(ictx, std::ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ictx);
                return Err(MediaCoreError::Container(format!(
                    "cannot read stream info for '{}': {}",
                    source,
                    ffmpeg_next::Error::from(ret)
                )));
            }

            let info = extract_media_info(ictx, source);
            log::info!(
                "opened '{}' ({}): {} stream(s), duration {:?}us",
                source,
                info.format_name,
                info.streams.len(),
                info.duration_us
            );

            Ok(InputContainer {
                ictx,
                abort,
                eof: AtomicBool::new(false),
                info,
                options,
            })
        }
    }
}

impl MediaContainer for InputContainer {
    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn options(&self) -> &MediaOptions {
        &self.options
    }

    fn stream(&self, stream_index: i32) -> Option<StreamHandle> {
        unsafe {
            if stream_index < 0 || stream_index as u32 >= (*self.ictx).nb_streams {
                return None;
            }
            let stream = *(*self.ictx).streams.offset(stream_index as isize);
            Some(StreamHandle::from_raw(stream))
        }
    }

    fn read_next_packet(&self) -> Result<Option<Packet>> {
        if self.is_read_aborted() || self.is_at_end_of_stream() {
            return Ok(None);
        }

        let mut packet = Packet::alloc()
            .ok_or_else(|| MediaCoreError::Internal("packet allocation failed".to_string()))?;
        let ret = unsafe { ffi::av_read_frame(self.ictx, packet.as_mut_ptr()) };

        if ret >= 0 {
            Ok(Some(packet))
        } else if ret == ffi::AVERROR_EOF {
            self.eof.store(true, Ordering::Release);
            Ok(None)
        } else if ret == ffi::AVERROR(ffi::EAGAIN) || self.is_read_aborted() {
            Ok(None)
        } else {
            Err(MediaCoreError::Container(format!(
                "read failed: {}",
                ffmpeg_next::Error::from(ret)
            )))
        }
    }

    fn is_read_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn is_at_end_of_stream(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    fn signal_abort_reads(&self) {
        self.abort.store(true, Ordering::Release);
    }

    fn media_start_time_offset(&self) -> i64 {
        self.info.start_time_us
    }
}

impl Drop for InputContainer {
    fn drop(&mut self) {
        unsafe { ffi::avformat_close_input(&mut self.ictx) };
        refs::report_leaks(&self.info.source);
    }
}

fn is_network_source(source: &str) -> bool {
    ["rtsp://", "rtmp://", "http://", "https://", "udp://", "tcp://", "mms://"]
        .iter()
        .any(|scheme| source.starts_with(scheme))
}

unsafe fn extract_media_info(ictx: *mut ffi::AVFormatContext, source: &str) -> MediaInfo {
    let format_name = if (*ictx).iformat.is_null() {
        String::new()
    } else {
        CStr::from_ptr((*(*ictx).iformat).name)
            .to_string_lossy()
            .into_owned()
    };

    // Container duration and start time are already in AV_TIME_BASE units
    // (microseconds).
    let duration_us = if (*ictx).duration != ffi::AV_NOPTS_VALUE && (*ictx).duration > 0 {
        Some((*ictx).duration)
    } else {
        None
    };
    let start_time_us = if (*ictx).start_time != ffi::AV_NOPTS_VALUE {
        (*ictx).start_time
    } else {
        0
    };

    let mut streams = Vec::with_capacity((*ictx).nb_streams as usize);
    for i in 0..(*ictx).nb_streams {
        let stream = *(*ictx).streams.offset(i as isize);
        streams.push(StreamInfo::from_stream(StreamHandle::from_raw(stream)));
    }

    MediaInfo {
        source: source.to_string(),
        format_name,
        duration_us,
        start_time_us,
        bitrate: (*ictx).bit_rate,
        is_live_stream: is_network_source(source) && duration_us.is_none(),
        streams,
    }
}
