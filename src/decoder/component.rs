//! Media components: one codec context per decodable stream
//!
//! A [`MediaComponent`] owns exactly one codec context for its lifetime and
//! drives the packet -> frame pump for one stream. Audio and video run the
//! send_packet/receive_frame state machine; subtitles use the synchronous
//! decode_subtitle2 contract. All codec opens and disposals across the
//! process are serialized by [`CODEC_LOCK`], which FFmpeg requires.

use crate::container::{MediaContainer, StreamInfo};
use crate::decoder::component_set::DecodeNotifications;
use crate::decoder::frame::{parse_subtitle_lines, DecodedFrame, FramePayload, MediaFrame};
use crate::decoder::hw_accel::HardwareAccelerator;
use crate::decoder::packet_queue::{Packet, PacketQueue};
use crate::decoder::{rational_to_f64, timestamp_to_micros, MediaType};
use crate::player::blocks::{BlockPayload, MediaBlock};
use crate::utils::error::{MediaCoreError, Result};
use crate::utils::refs::{self, ForeignKind};
use crate::utils::smpte_timecode;
use ffmpeg_sys_next as ffi;
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide lock serializing codec-library open and dispose calls.
/// Nothing else belongs in this lock.
pub static CODEC_LOCK: Mutex<()> = Mutex::new(());

/// The codec context pointer, behind the component's pump lock
struct CodecHandle {
    ctx: *mut ffi::AVCodecContext,
}

// The pointer is only dereferenced while the surrounding Mutex is held.
unsafe impl Send for CodecHandle {}

/// Guard releasing a codec context on early initialization exits
struct CodecContextGuard {
    ctx: *mut ffi::AVCodecContext,
}

impl CodecContextGuard {
    fn alloc() -> Result<CodecContextGuard> {
        let ctx = unsafe { ffi::avcodec_alloc_context3(std::ptr::null()) };
        if ctx.is_null() {
            return Err(MediaCoreError::Container(
                "failed to allocate codec context".to_string(),
            ));
        }
        refs::track(ForeignKind::CodecContext);
        Ok(CodecContextGuard { ctx })
    }

    fn into_raw(mut self) -> *mut ffi::AVCodecContext {
        std::mem::replace(&mut self.ctx, std::ptr::null_mut())
    }
}

impl Drop for CodecContextGuard {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe { ffi::avcodec_free_context(&mut self.ctx) };
            refs::untrack(ForeignKind::CodecContext);
        }
    }
}

/// Raw decoder output handed to the frame-source hook
pub(crate) enum RawDecoded {
    /// An AVFrame from the send/receive pump
    Frame(DecodedFrame),

    /// An AVSubtitle from decode_subtitle2, with the source packet's
    /// timestamp when the subtitle carries none of its own
    Subtitle {
        subtitle: ffi::AVSubtitle,
        pts_hint_us: Option<i64>,
    },
}

/// The two component-specific hooks: wrapping raw decoder output into a
/// managed frame, and materializing a frame into a renderer-ready block.
pub(crate) trait FrameHooks {
    fn create_frame_source(&self, component: &MediaComponent, raw: RawDecoded)
        -> Option<MediaFrame>;

    fn materialize_frame(
        &self,
        component: &MediaComponent,
        frame: MediaFrame,
        siblings: &[MediaBlock],
    ) -> MediaBlock;
}

struct AudioHooks;

struct VideoState {
    frame_rate: ffi::AVRational,
    hardware: Option<HardwareAccelerator>,
}

struct SubtitleState {
    delay_us: i64,
}

/// Component variant, dispatched by tag
enum ComponentVariant {
    Audio,
    Video(VideoState),
    Subtitle(SubtitleState),
}

impl ComponentVariant {
    fn hooks(&self) -> &dyn FrameHooks {
        match self {
            ComponentVariant::Audio => &AudioHooks,
            ComponentVariant::Video(state) => state,
            ComponentVariant::Subtitle(state) => state,
        }
    }
}

/// One decodable stream: codec context, packet queue and the decode pump
pub struct MediaComponent {
    media_type: MediaType,
    stream_index: i32,
    codec_id: ffi::AVCodecID,
    codec_name: String,
    bitrate: i64,
    start_time_offset_us: i64,
    duration_us: i64,
    stream_info: StreamInfo,
    stream_time_base: ffi::AVRational,
    packets: PacketQueue,
    codec: Mutex<CodecHandle>,
    has_codec_packets: AtomicBool,
    is_disposed: AtomicBool,
    lifetime_bytes_read: AtomicU64,
    variant: ComponentVariant,
    notifications: Arc<DecodeNotifications>,
}

impl MediaComponent {
    /// Open the component for a stream of an open container
    ///
    /// Walks the full initialization sequence: codec context allocation,
    /// parameter copy, packet timebase, candidate selection (forced decoder
    /// first, then the default for the codec id), decoder flags, hardware
    /// attach, the locked open, and the stream's timing inheritance. Every
    /// failing step releases what was already acquired.
    pub fn open(
        container: &dyn MediaContainer,
        stream_index: i32,
        notifications: Arc<DecodeNotifications>,
    ) -> Result<MediaComponent> {
        let options = container.options().clone();
        let stream = container.stream(stream_index).ok_or_else(|| {
            MediaCoreError::Argument(format!("invalid stream index {}", stream_index))
        })?;
        let stream_info = container
            .media_info()
            .stream(stream_index)
            .cloned()
            .unwrap_or_else(|| StreamInfo::from_stream(stream));

        unsafe {
            let par = stream.codec_parameters();
            let is_video = (*par).codec_type == ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            let is_audio = (*par).codec_type == ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;

            let guard = CodecContextGuard::alloc()?;
            let ctx = guard.ctx;

            let ret = ffi::avcodec_parameters_to_context(ctx, par);
            if ret < 0 {
                log::warn!(
                    "stream {}: cannot apply codec parameters: {}",
                    stream_index,
                    ffmpeg_next::Error::from(ret)
                );
            }

            // Packet timebase: a forced FPS stamps the stream rate and makes
            // the packet timebase its inverse; otherwise the stream's own
            // timebase is inherited.
            let mut frame_rate = stream.avg_frame_rate();
            if frame_rate.num == 0 || frame_rate.den == 0 {
                frame_rate = stream.real_frame_rate();
            }
            if is_video && options.video_forced_fps > 0.0 {
                let forced = ffi::av_d2q(options.video_forced_fps, 1_000_000);
                stream.set_frame_rate(forced);
                frame_rate = forced;
                (*ctx).pkt_timebase = ffi::AVRational {
                    num: forced.den,
                    den: forced.num,
                };
            } else {
                (*ctx).pkt_timebase = stream.time_base();
            }

            let default_codec = ffi::avcodec_find_decoder((*par).codec_id);
            let forced_codec = match options.forced_decoder_name(stream_index) {
                Some(name) => {
                    let c_name = CString::new(name)?;
                    let codec = ffi::avcodec_find_decoder_by_name(c_name.as_ptr());
                    if codec.is_null() {
                        log::warn!(
                            "stream {}: forced decoder '{}' not found, falling back to default",
                            stream_index,
                            name
                        );
                    }
                    codec
                }
                None => std::ptr::null(),
            };

            if default_codec.is_null() && forced_codec.is_null() {
                return Err(MediaCoreError::Container(format!(
                    "stream {}: no decoder found for codec '{}'",
                    stream_index,
                    CStr::from_ptr(ffi::avcodec_get_name((*par).codec_id)).to_string_lossy()
                )));
            }

            let mut selected: *const ffi::AVCodec = std::ptr::null();
            let mut hardware = None;
            for candidate in [forced_codec, default_codec] {
                if candidate.is_null() {
                    continue;
                }
                let candidate_name = CStr::from_ptr((*candidate).name).to_string_lossy();
                (*ctx).codec_id = (*candidate).id;

                if options.decoder_params.enable_fast_decoding {
                    (*ctx).flags2 |= ffi::AV_CODEC_FLAG2_FAST as i32;
                }
                if options.decoder_params.enable_low_delay_decoding {
                    (*ctx).flags |= ffi::AV_CODEC_FLAG_LOW_DELAY as i32;
                }

                let mut dict: *mut ffi::AVDictionary = std::ptr::null_mut();
                for (key, value) in options.codec_options_for(stream_index) {
                    dict_set(&mut dict, &key, &value);
                }
                dict_set(&mut dict, "threads", "auto");

                let requested_lowres = options.decoder_params.low_resolution_index.as_lowres();
                if requested_lowres > 0 && (*candidate).max_lowres > 0 {
                    let lowres = requested_lowres.min((*candidate).max_lowres as i32);
                    dict_set(&mut dict, "lowres", &lowres.to_string());
                }

                // Refcounted frames are forced on for every audio/video
                // candidate; block payloads outlive the receive call.
                if is_audio || is_video {
                    dict_set(&mut dict, "refcounted_frames", "1");
                }

                if is_video {
                    if let Some(device) = &options.video_hardware_device {
                        match HardwareAccelerator::attach(ctx, device) {
                            Ok(accel) => hardware = Some(accel),
                            Err(e) => log::warn!(
                                "stream {}: hardware attach failed, decoding in software: {}",
                                stream_index,
                                e
                            ),
                        }
                    }
                }

                let open_result = {
                    let _codec_open = CODEC_LOCK.lock();
                    ffi::avcodec_open2(ctx, candidate, &mut dict)
                };

                if open_result >= 0 {
                    warn_unconsumed_options(stream_index, dict);
                    ffi::av_dict_free(&mut dict);
                    selected = candidate;
                    break;
                }

                log::warn!(
                    "stream {}: decoder '{}' failed to open: {}",
                    stream_index,
                    candidate_name,
                    ffmpeg_next::Error::from(open_result)
                );
                ffi::av_dict_free(&mut dict);
            }

            if selected.is_null() {
                return Err(MediaCoreError::Container(format!(
                    "stream {}: no codec candidate could be opened",
                    stream_index
                )));
            }

            stream.set_discard_default();

            let media_type = MediaType::from_av((*ctx).codec_type).ok_or_else(|| {
                MediaCoreError::Unsupported(format!(
                    "stream {} is not audio, video or subtitle",
                    stream_index
                ))
            })?;

            let variant = match media_type {
                MediaType::Audio => ComponentVariant::Audio,
                MediaType::Video => ComponentVariant::Video(VideoState {
                    frame_rate,
                    hardware,
                }),
                MediaType::Subtitle => ComponentVariant::Subtitle(SubtitleState {
                    delay_us: options.subtitles_delay_us,
                }),
            };

            let time_base = stream.time_base();
            let start_time_offset_us = timestamp_to_micros(stream.start_time(), time_base)
                .unwrap_or_else(|| container.media_start_time_offset());
            let duration_us = if stream.duration() > 0 {
                timestamp_to_micros(stream.duration(), time_base)
            } else {
                None
            }
            .or(container.media_info().duration_us)
            .unwrap_or(0);

            let codec_name = CStr::from_ptr((*selected).name).to_string_lossy().into_owned();
            log::debug!(
                "stream {}: opened {} component with decoder '{}'",
                stream_index,
                media_type,
                codec_name
            );

            let component = MediaComponent {
                media_type,
                stream_index,
                codec_id: (*selected).id,
                codec_name,
                bitrate: (*par).bit_rate,
                start_time_offset_us,
                duration_us,
                stream_info,
                stream_time_base: time_base,
                packets: PacketQueue::new(),
                codec: Mutex::new(CodecHandle {
                    ctx: guard.into_raw(),
                }),
                has_codec_packets: AtomicBool::new(false),
                is_disposed: AtomicBool::new(false),
                lifetime_bytes_read: AtomicU64::new(0),
                variant,
                notifications,
            };

            // Prime the queue: the flush must drain before any real packet
            // reaches the codec.
            component.packets.push(Packet::flush(stream_index));
            Ok(component)
        }
    }

    /// Media type of the component
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Stream index within the container
    pub fn stream_index(&self) -> i32 {
        self.stream_index
    }

    /// Selected codec id
    pub fn codec_id(&self) -> ffi::AVCodecID {
        self.codec_id
    }

    /// Selected codec's short name
    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Stream bitrate in bits per second; 0 when unknown
    pub fn bitrate(&self) -> i64 {
        self.bitrate
    }

    /// Start-time offset in microseconds
    pub fn start_time_offset_us(&self) -> i64 {
        self.start_time_offset_us
    }

    /// Stream duration in microseconds; 0 when unknown
    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    /// Metadata snapshot of the backing stream
    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// Name of the attached hardware decoder, for video components that
    /// opened one
    pub fn hardware_decoder_name(&self) -> Option<&str> {
        match &self.variant {
            ComponentVariant::Video(state) => state.hardware.as_ref().map(|h| h.name.as_str()),
            _ => None,
        }
    }

    /// Bytes currently queued for this component
    pub fn packet_buffer_length(&self) -> usize {
        self.packets.buffer_length()
    }

    /// Packets currently queued for this component
    pub fn packet_buffer_count(&self) -> usize {
        self.packets.count()
    }

    /// Queued packet playtime in microseconds
    pub fn packet_buffer_duration_us(&self) -> i64 {
        timestamp_to_micros(self.packets.duration_ticks(), self.stream_time_base).unwrap_or(0)
    }

    /// Total payload bytes ever accepted by [`Self::send_packet`]
    pub fn lifetime_bytes_read(&self) -> u64 {
        self.lifetime_bytes_read.load(Ordering::Relaxed)
    }

    /// Whether the codec has accepted a non-sentinel packet since the last
    /// flush
    pub fn has_codec_packets(&self) -> bool {
        self.has_codec_packets.load(Ordering::Acquire)
    }

    /// Whether the component has been disposed
    pub fn is_disposed(&self) -> bool {
        self.is_disposed.load(Ordering::Acquire)
    }

    /// Queue a demuxed packet; `None` queues the empty/null sentinel
    pub fn send_packet(&self, packet: Option<Packet>) {
        match packet {
            None => self.send_empty_packet(),
            Some(packet) => {
                self.lifetime_bytes_read
                    .fetch_add(packet.size().max(0) as u64, Ordering::Relaxed);
                self.packets.push(packet);
            }
        }
    }

    /// Queue the empty/null sentinel, asking the codec to enter drain mode
    pub fn send_empty_packet(&self) {
        self.packets.push(Packet::empty(self.stream_index));
    }

    /// Drain the packet queue, releasing every packet
    ///
    /// With `flush_buffers`, codec buffers are flushed as well and
    /// `has_codec_packets` is cleared.
    pub fn clear_queued_packets(&self, flush_buffers: bool) {
        self.packets.clear();
        if !flush_buffers {
            return;
        }
        let codec = self.codec.lock();
        if codec.ctx.is_null() {
            return;
        }
        unsafe { ffi::avcodec_flush_buffers(codec.ctx) };
        self.has_codec_packets.store(false, Ordering::Release);
    }

    /// Pump the decoder for the next frame
    ///
    /// Tries a receive first, feeds one queued packet on demand, then fills
    /// the codec until either a frame comes out or the queue runs dry.
    pub fn receive_next_frame(&self) -> Option<MediaFrame> {
        let codec = self.codec.lock();
        if codec.ctx.is_null() {
            return None;
        }
        match &self.variant {
            ComponentVariant::Subtitle(state) => self.receive_next_subtitle(codec.ctx, state),
            _ => self.receive_next_av(codec.ctx),
        }
    }

    /// Materialize a decoded frame into a renderer-ready block
    pub fn materialize_frame(&self, frame: MediaFrame, siblings: &[MediaBlock]) -> MediaBlock {
        self.variant.hooks().materialize_frame(self, frame, siblings)
    }

    fn receive_next_av(&self, ctx: *mut ffi::AVCodecContext) -> Option<MediaFrame> {
        let (frame, _) = self.receive_frame_from_decoder(ctx);
        if frame.is_some() {
            return frame;
        }

        self.feed_packets_to_decoder(ctx, false);
        let (frame, _) = self.receive_frame_from_decoder(ctx);
        if frame.is_some() {
            return frame;
        }

        loop {
            if self.feed_packets_to_decoder(ctx, true) == 0 {
                return None;
            }
            let (frame, status) = self.receive_frame_from_decoder(ctx);
            if frame.is_some() {
                return frame;
            }
            if status < 0 && status != ffi::AVERROR(ffi::EAGAIN) {
                return None;
            }
        }
    }

    /// Move queued packets into the codec
    ///
    /// Flush sentinels are consumed by flushing codec buffers and never
    /// reach the codec. A full decoder leaves the pending packet at the
    /// head of the queue. Returns how many packets the codec consumed.
    fn feed_packets_to_decoder(&self, ctx: *mut ffi::AVCodecContext, fill_buffer: bool) -> usize {
        let mut consumed = 0;
        while let Some(packet) = self.packets.dequeue() {
            if packet.is_flush() {
                unsafe { ffi::avcodec_flush_buffers(ctx) };
                self.has_codec_packets.store(false, Ordering::Release);
                continue;
            }

            let is_sentinel = packet.is_empty_sentinel();
            let status = unsafe { ffi::avcodec_send_packet(ctx, packet.as_ptr()) };
            if status == ffi::AVERROR(ffi::EAGAIN) {
                // Decoder is full; the packet stays next in line.
                self.packets.requeue_front(packet);
                break;
            }

            drop(packet);
            consumed += 1;
            if status >= 0 && !is_sentinel {
                self.has_codec_packets.store(true, Ordering::Release);
            }
            if !fill_buffer || status < 0 {
                break;
            }
        }
        consumed
    }

    /// One receive attempt against the codec
    ///
    /// Returns the managed frame (when one was produced) and the raw
    /// receive status.
    fn receive_frame_from_decoder(
        &self,
        ctx: *mut ffi::AVCodecContext,
    ) -> (Option<MediaFrame>, i32) {
        let mut frame = match DecodedFrame::alloc() {
            Some(frame) => frame,
            None => return (None, ffi::AVERROR(ffi::ENOMEM)),
        };

        let status = unsafe { ffi::avcodec_receive_frame(ctx, frame.as_mut_ptr()) };
        if status >= 0 {
            let managed = self
                .variant
                .hooks()
                .create_frame_source(self, RawDecoded::Frame(frame));
            if let Some(managed) = &managed {
                if let Some(ptr) = managed.frame_ptr() {
                    self.notifications.notify_frame(ptr, self.media_type);
                }
            }
            return (managed, status);
        }

        if status == ffi::AVERROR_EOF {
            // Drain complete; flush so the next cycle can resume with
            // fresh packets.
            unsafe { ffi::avcodec_flush_buffers(ctx) };
            self.has_codec_packets.store(false, Ordering::Release);
        } else if status == ffi::AVERROR(ffi::EAGAIN) {
            self.has_codec_packets.store(false, Ordering::Release);
        } else {
            log::warn!(
                "stream {}: receive_frame failed: {}",
                self.stream_index,
                ffmpeg_next::Error::from(status)
            );
            self.has_codec_packets.store(false, Ordering::Release);
        }
        (None, status)
    }

    /// One subtitle decode attempt via the synchronous contract
    fn receive_next_subtitle(
        &self,
        ctx: *mut ffi::AVCodecContext,
        state: &SubtitleState,
    ) -> Option<MediaFrame> {
        let mut subtitle: ffi::AVSubtitle = unsafe { std::mem::zeroed() };
        let mut got: i32 = 0;

        // Flush try: an empty packet may push out a buffered subtitle.
        let mut flush_try = Packet::empty(self.stream_index);
        let mut status = unsafe {
            ffi::avcodec_decode_subtitle2(ctx, &mut subtitle, &mut got, flush_try.as_mut_ptr())
        };
        drop(flush_try);

        let mut pts_hint_us = None;
        if got == 0 {
            loop {
                let Some(mut packet) = self.packets.dequeue() else {
                    if status < 0 {
                        self.has_codec_packets.store(false, Ordering::Release);
                    }
                    return None;
                };
                if packet.is_flush() {
                    unsafe { ffi::avcodec_flush_buffers(ctx) };
                    self.has_codec_packets.store(false, Ordering::Release);
                    continue;
                }

                pts_hint_us = timestamp_to_micros(
                    unsafe { (*packet.as_ptr()).pts },
                    self.stream_time_base,
                );
                status = unsafe {
                    ffi::avcodec_decode_subtitle2(
                        ctx,
                        &mut subtitle,
                        &mut got,
                        packet.as_mut_ptr(),
                    )
                };
                if status >= 0 && !packet.is_empty_sentinel() {
                    self.has_codec_packets.store(true, Ordering::Release);
                }
                drop(packet);
                break;
            }
        }

        let managed = if got != 0 {
            refs::track(ForeignKind::Subtitle);
            self.notifications.notify_subtitle(&mut subtitle as *mut ffi::AVSubtitle);
            self.variant.hooks().create_frame_source(
                self,
                RawDecoded::Subtitle {
                    subtitle,
                    pts_hint_us: pts_hint_us.map(|pts| pts + state.delay_us),
                },
            )
        } else {
            None
        };

        if status < 0 {
            self.has_codec_packets.store(false, Ordering::Release);
            log::warn!(
                "stream {}: decode_subtitle2 failed: {}",
                self.stream_index,
                ffmpeg_next::Error::from(status)
            );
        }
        managed
    }

    /// Release the codec context and drain the queue
    ///
    /// Idempotent, serialized against codec opens by [`CODEC_LOCK`] and
    /// against an in-flight [`Self::receive_next_frame`] by the pump lock.
    pub fn dispose(&self) {
        if self.is_disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _codec_open = CODEC_LOCK.lock();
        let mut codec = self.codec.lock();
        if !codec.ctx.is_null() {
            unsafe { ffi::avcodec_free_context(&mut codec.ctx) };
            refs::untrack(ForeignKind::CodecContext);
        }
        self.packets.clear();
    }
}

impl Drop for MediaComponent {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl FrameHooks for AudioHooks {
    fn create_frame_source(
        &self,
        component: &MediaComponent,
        raw: RawDecoded,
    ) -> Option<MediaFrame> {
        let RawDecoded::Frame(frame) = raw else {
            return None;
        };

        let start = timestamp_to_micros(frame.best_effort_timestamp(), component.stream_time_base)
            .map(|pts| pts - component.start_time_offset_us)
            .unwrap_or(0);
        let mut duration =
            timestamp_to_micros(frame.duration_ticks(), component.stream_time_base).unwrap_or(0);
        if duration <= 0 && frame.sample_rate() > 0 {
            duration = frame.sample_count() as i64 * 1_000_000 / frame.sample_rate() as i64;
        }

        Some(MediaFrame::new(
            FramePayload::Audio(frame),
            MediaType::Audio,
            component.stream_index,
            start,
            start + duration,
        ))
    }

    fn materialize_frame(
        &self,
        _component: &MediaComponent,
        frame: MediaFrame,
        siblings: &[MediaBlock],
    ) -> MediaBlock {
        let start = frame.start_time_us();
        let mut end = frame.end_time_us();
        if end == start {
            if let Some(previous) = siblings.last() {
                end = start + previous.duration_us();
            }
        }

        let FramePayload::Audio(decoded) = frame.into_payload() else {
            unreachable!("audio component produced a non-audio frame");
        };
        let payload = BlockPayload::Audio {
            sample_rate: decoded.sample_rate().max(0) as u32,
            channels: decoded.channels().max(0) as u16,
            sample_count: decoded.sample_count().max(0) as usize,
            frame: decoded,
        };
        MediaBlock::new(MediaType::Audio, start, end, payload)
    }
}

impl FrameHooks for VideoState {
    fn create_frame_source(
        &self,
        component: &MediaComponent,
        raw: RawDecoded,
    ) -> Option<MediaFrame> {
        let RawDecoded::Frame(frame) = raw else {
            return None;
        };

        let start = timestamp_to_micros(frame.best_effort_timestamp(), component.stream_time_base)
            .map(|pts| pts - component.start_time_offset_us)
            .unwrap_or(0);
        let mut duration =
            timestamp_to_micros(frame.duration_ticks(), component.stream_time_base).unwrap_or(0);
        if duration <= 0 {
            let fps = rational_to_f64(self.frame_rate);
            if fps > 0.0 {
                duration = (1_000_000.0 / fps) as i64;
            }
        }

        Some(MediaFrame::new(
            FramePayload::Video(frame),
            MediaType::Video,
            component.stream_index,
            start,
            start + duration,
        ))
    }

    fn materialize_frame(
        &self,
        _component: &MediaComponent,
        frame: MediaFrame,
        siblings: &[MediaBlock],
    ) -> MediaBlock {
        let start = frame.start_time_us();
        let mut end = frame.end_time_us();
        if end == start {
            if let Some(previous) = siblings.last() {
                end = start + previous.duration_us();
            }
        }

        let FramePayload::Video(decoded) = frame.into_payload() else {
            unreachable!("video component produced a non-video frame");
        };
        let payload = BlockPayload::Video {
            width: decoded.width().max(0) as u32,
            height: decoded.height().max(0) as u32,
            smpte_timecode: smpte_timecode(start, rational_to_f64(self.frame_rate)),
            hardware_decoder: self.hardware.as_ref().map(|h| h.name.clone()),
            frame: decoded,
        };
        MediaBlock::new(MediaType::Video, start, end, payload)
    }
}

impl FrameHooks for SubtitleState {
    fn create_frame_source(
        &self,
        component: &MediaComponent,
        raw: RawDecoded,
    ) -> Option<MediaFrame> {
        let RawDecoded::Subtitle {
            mut subtitle,
            pts_hint_us,
        } = raw
        else {
            return None;
        };

        // AVSubtitle timestamps are already in microseconds; display times
        // are millisecond offsets from that base.
        let base = if subtitle.pts != ffi::AV_NOPTS_VALUE {
            subtitle.pts + self.delay_us
        } else {
            pts_hint_us.unwrap_or(0)
        } - component.start_time_offset_us;

        let start = base + subtitle.start_display_time as i64 * 1_000;
        let end = if subtitle.end_display_time > 0 {
            base + subtitle.end_display_time as i64 * 1_000
        } else {
            start + 3_000_000
        };

        let lines = unsafe { parse_subtitle_lines(&subtitle) };
        unsafe { ffi::avsubtitle_free(&mut subtitle) };
        refs::untrack(ForeignKind::Subtitle);

        Some(MediaFrame::new(
            FramePayload::Subtitle(lines),
            MediaType::Subtitle,
            component.stream_index,
            start,
            end,
        ))
    }

    fn materialize_frame(
        &self,
        _component: &MediaComponent,
        frame: MediaFrame,
        _siblings: &[MediaBlock],
    ) -> MediaBlock {
        let start = frame.start_time_us();
        let end = frame.end_time_us();
        let FramePayload::Subtitle(lines) = frame.into_payload() else {
            unreachable!("subtitle component produced a non-subtitle frame");
        };
        MediaBlock::new(
            MediaType::Subtitle,
            start,
            end,
            BlockPayload::Subtitle { lines },
        )
    }
}

fn dict_set(dict: &mut *mut ffi::AVDictionary, key: &str, value: &str) {
    let (Ok(key), Ok(value)) = (CString::new(key), CString::new(value)) else {
        return;
    };
    unsafe { ffi::av_dict_set(dict, key.as_ptr(), value.as_ptr(), 0) };
}

/// Warn once for every option key the codec left unconsumed
unsafe fn warn_unconsumed_options(stream_index: i32, dict: *mut ffi::AVDictionary) {
    let empty = CString::new("").unwrap();
    let mut entry: *const ffi::AVDictionaryEntry = std::ptr::null();
    loop {
        entry = ffi::av_dict_get(dict, empty.as_ptr(), entry, ffi::AV_DICT_IGNORE_SUFFIX as i32);
        if entry.is_null() {
            break;
        }
        log::warn!(
            "stream {}: codec option '{}' was not consumed",
            stream_index,
            CStr::from_ptr((*entry).key).to_string_lossy()
        );
    }
}
