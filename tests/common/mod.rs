//! Shared fixtures for the scenario tests
//!
//! Builds in-memory containers with synthetic streams so component and
//! pipeline behavior can be exercised without media files on disk.

#![allow(dead_code)]

use mediacore::container::StreamHandle;
use mediacore::ffi;
use mediacore::{MediaContainer, MediaInfo, MediaOptions, Packet, Result, StreamInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Serializes tests that assert on the global foreign-allocation counters
pub static TEST_GUARD: Mutex<()> = Mutex::new(());

/// Stream blueprints available to the mock container
pub enum TestStream {
    /// H.264 video, 640x360 @ 25fps, 90kHz timebase
    VideoH264,

    /// AAC audio, 48kHz stereo
    AudioAac,

    /// SubRip subtitles, 90kHz timebase
    SubtitleSrt,

    /// A video stream whose codec id has no decoder
    VideoNoDecoder,
}

/// In-memory container over a synthetic AVFormatContext
///
/// `read_next_packet` reports end of stream immediately; packets for decode
/// tests are pushed straight into components instead.
pub struct MockContainer {
    fmt: *mut ffi::AVFormatContext,
    info: MediaInfo,
    options: MediaOptions,
    aborted: AtomicBool,
    eof: AtomicBool,
}

unsafe impl Send for MockContainer {}
unsafe impl Sync for MockContainer {}

impl MockContainer {
    pub fn new(streams: &[TestStream], options: MediaOptions) -> MockContainer {
        unsafe {
            let fmt = ffi::avformat_alloc_context();
            assert!(!fmt.is_null());

            for blueprint in streams {
                let stream = ffi::avformat_new_stream(fmt, std::ptr::null());
                assert!(!stream.is_null());
                let par = (*stream).codecpar;
                (*stream).time_base = ffi::AVRational { num: 1, den: 90_000 };

                match blueprint {
                    TestStream::VideoH264 => {
                        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                        (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_H264;
                        (*par).width = 640;
                        (*par).height = 360;
                        (*par).format = ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;
                        (*stream).avg_frame_rate = ffi::AVRational { num: 25, den: 1 };
                    }
                    TestStream::AudioAac => {
                        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
                        (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_AAC;
                        (*par).sample_rate = 48_000;
                        (*par).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP as i32;
                        ffi::av_channel_layout_default(&mut (*par).ch_layout, 2);
                        (*stream).time_base = ffi::AVRational { num: 1, den: 48_000 };
                    }
                    TestStream::SubtitleSrt => {
                        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE;
                        (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_SUBRIP;
                    }
                    TestStream::VideoNoDecoder => {
                        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                        (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_NONE;
                    }
                }
            }

            let mut stream_infos = Vec::new();
            for i in 0..(*fmt).nb_streams {
                let stream = *(*fmt).streams.offset(i as isize);
                stream_infos.push(StreamInfo::from_stream(StreamHandle::from_raw(stream)));
            }

            let info = MediaInfo {
                source: "mock://container".to_string(),
                format_name: "mock".to_string(),
                duration_us: Some(10_000_000),
                start_time_us: 0,
                bitrate: 0,
                is_live_stream: false,
                streams: stream_infos,
            };

            MockContainer {
                fmt,
                info,
                options,
                aborted: AtomicBool::new(false),
                eof: AtomicBool::new(false),
            }
        }
    }
}

impl MockContainer {
    /// Attach codec extradata to a stream, as a demuxer would
    ///
    /// Needed for raw (non-ADTS) AAC packets, whose decoder reads the
    /// AudioSpecificConfig from the stream parameters.
    pub fn set_stream_extradata(&self, stream_index: i32, extradata: &[u8]) {
        unsafe {
            assert!((stream_index as u32) < (*self.fmt).nb_streams);
            let stream = *(*self.fmt).streams.offset(stream_index as isize);
            let par = (*stream).codecpar;
            let size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffi::av_mallocz(size) as *mut u8;
            assert!(!buf.is_null());
            std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
            (*par).extradata = buf;
            (*par).extradata_size = extradata.len() as i32;
        }
    }
}

impl MediaContainer for MockContainer {
    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn options(&self) -> &MediaOptions {
        &self.options
    }

    fn stream(&self, stream_index: i32) -> Option<StreamHandle> {
        unsafe {
            if stream_index < 0 || stream_index as u32 >= (*self.fmt).nb_streams {
                return None;
            }
            Some(StreamHandle::from_raw(
                *(*self.fmt).streams.offset(stream_index as isize),
            ))
        }
    }

    fn read_next_packet(&self) -> Result<Option<Packet>> {
        self.eof.store(true, Ordering::Release);
        Ok(None)
    }

    fn is_read_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn is_at_end_of_stream(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    fn signal_abort_reads(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    fn media_start_time_offset(&self) -> i64 {
        self.info.start_time_us
    }
}

impl Drop for MockContainer {
    fn drop(&mut self) {
        unsafe { ffi::avformat_free_context(self.fmt) };
    }
}

/// A real packet filled with the given bytes
pub fn payload_packet(stream_index: i32, payload: &[u8]) -> Packet {
    let mut packet = Packet::alloc().expect("packet allocation failed");
    unsafe {
        let raw = packet.as_mut_ptr();
        assert!(ffi::av_new_packet(raw, payload.len() as i32) >= 0);
        std::ptr::copy_nonoverlapping(payload.as_ptr(), (*raw).data, payload.len());
        (*raw).stream_index = stream_index;
    }
    packet
}

/// A real packet with timing, for subtitle decoding
pub fn timed_packet(stream_index: i32, payload: &[u8], pts: i64, duration: i64) -> Packet {
    let mut packet = payload_packet(stream_index, payload);
    unsafe {
        let raw = packet.as_mut_ptr();
        (*raw).pts = pts;
        (*raw).dts = pts;
        (*raw).duration = duration;
    }
    packet
}

/// Encode silence with the native AAC encoder
///
/// Returns real decodable raw AAC packets (48kHz stereo, timestamps in a
/// 1/48000 timebase) together with the encoder's extradata, which the
/// decoding side needs via [`MockContainer::set_stream_extradata`].
pub fn encode_aac_silence(stream_index: i32, frame_count: usize) -> (Vec<Packet>, Vec<u8>) {
    unsafe {
        let codec = ffi::avcodec_find_encoder(ffi::AVCodecID::AV_CODEC_ID_AAC);
        assert!(!codec.is_null(), "native AAC encoder is always built");

        let mut ctx = ffi::avcodec_alloc_context3(codec);
        assert!(!ctx.is_null());
        (*ctx).sample_rate = 48_000;
        (*ctx).sample_fmt = ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP;
        (*ctx).bit_rate = 128_000;
        (*ctx).time_base = ffi::AVRational { num: 1, den: 48_000 };
        (*ctx).flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        ffi::av_channel_layout_default(&mut (*ctx).ch_layout, 2);

        assert!(
            ffi::avcodec_open2(ctx, codec, std::ptr::null_mut()) >= 0,
            "AAC encoder should open"
        );
        let frame_size = (*ctx).frame_size as usize;
        assert!(frame_size > 0);
        assert!(!(*ctx).extradata.is_null() && (*ctx).extradata_size > 0);
        let extradata =
            std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize).to_vec();

        let mut packets = Vec::new();
        let collect = |ctx: *mut ffi::AVCodecContext, packets: &mut Vec<Packet>| loop {
            let mut packet = Packet::alloc().expect("packet allocation failed");
            let ret = ffi::avcodec_receive_packet(ctx, packet.as_mut_ptr());
            if ret < 0 {
                break;
            }
            (*packet.as_mut_ptr()).stream_index = stream_index;
            packets.push(packet);
        };

        for i in 0..frame_count {
            let frame = ffi::av_frame_alloc();
            assert!(!frame.is_null());
            (*frame).nb_samples = frame_size as i32;
            (*frame).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP as i32;
            (*frame).sample_rate = 48_000;
            ffi::av_channel_layout_default(&mut (*frame).ch_layout, 2);
            assert!(ffi::av_frame_get_buffer(frame, 0) >= 0);
            for channel in 0..2 {
                std::ptr::write_bytes((*frame).data[channel], 0, frame_size * 4);
            }
            (*frame).pts = (i * frame_size) as i64;

            assert!(ffi::avcodec_send_frame(ctx, frame) >= 0);
            collect(ctx, &mut packets);

            let mut frame = frame;
            ffi::av_frame_free(&mut frame);
        }

        // Flush the encoder to recover its delayed packets.
        assert!(ffi::avcodec_send_frame(ctx, std::ptr::null()) >= 0);
        collect(ctx, &mut packets);

        ffi::avcodec_free_context(&mut ctx);
        assert!(!packets.is_empty(), "encoder produced no packets");
        (packets, extradata)
    }
}
