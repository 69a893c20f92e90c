//! Component lifecycle scenarios
//!
//! These tests exercise codec initialization, the packet -> frame pump's
//! drain and flush behavior, and resource discipline against synthetic
//! containers. No media files are involved; where a test needs decodable
//! input, the packets come from the library's own encoder.

mod common;

use common::{encode_aac_silence, payload_packet, timed_packet, MockContainer, TestStream, TEST_GUARD};
use mediacore::decoder::{DecodeNotifications, FramePayload};
use mediacore::utils::refs::{self, ForeignKind};
use mediacore::{ComponentSet, MediaComponent, MediaCoreError, MediaOptions, MediaType};
use std::sync::Arc;

fn open_component(container: &MockContainer, stream_index: i32) -> MediaComponent {
    MediaComponent::open(
        container,
        stream_index,
        Arc::new(DecodeNotifications::new()),
    )
    .expect("component should open")
}

#[test]
fn init_opens_h264_and_aac_components() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(
        &[TestStream::VideoH264, TestStream::AudioAac],
        MediaOptions::default(),
    );

    let video = open_component(&container, 0);
    assert_eq!(video.media_type(), MediaType::Video);
    assert_eq!(video.codec_name(), "h264");
    assert_eq!(video.stream_index(), 0);
    assert_eq!(video.start_time_offset_us(), 0);
    assert_eq!(video.duration_us(), 10_000_000);
    // The queue holds exactly the priming flush packet.
    assert_eq!(video.packet_buffer_count(), 1);
    assert_eq!(video.packet_buffer_length(), 0);
    assert!(!video.has_codec_packets());
    assert!(!video.is_disposed());

    let audio = open_component(&container, 1);
    assert_eq!(audio.media_type(), MediaType::Audio);
    assert_eq!(audio.codec_name(), "aac");
    assert_eq!(audio.start_time_offset_us(), 0);
    assert_eq!(audio.packet_buffer_count(), 1);
}

#[test]
fn forced_codec_miss_falls_back_to_default() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let mut options = MediaOptions::default();
    options
        .decoder_codec
        .insert(0, "does_not_exist".to_string());
    let container = MockContainer::new(&[TestStream::VideoH264], options);

    let video = open_component(&container, 0);
    assert_eq!(video.codec_name(), "h264");
}

#[test]
fn no_decoder_available_fails_without_leaking() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let baseline = refs::count(ForeignKind::CodecContext);

    let container = MockContainer::new(&[TestStream::VideoNoDecoder], MediaOptions::default());
    let result = MediaComponent::open(&container, 0, Arc::new(DecodeNotifications::new()));

    assert!(matches!(result, Err(MediaCoreError::Container(_))));
    // No codec context remains allocated.
    assert_eq!(refs::count(ForeignKind::CodecContext), baseline);
}

#[test]
fn invalid_stream_index_is_an_argument_error() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::VideoH264], MediaOptions::default());
    let result = MediaComponent::open(&container, 7, Arc::new(DecodeNotifications::new()));
    assert!(matches!(result, Err(MediaCoreError::Argument(_))));
}

#[test]
fn lifetime_bytes_count_non_sentinel_packets_only() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::AudioAac], MediaOptions::default());
    let audio = open_component(&container, 0);

    audio.send_packet(Some(payload_packet(0, &[0u8; 100])));
    audio.send_packet(Some(payload_packet(0, &[0u8; 50])));
    audio.send_packet(None);
    audio.send_empty_packet();

    assert_eq!(audio.lifetime_bytes_read(), 150);
    // priming flush + 2 real + 2 empty sentinels
    assert_eq!(audio.packet_buffer_count(), 5);
    assert_eq!(audio.packet_buffer_length(), 150);
}

#[test]
fn decode_drain_yields_frames_then_none() {
    let _serialized = TEST_GUARD.lock().unwrap();

    // Real raw AAC packets from the library's own encoder, plus the
    // extradata the decoder needs to read them.
    let (packets, extradata) = encode_aac_silence(0, 10);
    let container = MockContainer::new(&[TestStream::AudioAac], MediaOptions::default());
    container.set_stream_extradata(0, &extradata);
    let audio = open_component(&container, 0);

    for packet in packets {
        audio.send_packet(Some(packet));
    }
    // The empty sentinel requests drain mode.
    audio.send_packet(None);

    let mut produced = 0;
    loop {
        match audio.receive_next_frame() {
            Some(frame) => {
                produced += 1;
                assert_eq!(frame.media_type(), MediaType::Audio);
                assert!(frame.duration_us() > 0);
            }
            None => break,
        }
        assert!(produced < 100, "pump failed to terminate");
    }

    // At least one real frame came out; after the drain the queue is empty
    // and the codec holds no packets.
    assert!(produced >= 1);
    assert_eq!(audio.packet_buffer_count(), 0);
    assert!(!audio.has_codec_packets());

    // The pump stays usable after a drain.
    assert!(audio.receive_next_frame().is_none());
}

#[test]
fn corrupt_packets_are_tolerated_and_drained() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::AudioAac], MediaOptions::default());
    let audio = open_component(&container, 0);

    // Garbage payloads exercise the pump's error tolerance; the empty
    // sentinel then requests drain mode.
    for _ in 0..3 {
        audio.send_packet(Some(payload_packet(0, &[0u8; 64])));
    }
    audio.send_packet(None);

    // Every pump attempt consumes at least one queued packet, so a bounded
    // number of attempts fully drains the queue even across decode errors.
    let mut produced = 0;
    for _ in 0..20 {
        if audio.receive_next_frame().is_some() {
            produced += 1;
        }
    }

    // Garbage never decodes into frames; the state machine must still
    // terminate with the queue fully consumed and the codec drained.
    assert_eq!(produced, 0);
    assert_eq!(audio.packet_buffer_count(), 0);
    assert!(!audio.has_codec_packets());
}

#[test]
fn flush_mid_stream_discards_queued_packets() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::AudioAac], MediaOptions::default());
    let audio = open_component(&container, 0);

    for _ in 0..5 {
        audio.send_packet(Some(payload_packet(0, &[0u8; 32])));
    }
    assert_eq!(audio.packet_buffer_count(), 6); // priming flush + 5

    audio.clear_queued_packets(true);
    assert_eq!(audio.packet_buffer_count(), 0);
    assert_eq!(audio.packet_buffer_length(), 0);
    assert!(!audio.has_codec_packets());

    // A second batch proceeds normally through the pump.
    for _ in 0..5 {
        audio.send_packet(Some(payload_packet(0, &[0u8; 32])));
    }
    assert_eq!(audio.packet_buffer_count(), 5);
    let _ = audio.receive_next_frame();
    assert!(audio.packet_buffer_count() < 5);
}

#[test]
fn subtitle_component_decodes_srt_text() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::SubtitleSrt], MediaOptions::default());
    let subtitle = open_component(&container, 0);
    assert_eq!(subtitle.media_type(), MediaType::Subtitle);

    // One second in, two seconds long, in the stream's 90kHz timebase.
    subtitle.send_packet(Some(timed_packet(
        0,
        b"Hello, world!",
        90_000,
        180_000,
    )));

    let frame = subtitle
        .receive_next_frame()
        .expect("subtitle should decode");
    assert_eq!(frame.media_type(), MediaType::Subtitle);
    assert_eq!(frame.start_time_us(), 1_000_000);
    assert!(frame.end_time_us() >= frame.start_time_us());

    match frame.payload() {
        FramePayload::Subtitle(lines) => {
            assert!(!lines.is_empty());
            assert!(lines.iter().any(|line| line.text.contains("Hello")));
        }
        _ => panic!("expected subtitle payload"),
    }
}

#[test]
fn subtitle_delay_shifts_presentation_times() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let mut options = MediaOptions::default();
    options.subtitles_delay_us = 500_000;
    let container = MockContainer::new(&[TestStream::SubtitleSrt], options);
    let subtitle = open_component(&container, 0);

    subtitle.send_packet(Some(timed_packet(0, b"Delayed", 90_000, 180_000)));
    let frame = subtitle
        .receive_next_frame()
        .expect("subtitle should decode");
    assert_eq!(frame.start_time_us(), 1_500_000);
}

#[test]
fn dispose_is_idempotent_and_safe_against_inflight_receive() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let baseline = refs::count(ForeignKind::CodecContext);

    let container = MockContainer::new(&[TestStream::AudioAac], MediaOptions::default());
    let audio = Arc::new(open_component(&container, 0));
    for _ in 0..10 {
        audio.send_packet(Some(payload_packet(0, &[0u8; 16])));
    }

    let pump = {
        let audio = Arc::clone(&audio);
        std::thread::spawn(move || {
            for _ in 0..50 {
                let _ = audio.receive_next_frame();
            }
        })
    };

    audio.dispose();
    audio.dispose();
    pump.join().unwrap();

    assert!(audio.is_disposed());
    assert_eq!(audio.packet_buffer_count(), 0);
    // Pumping after disposal yields nothing and must not crash.
    assert!(audio.receive_next_frame().is_none());

    drop(audio);
    drop(container);
    assert_eq!(refs::count(ForeignKind::CodecContext), baseline);
}

#[test]
fn component_set_selects_routes_and_aggregates() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(
        &[
            TestStream::VideoH264,
            TestStream::AudioAac,
            TestStream::SubtitleSrt,
        ],
        MediaOptions::default(),
    );

    let set = ComponentSet::open(&container).expect("component set should open");
    assert_eq!(set.count(), 3);
    assert_eq!(set.main().unwrap().media_type(), MediaType::Video);
    assert_eq!(set.by_stream_index(1).unwrap().media_type(), MediaType::Audio);
    assert!(set.by_stream_index(9).is_none());

    // Each component begins life with its priming flush packet.
    assert_eq!(set.packet_buffer_count(), 3);
    assert_eq!(set.packet_buffer_length(), 0);

    set.send_packet(payload_packet(1, &[0u8; 40]));
    assert_eq!(set.packet_buffer_length(), 40);
    assert_eq!(set.get(MediaType::Audio).unwrap().packet_buffer_count(), 2);

    // Packets for unselected streams are released, not routed.
    set.send_packet(payload_packet(9, &[0u8; 8]));
    assert_eq!(set.packet_buffer_length(), 40);

    set.clear_queued_packets(true);
    assert_eq!(set.packet_buffer_count(), 0);
    set.dispose();
}

#[test]
fn component_set_honors_subtitle_disable() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let mut options = MediaOptions::default();
    options.is_subtitle_disabled = true;
    let container = MockContainer::new(
        &[TestStream::AudioAac, TestStream::SubtitleSrt],
        options,
    );

    let set = ComponentSet::open(&container).expect("component set should open");
    assert_eq!(set.count(), 1);
    assert!(set.get(MediaType::Subtitle).is_none());
    assert_eq!(set.main().unwrap().media_type(), MediaType::Audio);
}

#[test]
fn component_set_with_no_usable_stream_fails() {
    let _serialized = TEST_GUARD.lock().unwrap();
    let container = MockContainer::new(&[TestStream::VideoNoDecoder], MediaOptions::default());
    let result = ComponentSet::open(&container);
    assert!(matches!(result, Err(MediaCoreError::Container(_))));
}
