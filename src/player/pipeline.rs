//! The read -> decode -> render pipeline
//!
//! Three cooperating loops bridge the demuxer to the renderers: the packet
//! reader pulls from the container and routes by stream index, the frame
//! decoder pumps every component into its block buffer, and the renderer
//! timer hands the block covering the clock to each renderer. The loops
//! signal progress through cycle events and shut down cooperatively; thread
//! abort leaks packets and frames and is never used.

use crate::container::MediaContainer;
use crate::decoder::{ComponentSet, MediaComponent, MediaType};
use crate::player::blocks::{BlockPayload, MediaBlock, MediaBlockBuffer};
use crate::player::clock::RealTimeClock;
use crate::player::events::CycleEvent;
use crate::player::BlockRenderer;
use crate::utils::error::{MediaCoreError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How far past the clock the main component's blocks should reach before
/// the decoder relaxes
const DECODE_LOOKAHEAD_US: i64 = 250_000;

/// Renderer timer cadence; no frame-accurate guarantee
const RENDER_INTERVAL: Duration = Duration::from_millis(15);

/// Reader yield between cycles
const READER_IDLE: Duration = Duration::from_millis(2);

/// Decoder yield when the main timeline is behind the lookahead
const DECODER_IDLE: Duration = Duration::from_millis(1);

/// Decoder yield when the main timeline is comfortably ahead
const DECODER_IDLE_COVERED: Duration = Duration::from_millis(4);

fn type_index(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Video => 0,
        MediaType::Audio => 1,
        MediaType::Subtitle => 2,
    }
}

/// One block buffer per media type
pub struct BlockBuffers {
    video: MediaBlockBuffer,
    audio: MediaBlockBuffer,
    subtitle: MediaBlockBuffer,
}

impl BlockBuffers {
    fn new() -> Self {
        Self {
            video: MediaBlockBuffer::new(MediaType::Video),
            audio: MediaBlockBuffer::new(MediaType::Audio),
            subtitle: MediaBlockBuffer::new(MediaType::Subtitle),
        }
    }

    /// Buffer for a media type
    pub fn get(&self, media_type: MediaType) -> &MediaBlockBuffer {
        match media_type {
            MediaType::Video => &self.video,
            MediaType::Audio => &self.audio,
            MediaType::Subtitle => &self.subtitle,
        }
    }

    fn clear(&self) {
        self.video.clear();
        self.audio.clear();
        self.subtitle.clear();
    }
}

/// Engine state written by the renderer tick, readable from anywhere
#[derive(Default)]
pub struct EngineState {
    video_smpte_timecode: RwLock<String>,
    video_hardware_decoder: RwLock<String>,
    is_using_hardware_decoding: AtomicBool,
    frames_rendered: AtomicU64,
}

impl EngineState {
    /// SMPTE timecode of the last rendered video block
    pub fn video_smpte_timecode(&self) -> String {
        self.video_smpte_timecode.read().clone()
    }

    /// Name of the hardware decoder behind the last rendered video block
    pub fn video_hardware_decoder(&self) -> String {
        self.video_hardware_decoder.read().clone()
    }

    /// Whether video frames come from a hardware decoder
    pub fn is_using_hardware_decoding(&self) -> bool {
        self.is_using_hardware_decoding.load(Ordering::Relaxed)
    }

    /// Blocks handed to renderers since the workers started
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    fn record_video_render(&self, block: &MediaBlock) {
        if let BlockPayload::Video {
            smpte_timecode,
            hardware_decoder,
            ..
        } = block.payload()
        {
            *self.video_smpte_timecode.write() = smpte_timecode.clone();
            match hardware_decoder {
                Some(name) => {
                    *self.video_hardware_decoder.write() = name.clone();
                    self.is_using_hardware_decoding.store(true, Ordering::Relaxed);
                }
                None => {
                    self.is_using_hardware_decoding.store(false, Ordering::Relaxed);
                }
            }
        }
    }
}

#[derive(Default)]
struct Workers {
    reader: Option<thread::JoinHandle<()>>,
    decoder: Option<thread::JoinHandle<()>>,
    renderer: Option<thread::JoinHandle<()>>,
}

/// The decoding pipeline of one open container
pub struct MediaEngine {
    container: RwLock<Option<Arc<dyn MediaContainer>>>,
    components: RwLock<Option<Arc<ComponentSet>>>,
    buffers: RwLock<Option<Arc<BlockBuffers>>>,
    renderers: Mutex<HashMap<MediaType, Box<dyn BlockRenderer>>>,
    clock: Arc<RealTimeClock>,
    state: Arc<EngineState>,

    packet_reading: CycleEvent,
    frame_decoding: CycleEvent,
    block_rendering: CycleEvent,
    // Serializes renderer tick re-entry and lets shutdown await the
    // in-flight tick.
    render_tick: CycleEvent,

    is_stop_workers_pending: AtomicBool,
    workers: Mutex<Workers>,
    last_render_time: [AtomicI64; 3],
}

impl MediaEngine {
    /// Create an engine with no container attached
    pub fn new() -> Arc<MediaEngine> {
        Arc::new(MediaEngine {
            container: RwLock::new(None),
            components: RwLock::new(None),
            buffers: RwLock::new(None),
            renderers: Mutex::new(HashMap::new()),
            clock: Arc::new(RealTimeClock::new()),
            state: Arc::new(EngineState::default()),
            packet_reading: CycleEvent::new(),
            frame_decoding: CycleEvent::new(),
            block_rendering: CycleEvent::new(),
            render_tick: CycleEvent::new(),
            is_stop_workers_pending: AtomicBool::new(false),
            workers: Mutex::new(Workers::default()),
            last_render_time: [
                AtomicI64::new(i64::MIN),
                AtomicI64::new(i64::MIN),
                AtomicI64::new(i64::MIN),
            ],
        })
    }

    /// Attach a container: select streams and open their components
    pub fn open(&self, container: Arc<dyn MediaContainer>) -> Result<()> {
        if self.workers.lock().reader.is_some() {
            return Err(MediaCoreError::Internal(
                "cannot open a container while workers are running".to_string(),
            ));
        }

        let components = Arc::new(ComponentSet::open(container.as_ref())?);
        log::info!(
            "opened {} component(s) for '{}'",
            components.count(),
            container.media_info().source
        );

        *self.components.write() = Some(components);
        *self.buffers.write() = Some(Arc::new(BlockBuffers::new()));
        *self.container.write() = Some(container);
        Ok(())
    }

    /// Start the reader, decoder and renderer workers
    ///
    /// `renderers` supplies the presentation backend per media type;
    /// media types without a renderer are still decoded and buffered.
    pub fn start_workers(
        self: &Arc<Self>,
        renderers: Vec<(MediaType, Box<dyn BlockRenderer>)>,
    ) -> Result<()> {
        let container = self.container.read().clone().ok_or_else(|| {
            MediaCoreError::Internal("no container is open".to_string())
        })?;
        let components = self.components.read().clone().ok_or_else(|| {
            MediaCoreError::Internal("no components are open".to_string())
        })?;
        let buffers = self.buffers.read().clone().ok_or_else(|| {
            MediaCoreError::Internal("no block buffers are allocated".to_string())
        })?;

        let mut workers = self.workers.lock();
        if workers.reader.is_some() || workers.decoder.is_some() || workers.renderer.is_some() {
            return Err(MediaCoreError::Internal(
                "workers are already running".to_string(),
            ));
        }

        self.is_stop_workers_pending.store(false, Ordering::Release);
        for last in &self.last_render_time {
            last.store(i64::MIN, Ordering::Relaxed);
        }
        {
            let mut table = self.renderers.lock();
            table.clear();
            for (media_type, renderer) in renderers {
                table.insert(media_type, renderer);
            }
        }

        let engine = Arc::clone(self);
        let reader_container = Arc::clone(&container);
        let reader_components = Arc::clone(&components);
        workers.reader = Some(
            thread::Builder::new()
                .name("media-reader".to_string())
                .spawn(move || engine.run_packet_reader(reader_container, reader_components))
                .map_err(|e| MediaCoreError::Internal(e.to_string()))?,
        );

        let engine = Arc::clone(self);
        let decoder_buffers = Arc::clone(&buffers);
        workers.decoder = Some(
            thread::Builder::new()
                .name("media-decoder".to_string())
                .spawn(move || engine.run_frame_decoder(container, components, decoder_buffers))
                .map_err(|e| MediaCoreError::Internal(e.to_string()))?,
        );

        let engine = Arc::clone(self);
        workers.renderer = Some(
            thread::Builder::new()
                .name("media-render".to_string())
                .spawn(move || engine.run_block_renderer(buffers))
                .map_err(|e| MediaCoreError::Internal(e.to_string()))?,
        );

        log::debug!("pipeline workers started");
        Ok(())
    }

    /// Stop the pipeline cooperatively and release everything it held
    ///
    /// Order matters: pause the clock, raise the shutdown flag, break the
    /// demuxer out of any blocking read, retire the renderer timer after
    /// its in-flight tick, close the renderers, then join the reader and
    /// decoder. Never aborts a thread.
    pub fn stop_workers(&self) {
        self.clock.pause();
        self.is_stop_workers_pending.store(true, Ordering::Release);

        if let Some(container) = self.container.read().clone() {
            container.signal_abort_reads();
        }

        // Renderer timer first: await the in-flight tick, then join.
        self.render_tick.wait();
        let renderer_handle = self.workers.lock().renderer.take();
        if let Some(handle) = renderer_handle {
            let _ = handle.join();
        }

        for renderer in self.renderers.lock().values_mut() {
            renderer.close();
        }

        let (reader_handle, decoder_handle) = {
            let mut workers = self.workers.lock();
            (workers.reader.take(), workers.decoder.take())
        };
        if let Some(handle) = reader_handle {
            let _ = handle.join();
        }
        if let Some(handle) = decoder_handle {
            let _ = handle.join();
        }

        self.renderers.lock().clear();

        // Everything is quiescent: drain queues, release blocks, drop the
        // component and container references.
        if let Some(components) = self.components.write().take() {
            components.clear_queued_packets(true);
            components.dispose();
        }
        if let Some(buffers) = self.buffers.write().take() {
            buffers.clear();
        }
        *self.container.write() = None;

        self.packet_reading.complete();
        self.frame_decoding.complete();
        self.block_rendering.complete();
        self.clock.reset();
        log::debug!("pipeline workers stopped");
    }

    /// Whether a cooperative shutdown has been requested
    pub fn is_stop_workers_pending(&self) -> bool {
        self.is_stop_workers_pending.load(Ordering::Acquire)
    }

    /// The playback clock driving the renderer
    pub fn clock(&self) -> &Arc<RealTimeClock> {
        &self.clock
    }

    /// Render-side engine state
    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// Components of the open container, if any
    pub fn components(&self) -> Option<Arc<ComponentSet>> {
        self.components.read().clone()
    }

    /// Block buffers of the open container, if any
    pub fn block_buffers(&self) -> Option<Arc<BlockBuffers>> {
        self.buffers.read().clone()
    }

    /// The open container, if any
    pub fn container(&self) -> Option<Arc<dyn MediaContainer>> {
        self.container.read().clone()
    }

    /// Number of renderers currently attached
    pub fn renderer_count(&self) -> usize {
        self.renderers.lock().len()
    }

    /// Cycle event completed after each reader iteration
    pub fn packet_reading_cycle(&self) -> &CycleEvent {
        &self.packet_reading
    }

    /// Cycle event completed after each decoder iteration
    pub fn frame_decoding_cycle(&self) -> &CycleEvent {
        &self.frame_decoding
    }

    /// Cycle event completed after each renderer tick
    pub fn block_rendering_cycle(&self) -> &CycleEvent {
        &self.block_rendering
    }

    fn can_read_more_packets(&self, container: &Arc<dyn MediaContainer>) -> bool {
        !container.is_read_aborted() && !container.is_at_end_of_stream()
    }

    fn should_read_more_packets(
        &self,
        container: &Arc<dyn MediaContainer>,
        components: &Arc<ComponentSet>,
    ) -> bool {
        if self.is_stop_workers_pending() {
            return false;
        }
        container.media_info().is_live_stream
            || components.packet_buffer_length() < container.options().download_cache_length
    }

    fn can_read_more_frames_of(
        &self,
        container: &Arc<dyn MediaContainer>,
        component: &MediaComponent,
    ) -> bool {
        self.can_read_more_packets(container)
            || component.packet_buffer_length() > 0
            || component.has_codec_packets()
    }

    fn run_packet_reader(
        &self,
        container: Arc<dyn MediaContainer>,
        components: Arc<ComponentSet>,
    ) {
        let mut drain_requested = false;
        while !self.is_stop_workers_pending() {
            self.packet_reading.begin();

            while self.should_read_more_packets(&container, &components)
                && self.can_read_more_packets(&container)
            {
                match container.read_next_packet() {
                    Ok(Some(packet)) => components.send_packet(packet),
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("packet read failed: {}", e);
                        break;
                    }
                }
            }

            // End of stream: ask every codec to drain, once.
            if container.is_at_end_of_stream() && !drain_requested {
                components.send_empty_packets();
                drain_requested = true;
            }

            self.packet_reading.complete();
            if self.is_stop_workers_pending() {
                break;
            }
            thread::sleep(READER_IDLE);
        }
        self.packet_reading.complete();
        log::debug!("packet reader exited");
    }

    fn run_frame_decoder(
        &self,
        container: Arc<dyn MediaContainer>,
        components: Arc<ComponentSet>,
        buffers: Arc<BlockBuffers>,
    ) {
        while !self.is_stop_workers_pending() {
            self.frame_decoding.begin();

            let mut main_covered = false;
            for component in components.all() {
                if self.is_stop_workers_pending() {
                    break;
                }

                let buffer = buffers.get(component.media_type());
                while !buffer.is_full() && self.can_read_more_frames_of(&container, component) {
                    if !Self::add_next_block(buffer, component) {
                        break;
                    }
                    if self.is_stop_workers_pending() {
                        break;
                    }
                }

                // Between components: is the main timeline ahead of the
                // clock by at least the lookahead?
                if let Some(main) = components.main() {
                    let clock = self.clock.position_us();
                    main_covered = buffers
                        .get(main.media_type())
                        .range_end()
                        .map_or(false, |end| end >= clock + DECODE_LOOKAHEAD_US);
                }
            }

            self.frame_decoding.complete();
            if self.is_stop_workers_pending() {
                break;
            }
            thread::sleep(if main_covered {
                DECODER_IDLE_COVERED
            } else {
                DECODER_IDLE
            });
        }
        self.frame_decoding.complete();
        log::debug!("frame decoder exited");
    }

    /// Decode one frame of the component and append it to its buffer
    fn add_next_block(buffer: &MediaBlockBuffer, component: &MediaComponent) -> bool {
        match component.receive_next_frame() {
            Some(frame) => {
                buffer.add(frame, component);
                true
            }
            None => false,
        }
    }

    fn run_block_renderer(&self, buffers: Arc<BlockBuffers>) {
        while !self.is_stop_workers_pending() {
            // Overruns skip rather than stack.
            if !self.render_tick.is_completed() {
                thread::sleep(RENDER_INTERVAL);
                continue;
            }

            self.render_tick.begin();
            self.block_rendering.begin();
            self.render_once(&buffers);
            self.block_rendering.complete();
            self.render_tick.complete();

            thread::sleep(RENDER_INTERVAL);
        }
        self.block_rendering.complete();
        self.render_tick.complete();
        log::debug!("block renderer exited");
    }

    fn render_once(&self, buffers: &BlockBuffers) {
        let clock = self.clock.position_us();
        let mut renderers = self.renderers.lock();

        for media_type in MediaType::ALL {
            let Some(renderer) = renderers.get_mut(&media_type) else {
                continue;
            };
            let index = type_index(media_type);

            let rendered = buffers
                .get(media_type)
                .with_block_at(clock, |block| {
                    let start = block.start_time_us();
                    if start == self.last_render_time[index].load(Ordering::Relaxed) {
                        return None;
                    }
                    renderer.render(block, clock);
                    if media_type == MediaType::Video {
                        self.state.record_video_render(block);
                    }
                    Some(start)
                })
                .flatten();

            if let Some(start) = rendered {
                self.last_render_time[index].store(start, Ordering::Relaxed);
                self.state.frames_rendered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for MediaEngine {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_index_is_stable() {
        assert_eq!(type_index(MediaType::Video), 0);
        assert_eq!(type_index(MediaType::Audio), 1);
        assert_eq!(type_index(MediaType::Subtitle), 2);
    }

    #[test]
    fn test_engine_starts_detached() {
        let engine = MediaEngine::new();
        assert!(engine.container().is_none());
        assert!(engine.components().is_none());
        assert!(engine.block_buffers().is_none());
        assert_eq!(engine.renderer_count(), 0);
        assert!(!engine.is_stop_workers_pending());
    }

    #[test]
    fn test_start_workers_requires_open_container() {
        let engine = MediaEngine::new();
        let result = engine.start_workers(Vec::new());
        assert!(matches!(result, Err(MediaCoreError::Internal(_))));
    }

    #[test]
    fn test_stop_workers_without_start_is_harmless() {
        let engine = MediaEngine::new();
        engine.stop_workers();
        engine.stop_workers();
        assert_eq!(engine.clock().position_us(), 0);
    }

    #[test]
    fn test_engine_state_defaults() {
        let state = EngineState::default();
        assert_eq!(state.video_smpte_timecode(), "");
        assert_eq!(state.video_hardware_decoder(), "");
        assert!(!state.is_using_hardware_decoding());
        assert_eq!(state.frames_rendered(), 0);
    }
}
