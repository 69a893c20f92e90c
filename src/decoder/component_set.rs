//! Component grouping and packet routing
//!
//! A [`ComponentSet`] holds the selected components of one container, at
//! most one per media type. The reader routes demuxed packets through it by
//! stream index; the decoder iterates it; admission control aggregates its
//! buffer statistics. The main component (video if present, else audio) is
//! the one whose timeline drives snapping.

use crate::container::MediaContainer;
use crate::decoder::component::MediaComponent;
use crate::decoder::{MediaType, Packet};
use crate::utils::error::{MediaCoreError, Result};
use ffmpeg_sys_next as ffi;
use parking_lot::RwLock;
use std::sync::Arc;

/// Callback fired for every decoded audio/video frame, synchronously on the
/// decoder thread. The pointer is only valid for the duration of the call.
pub type OnFrameDecoded = Box<dyn Fn(*mut ffi::AVFrame, MediaType) + Send + Sync>;

/// Callback fired for every decoded subtitle, synchronously on the decoder
/// thread. The pointer is only valid for the duration of the call.
pub type OnSubtitleDecoded = Box<dyn Fn(*mut ffi::AVSubtitle) + Send + Sync>;

/// Optional engine hooks fired by the decode pumps
#[derive(Default)]
pub struct DecodeNotifications {
    on_frame_decoded: RwLock<Option<OnFrameDecoded>>,
    on_subtitle_decoded: RwLock<Option<OnSubtitleDecoded>>,
}

impl DecodeNotifications {
    /// Create an empty notification table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the audio/video frame hook
    pub fn set_on_frame_decoded(&self, callback: OnFrameDecoded) {
        *self.on_frame_decoded.write() = Some(callback);
    }

    /// Install the subtitle hook
    pub fn set_on_subtitle_decoded(&self, callback: OnSubtitleDecoded) {
        *self.on_subtitle_decoded.write() = Some(callback);
    }

    pub(crate) fn notify_frame(&self, frame: *mut ffi::AVFrame, media_type: MediaType) {
        if let Some(callback) = self.on_frame_decoded.read().as_ref() {
            callback(frame, media_type);
        }
    }

    pub(crate) fn notify_subtitle(&self, subtitle: *mut ffi::AVSubtitle) {
        if let Some(callback) = self.on_subtitle_decoded.read().as_ref() {
            callback(subtitle);
        }
    }
}

/// The selected components of one container
pub struct ComponentSet {
    audio: Option<Arc<MediaComponent>>,
    video: Option<Arc<MediaComponent>>,
    subtitle: Option<Arc<MediaComponent>>,
    notifications: Arc<DecodeNotifications>,
}

impl ComponentSet {
    /// Select and open components for a container
    ///
    /// Picks the first stream of each media type, honoring the options'
    /// per-type disable flags. Fails when no stream at all can be opened.
    pub fn open(container: &dyn MediaContainer) -> Result<ComponentSet> {
        let notifications = Arc::new(DecodeNotifications::new());
        let mut set = ComponentSet {
            audio: None,
            video: None,
            subtitle: None,
            notifications: Arc::clone(&notifications),
        };

        for stream in &container.media_info().streams {
            let Some(media_type) = stream.media_type else {
                continue;
            };
            if container.options().is_stream_disabled(media_type) {
                continue;
            }
            if set.get(media_type).is_some() {
                continue;
            }

            match MediaComponent::open(container, stream.index, Arc::clone(&notifications)) {
                Ok(component) => set.set(media_type, Arc::new(component)),
                Err(e) => {
                    log::warn!("stream {}: cannot open {} component: {}", stream.index, media_type, e);
                }
            }
        }

        if set.audio.is_none() && set.video.is_none() && set.subtitle.is_none() {
            return Err(MediaCoreError::Container(
                "no decodable stream could be opened".to_string(),
            ));
        }
        Ok(set)
    }

    fn set(&mut self, media_type: MediaType, component: Arc<MediaComponent>) {
        match media_type {
            MediaType::Audio => self.audio = Some(component),
            MediaType::Video => self.video = Some(component),
            MediaType::Subtitle => self.subtitle = Some(component),
        }
    }

    /// Component for a media type, if one was selected
    pub fn get(&self, media_type: MediaType) -> Option<&Arc<MediaComponent>> {
        match media_type {
            MediaType::Audio => self.audio.as_ref(),
            MediaType::Video => self.video.as_ref(),
            MediaType::Subtitle => self.subtitle.as_ref(),
        }
    }

    /// Route lookup for demuxed packets
    pub fn by_stream_index(&self, stream_index: i32) -> Option<&Arc<MediaComponent>> {
        self.all()
            .find(|component| component.stream_index() == stream_index)
    }

    /// The component whose timeline drives snapping: video if present,
    /// else audio
    pub fn main(&self) -> Option<&Arc<MediaComponent>> {
        self.video.as_ref().or(self.audio.as_ref())
    }

    /// Iterate the selected components in render-priority order
    pub fn all(&self) -> impl Iterator<Item = &Arc<MediaComponent>> {
        [self.video.as_ref(), self.audio.as_ref(), self.subtitle.as_ref()]
            .into_iter()
            .flatten()
    }

    /// Number of selected components
    pub fn count(&self) -> usize {
        self.all().count()
    }

    /// Aggregated queued bytes across components, for admission control
    pub fn packet_buffer_length(&self) -> usize {
        self.all().map(|c| c.packet_buffer_length()).sum()
    }

    /// Aggregated queued packet count across components
    pub fn packet_buffer_count(&self) -> usize {
        self.all().map(|c| c.packet_buffer_count()).sum()
    }

    /// Hand a demuxed packet to the component owning its stream
    ///
    /// Packets for unselected streams are released immediately.
    pub fn send_packet(&self, packet: Packet) {
        match self.by_stream_index(packet.stream_index()) {
            Some(component) => component.send_packet(Some(packet)),
            None => drop(packet),
        }
    }

    /// Queue the empty sentinel on every component (end-of-stream drain)
    pub fn send_empty_packets(&self) {
        for component in self.all() {
            component.send_empty_packet();
        }
    }

    /// Drain every component's packet queue
    pub fn clear_queued_packets(&self, flush_buffers: bool) {
        for component in self.all() {
            component.clear_queued_packets(flush_buffers);
        }
    }

    /// Dispose every component
    pub fn dispose(&self) {
        for component in self.all() {
            component.dispose();
        }
    }

    /// The notification table shared with the decode pumps
    pub fn notifications(&self) -> &Arc<DecodeNotifications> {
        &self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_notifications_are_silent() {
        let notifications = DecodeNotifications::new();
        // No hooks installed: both notify paths are no-ops.
        notifications.notify_frame(std::ptr::null_mut(), MediaType::Video);
        notifications.notify_subtitle(std::ptr::null_mut());
    }

    #[test]
    fn test_notify_frame_dispatches() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let notifications = DecodeNotifications::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_callback = Arc::clone(&hits);
        notifications.set_on_frame_decoded(Box::new(move |_, media_type| {
            assert_eq!(media_type, MediaType::Audio);
            hits_in_callback.fetch_add(1, Ordering::SeqCst);
        }));

        notifications.notify_frame(std::ptr::null_mut(), MediaType::Audio);
        notifications.notify_frame(std::ptr::null_mut(), MediaType::Audio);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
