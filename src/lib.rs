//! mediacore - the decoding core of a media playback engine
//!
//! This crate turns an open media container into a time-ordered stream of
//! renderer-ready blocks. It owns three things and nothing else:
//!
//! * per-stream codec initialization ([`decoder::MediaComponent`]),
//! * the packet -> frame pump around FFmpeg's send/receive contract,
//! * the read -> decode -> render pipeline ([`player::MediaEngine`]) that
//!   bridges a demuxer to the block renderers.
//!
//! Demuxing internals, pixel/sample conversion and the actual presentation
//! backends are external collaborators; their interfaces are pinned in
//! [`container`] and [`player`].

pub mod container;
pub mod decoder;
pub mod player;
pub mod utils;

// Raw FFmpeg bindings, re-exported for hosts that implement their own
// containers or renderers against the foreign types.
pub use ffmpeg_sys_next as ffi;

pub use container::{InputContainer, MediaContainer, MediaInfo, MediaOptions, StreamInfo};
pub use decoder::{ComponentSet, MediaComponent, MediaFrame, MediaType, Packet, PacketQueue};
pub use player::{BlockRenderer, MediaBlock, MediaBlockBuffer, MediaEngine, RealTimeClock};
pub use utils::error::{MediaCoreError, Result};
