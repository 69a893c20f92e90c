//! Packet ownership and per-stream packet queues
//!
//! A [`Packet`] is an owned handle to a demuxed AVPacket. Besides real
//! packets, two sentinel kinds travel through the queues:
//!
//! * the *flush* packet, recognized by pointer identity of its data field
//!   against a well-known marker; the decode pump consumes it by flushing
//!   codec buffers and it is never handed to the codec;
//! * the *empty* packet (null data, size 0), which the codec interprets as
//!   a request to enter drain mode.
//!
//! The queue exclusively owns each packet until dequeued. Clearing or
//! dropping the queue releases every remaining packet exactly once.

use crate::utils::refs::{self, ForeignKind};
use ffmpeg_sys_next as ffi;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ptr::NonNull;

/// Well-known marker. A packet whose data field points here is the flush
/// sentinel; the address is what matters, the bytes are never read.
static FLUSH_MARKER: [u8; 5] = *b"FLUSH";

/// Owned handle to an AVPacket
///
/// Dropping the handle returns the packet (and any payload buffer it
/// references) to FFmpeg.
pub struct Packet {
    ptr: NonNull<ffi::AVPacket>,
}

// The handle is moved between the reader and decoder threads; the payload
// is only touched by whoever currently owns the handle.
unsafe impl Send for Packet {}

impl Packet {
    /// Allocate an empty packet shell for a demuxer to fill
    pub fn alloc() -> Option<Packet> {
        let raw = unsafe { ffi::av_packet_alloc() };
        NonNull::new(raw).map(|ptr| {
            refs::track(ForeignKind::Packet);
            Packet { ptr }
        })
    }

    /// Create the flush sentinel for a stream
    pub fn flush(stream_index: i32) -> Packet {
        let mut packet = Packet::alloc().expect("packet allocation failed");
        unsafe {
            let raw = packet.ptr.as_mut();
            raw.data = FLUSH_MARKER.as_ptr() as *mut u8;
            raw.size = 0;
            raw.stream_index = stream_index;
        }
        packet
    }

    /// Create the empty/null sentinel for a stream
    ///
    /// Sending it asks the codec to enter drain mode (or refresh
    /// attached-picture output).
    pub fn empty(stream_index: i32) -> Packet {
        let mut packet = Packet::alloc().expect("packet allocation failed");
        unsafe {
            let raw = packet.ptr.as_mut();
            raw.data = std::ptr::null_mut();
            raw.size = 0;
            raw.stream_index = stream_index;
        }
        packet
    }

    /// Pointer-identity test against the flush marker
    pub fn is_flush(&self) -> bool {
        std::ptr::eq(unsafe { self.ptr.as_ref() }.data, FLUSH_MARKER.as_ptr())
    }

    /// Whether this is the empty/null sentinel
    pub fn is_empty_sentinel(&self) -> bool {
        let raw = unsafe { self.ptr.as_ref() };
        raw.data.is_null() && raw.size == 0
    }

    /// Stream this packet belongs to
    pub fn stream_index(&self) -> i32 {
        unsafe { self.ptr.as_ref() }.stream_index
    }

    /// Payload size in bytes; sentinels report 0
    pub fn size(&self) -> i32 {
        unsafe { self.ptr.as_ref() }.size
    }

    /// Packet duration in stream-timebase ticks
    pub fn duration_ticks(&self) -> i64 {
        unsafe { self.ptr.as_ref() }.duration
    }

    /// Raw pointer for codec calls; ownership stays with the handle
    pub fn as_ptr(&self) -> *const ffi::AVPacket {
        self.ptr.as_ptr()
    }

    /// Raw mutable pointer for demuxer fills; ownership stays with the handle
    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVPacket {
        self.ptr.as_ptr()
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        let mut raw = self.ptr.as_ptr();
        // The flush sentinel borrows static storage; av_packet_free only
        // releases the buf reference, which sentinels do not carry.
        unsafe { ffi::av_packet_free(&mut raw) };
        refs::untrack(ForeignKind::Packet);
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index())
            .field("size", &self.size())
            .field("flush", &self.is_flush())
            .finish()
    }
}

#[derive(Default)]
struct QueueInner {
    packets: VecDeque<Packet>,
    buffer_length: usize,
    duration_ticks: i64,
}

/// FIFO of owned packets for one stream
///
/// Single-producer (reader thread) / single-consumer (decoder thread);
/// internal mutation is protected by the queue's own lock.
pub struct PacketQueue {
    inner: Mutex<QueueInner>,
}

impl PacketQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Append a packet; sentinels count as one packet but contribute no bytes
    pub fn push(&self, packet: Packet) {
        let mut inner = self.inner.lock();
        if packet.size() > 0 {
            inner.buffer_length += packet.size() as usize;
        }
        inner.duration_ticks += packet.duration_ticks().max(0);
        inner.packets.push_back(packet);
    }

    /// Probe the head packet without removing it
    ///
    /// The closure runs under the queue lock, so the packet reference
    /// cannot outlive the probe.
    pub fn peek<R>(&self, f: impl FnOnce(Option<&Packet>) -> R) -> R {
        let inner = self.inner.lock();
        f(inner.packets.front())
    }

    /// Remove and return the head packet
    pub fn dequeue(&self) -> Option<Packet> {
        let mut inner = self.inner.lock();
        let packet = inner.packets.pop_front()?;
        if packet.size() > 0 {
            inner.buffer_length = inner.buffer_length.saturating_sub(packet.size() as usize);
        }
        inner.duration_ticks -= packet.duration_ticks().max(0);
        Some(packet)
    }

    /// Put a dequeued packet back at the head, keeping arrival order intact
    ///
    /// Used by the decode pump when the codec reports it is full: the packet
    /// must stay next in line.
    pub fn requeue_front(&self, packet: Packet) {
        let mut inner = self.inner.lock();
        if packet.size() > 0 {
            inner.buffer_length += packet.size() as usize;
        }
        inner.duration_ticks += packet.duration_ticks().max(0);
        inner.packets.push_front(packet);
    }

    /// Release every queued packet
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.buffer_length = 0;
        inner.duration_ticks = 0;
    }

    /// Sum of payload bytes currently queued
    pub fn buffer_length(&self) -> usize {
        self.inner.lock().buffer_length
    }

    /// Number of queued packets, sentinels included
    pub fn count(&self) -> usize {
        self.inner.lock().packets.len()
    }

    /// Sum of queued packet durations, in stream-timebase ticks
    pub fn duration_ticks(&self) -> i64 {
        self.inner.lock().duration_ticks
    }

    /// Whether the queue holds no packets
    pub fn is_empty(&self) -> bool {
        self.inner.lock().packets.is_empty()
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
