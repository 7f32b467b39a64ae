// src/sink.rs

//! The presentation seam: what the renderer needs from the compositor
//! connection and its shared-memory buffer pool.
//!
//! Buffers are addressed by id rather than by borrow so one object (the
//! Wayland connection, or a test double) can implement both traits: the
//! renderer keeps the [`Pix`] view it got at acquire time and talks to the
//! surface about the same buffer by id.

use crate::pixels::Pix;

/// Pool-assigned buffer identity, stable for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// An acquired frame buffer: identity plus a writable pixel view.
#[derive(Debug, Clone, Copy)]
pub struct BufferRef {
    pub id: BufferId,
    pub pix: Pix,
}

/// Shared-memory buffer pool. `acquire` never returns a buffer the
/// compositor still holds.
pub trait BufferPool {
    /// Gets a free buffer of the given size, growing the pool up to
    /// `min_free` spare buffers. `None` means the pool is exhausted.
    fn acquire(&mut self, width: i32, height: i32, min_free: usize) -> Option<BufferRef>;

    /// Returns an acquired buffer without presenting it (the "all clean"
    /// early-out).
    fn release(&mut self, id: BufferId);
}

/// Compositor-facing surface operations, one frame at a time.
pub trait Surface {
    /// Marks a buffer-coordinate rectangle as needing compositor redraw.
    fn damage(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Attaches the buffer for the next commit; the compositor owns it
    /// until its release signal.
    fn attach(&mut self, id: BufferId);

    fn set_buffer_scale(&mut self, scale: i32);

    /// Registers a frame callback delivering the next "you may draw" tick.
    fn request_frame_callback(&mut self);

    fn commit(&mut self);
}
