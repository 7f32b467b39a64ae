// src/error.rs

//! Typed failures of the rendering core.
//!
//! Nothing here is fatal by policy: the frame callback is the natural retry
//! clock, so every failure either degrades the current frame or skips it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Arming or disarming the blink timer failed; the blink subsystem
    /// degrades to "always on" and rendering continues.
    #[error("failed to program blink timer: {0}")]
    TimerArm(#[source] nix::Error),

    /// The buffer pool had no free buffer; the frame is skipped and a
    /// refresh is requested on the next callback.
    #[error("no free buffer for a {width}x{height} frame")]
    BufferAcquire { width: i32, height: i32 },

    /// The TIOCSWINSZ ioctl failed; logged and ignored, the emulator
    /// recovers from the size mismatch on its own.
    #[error("failed to signal PTY window size: {0}")]
    WindowSizeSignal(#[source] nix::Error),
}
