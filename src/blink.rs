// src/blink.rs

//! The 2 Hz blink clock, backed by a timerfd.
//!
//! The renderer arms the clock when it paints the first blinking cell after
//! a dormant period and disarms it once no visible cell blinks anymore. The
//! embedding event loop polls [`BlinkClock::fd`] and calls
//! [`crate::term::Terminal::toggle_blink_phase`] on expiry.

use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use log::debug;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use crate::error::RenderError;

/// Half a blink period: glyph on for 500 ms, off for 500 ms.
pub const BLINK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct BlinkClock {
    timer: TimerFd,
}

impl BlinkClock {
    /// Creates a disarmed clock.
    pub fn new() -> Result<Self, RenderError> {
        let timer = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
        )
        .map_err(RenderError::TimerArm)?;
        Ok(BlinkClock { timer })
    }

    /// Starts the periodic 500 ms tick.
    pub fn arm(&self) -> Result<(), RenderError> {
        debug!("arming blink timer");
        self.timer
            .set(
                Expiration::Interval(TimeSpec::from_duration(BLINK_INTERVAL)),
                TimerSetTimeFlags::empty(),
            )
            .map_err(RenderError::TimerArm)
    }

    /// Stops the tick.
    pub fn disarm(&self) -> Result<(), RenderError> {
        debug!("disarming blink timer");
        self.timer.unset().map_err(RenderError::TimerArm)
    }

    /// Consumes a pending expiration, if any. Returns whether the timer had
    /// fired since the last wait.
    pub fn consume_tick(&self) -> bool {
        self.timer.wait().is_ok()
    }

    /// The pollable timer fd.
    pub fn fd(&self) -> RawFd {
        self.timer.as_raw_fd()
    }
}
