// src/os.rs

//! Thin OS shims: the PTY window-size ioctl.

use std::os::unix::io::RawFd;

use crate::error::RenderError;

nix::ioctl_write_ptr_bad!(tiocswinsz, nix::libc::TIOCSWINSZ, nix::pty::Winsize);

/// Tells the kernel (and through it the PTY client) the new terminal size.
pub fn signal_window_size(
    fd: RawFd,
    rows: u16,
    cols: u16,
    xpixel: u16,
    ypixel: u16,
) -> Result<(), RenderError> {
    let winsize = nix::pty::Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: xpixel,
        ws_ypixel: ypixel,
    };
    unsafe { tiocswinsz(fd, &winsize) }
        .map(|_| ())
        .map_err(RenderError::WindowSizeSignal)
}
