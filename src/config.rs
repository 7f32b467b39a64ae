// src/config.rs

//! Render-facing configuration.
//!
//! Parsing a config file is the embedder's job; this is the deserialized
//! shape the rendering core recognizes, with defaults matching a plain
//! opaque dark terminal.

use serde::{Deserialize, Serialize};

use crate::term::CursorStyle;

/// Options the rendering core recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Default foreground, `0xRRGGBB`.
    pub foreground: u32,
    /// Default background, `0xRRGGBB`.
    pub background: u32,
    /// Background alpha, `0..=0xffff`. Applies everywhere except under a
    /// block cursor, which is always opaque.
    pub alpha: u16,
    pub cursor_style: CursorStyle,
    /// Cursor text color; high bit set means "configured", 0 means unset.
    pub cursor_text: u32,
    /// Cursor block color; same encoding as `cursor_text`.
    pub cursor_cursor: u32,
    /// Scrollback capacity of the normal grid, in rows.
    pub scrollback_lines: usize,
    /// Render worker threads; 0 renders on the main thread.
    pub workers: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            foreground: 0xdcdccc,
            background: 0x111111,
            alpha: 0xffff,
            cursor_style: CursorStyle::Block,
            cursor_text: 0,
            cursor_cursor: 0,
            scrollback_lines: 1000,
            workers: 0,
        }
    }
}

impl RenderConfig {
    /// Sets the cursor color pair, encoding the presence bit.
    pub fn with_cursor_colors(mut self, text: u32, cursor: u32) -> Self {
        self.cursor_text = 0x8000_0000 | (text & 0x00ff_ffff);
        self.cursor_cursor = 0x8000_0000 | (cursor & 0x00ff_ffff);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_cursor_override() {
        let config = RenderConfig::default();
        assert_eq!(config.cursor_text, 0);
        assert_eq!(config.cursor_cursor, 0);
        assert_eq!(config.alpha, 0xffff);
    }

    #[test]
    fn cursor_colors_carry_presence_bit() {
        let config = RenderConfig::default().with_cursor_colors(0xffffff, 0xff8800);
        assert_eq!(config.cursor_text, 0x80ff_ffff);
        assert_eq!(config.cursor_cursor, 0x80ff_8800);
    }
}
