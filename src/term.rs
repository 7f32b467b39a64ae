// src/term.rs

//! The terminal's visual state: two ring grids, palette, cursor, selection,
//! blink and flash.
//!
//! The emulator state machine (outside this crate) mutates cells and logs
//! scroll damage; the renderer consumes this structure wholesale. Everything
//! here is plain data plus a few damage helpers.

use std::os::unix::io::RawFd;

use serde::{Deserialize, Serialize};

use crate::blink::BlinkClock;
use crate::cell::CellFlags;
use crate::config::RenderConfig;
use crate::font::FontSet;
use crate::grid::Grid;

/// Cursor rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CursorStyle {
    #[default]
    Block,
    Underline,
    Bar,
}

/// A grid coordinate. `col == -1` is the selection's "unset" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub col: i32,
    pub row: i32,
}

impl Coord {
    pub const UNSET: Coord = Coord { col: -1, row: -1 };
}

/// Default colors, background alpha and the optional cursor color pair.
///
/// `cursor_text`/`cursor_cursor` use the high bit as a presence flag; `0`
/// means "not configured" and the cursor inverts cell colors instead.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub fg: u32,
    pub bg: u32,
    /// Background alpha, `0..=0xffff`; applies to non-block-cursor cells.
    pub alpha: u16,
    pub cursor_text: u32,
    pub cursor_cursor: u32,
}

impl Palette {
    /// The user-configured (text, cursor) color pair, if present.
    pub fn cursor_override(&self) -> Option<(u32, u32)> {
        if self.cursor_text >> 31 != 0 {
            debug_assert!(self.cursor_cursor >> 31 != 0);
            Some((
                self.cursor_text & 0x00ff_ffff,
                self.cursor_cursor & 0x00ff_ffff,
            ))
        } else {
            None
        }
    }
}

/// Selection anchors in grid-absolute coordinates.
///
/// Either both anchors are set or neither is; [`Selection::clear`] and
/// [`Selection::set`] maintain that.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub start: Coord,
    pub end: Coord,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            start: Coord::UNSET,
            end: Coord::UNSET,
        }
    }
}

impl Selection {
    pub fn is_active(&self) -> bool {
        self.start.col != -1 && self.end.col != -1
    }

    pub fn set(&mut self, start: Coord, end: Coord) {
        debug_assert!(start.col >= 0 && end.col >= 0);
        self.start = start;
        self.end = end;
    }

    pub fn clear(&mut self) {
        self.start = Coord::UNSET;
        self.end = Coord::UNSET;
    }
}

/// Blink phase: `On` shows the glyph, `Off` hides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlinkPhase {
    #[default]
    On,
    Off,
}

/// Blink timer state. `clock` is `None` when timer creation failed and the
/// subsystem degraded to always-on.
#[derive(Debug, Default)]
pub struct Blink {
    pub active: bool,
    pub phase: BlinkPhase,
    pub clock: Option<BlinkClock>,
}

/// Visual-bell state.
#[derive(Debug, Default)]
pub struct Flash {
    pub active: bool,
}

/// Which of the two grids is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveGrid {
    Normal,
    Alt,
}

/// Everything the renderer reads (and whose damage state it writes back).
pub struct Terminal {
    pub normal: Grid,
    pub alt: Grid,
    active: ActiveGrid,

    /// Viewport size in cells.
    pub rows: usize,
    pub cols: usize,
    /// Surface size in (scaled) pixels.
    pub width: i32,
    pub height: i32,
    pub cell_width: usize,
    pub cell_height: usize,
    /// Integer DPI multiplier from the outputs the surface is on.
    pub scale: i32,

    pub palette: Palette,
    pub reverse_video: bool,
    pub cursor: Coord,
    pub cursor_style: CursorStyle,
    pub hide_cursor: bool,
    pub selection: Selection,
    pub blink: Blink,
    pub flash: Flash,

    /// Emulator scroll region, rows `[start, end)`; clamped on resize.
    pub scroll_region: std::ops::Range<usize>,
    pub scrollback_lines: usize,

    /// PTY master fd for TIOCSWINSZ, when the core drives a real PTY.
    pub pty_fd: Option<RawFd>,
    pub fonts: FontSet,
}

impl Terminal {
    pub fn new(
        config: &RenderConfig,
        cols: usize,
        rows: usize,
        cell_width: usize,
        cell_height: usize,
        fonts: FontSet,
    ) -> Self {
        let mut normal = Grid::new(rows + config.scrollback_lines, cols);
        let mut alt = Grid::new(rows, cols);
        for r in 0..rows {
            normal.row_in_view_mut(r);
            alt.row_in_view_mut(r);
        }

        Terminal {
            normal,
            alt,
            active: ActiveGrid::Normal,
            rows,
            cols,
            width: (cols * cell_width) as i32,
            height: (rows * cell_height) as i32,
            cell_width,
            cell_height,
            scale: 1,
            palette: Palette {
                fg: config.foreground,
                bg: config.background,
                alpha: config.alpha,
                cursor_text: config.cursor_text,
                cursor_cursor: config.cursor_cursor,
            },
            reverse_video: false,
            cursor: Coord { col: 0, row: 0 },
            cursor_style: config.cursor_style,
            hide_cursor: false,
            selection: Selection::default(),
            blink: Blink::default(),
            flash: Flash::default(),
            scroll_region: 0..rows,
            scrollback_lines: config.scrollback_lines,
            pty_fd: None,
            fonts,
        }
    }

    pub fn grid(&self) -> &Grid {
        match self.active {
            ActiveGrid::Normal => &self.normal,
            ActiveGrid::Alt => &self.alt,
        }
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        match self.active {
            ActiveGrid::Normal => &mut self.normal,
            ActiveGrid::Alt => &mut self.alt,
        }
    }

    /// Switches between the primary and the alternate grid, invalidating the
    /// whole view.
    pub fn use_alt_grid(&mut self, alt: bool) {
        let wanted = if alt { ActiveGrid::Alt } else { ActiveGrid::Normal };
        if self.active != wanted {
            self.active = wanted;
            self.damage_view();
        }
    }

    /// Marks every viewport cell as needing repaint.
    pub fn damage_view(&mut self) {
        let rows = self.rows;
        let grid = self.grid_mut();
        for r in 0..rows {
            let row = grid.row_in_view_mut(r);
            row.dirty = true;
            for cell in row.cells.iter_mut() {
                cell.flags.remove(CellFlags::CLEAN);
            }
        }
    }

    /// Whether any viewport cell carries the blink attribute.
    pub fn view_has_blink(&self) -> bool {
        let grid = self.grid();
        (0..self.rows).any(|r| {
            grid.row_in_view(r).is_some_and(|row| {
                row.cells
                    .iter()
                    .any(|c| c.flags.contains(CellFlags::BLINK))
            })
        })
    }

    /// Flips the blink phase and dirties every visible blinking cell.
    /// Called when the blink timer fires.
    pub fn toggle_blink_phase(&mut self) {
        self.blink.phase = match self.blink.phase {
            BlinkPhase::On => BlinkPhase::Off,
            BlinkPhase::Off => BlinkPhase::On,
        };
        let rows = self.rows;
        let grid = self.grid_mut();
        for r in 0..rows {
            let row = grid.row_in_view_mut(r);
            let mut any = false;
            for cell in row.cells.iter_mut() {
                if cell.flags.contains(CellFlags::BLINK) {
                    cell.flags.remove(CellFlags::CLEAN);
                    any = true;
                }
            }
            row.dirty |= any;
        }
    }
}
