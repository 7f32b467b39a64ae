// src/compositor.rs

//! The per-cell painter: cell + frame state -> pixel rectangle.
//!
//! [`render_cell`] is the only code that writes cell-sized pixels. It runs
//! on render workers for bulk repaint and on the main thread for the cursor
//! overlay; everything it needs is in the [`PaintCtx`] snapshot so both call
//! sites see the same frame state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cell::{Cell, CellFlags, Row};
use crate::color::Color;
use crate::font::{Font, FontSet, GlyphImage, LineMetrics};
use crate::pixels::{Pix, PixOp, Rect};
use crate::term::{Coord, CursorStyle, Palette, Terminal};

/// Immutable per-frame paint state, cloned into each render worker.
#[derive(Debug, Clone)]
pub struct PaintCtx {
    pub cols: usize,
    pub cell_width: usize,
    pub cell_height: usize,
    pub palette: Palette,
    pub reverse_video: bool,
    pub cursor_style: CursorStyle,
    /// Blink phase is `Off`: blinking glyphs vanish into their background.
    pub blink_off: bool,
    /// Selection anchors, normalized so `start <= end` by `(row, col)`.
    pub selection: Option<(Coord, Coord)>,
    /// Ring position of the viewport top, for grid-anchored selection.
    pub view: usize,
    pub num_rows: usize,
    pub fonts: FontSet,
    /// Set when any painted cell carried the blink attribute; the frame
    /// driver checks it after the worker fence to arm the blink clock.
    pub blink_seen: Arc<AtomicBool>,
}

impl PaintCtx {
    /// Snapshots the terminal state one frame of painting depends on.
    pub fn for_frame(term: &Terminal) -> Self {
        use crate::term::BlinkPhase;

        let selection = if term.selection.is_active() {
            let (mut start, mut end) = (term.selection.start, term.selection.end);
            if start.row > end.row || (start.row == end.row && start.col > end.col) {
                std::mem::swap(&mut start, &mut end);
            }
            Some((start, end))
        } else {
            None
        };

        PaintCtx {
            cols: term.cols,
            cell_width: term.cell_width,
            cell_height: term.cell_height,
            palette: term.palette,
            reverse_video: term.reverse_video,
            cursor_style: term.cursor_style,
            blink_off: term.blink.phase == BlinkPhase::Off,
            selection,
            view: term.grid().view,
            num_rows: term.grid().num_rows,
            fonts: term.fonts.clone(),
            blink_seen: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether viewport cell (`col`, `row`) is inside the selection.
    ///
    /// The selection is anchored in the grid, not the viewport: the probed
    /// row is `(row + view) mod num_rows` and compared grid-absolutely
    /// against the normalized anchors.
    pub fn coord_is_selected(&self, col: usize, row: usize) -> bool {
        let Some((start, end)) = self.selection else {
            return false;
        };
        let row = ((row + self.view) % self.num_rows) as i32;
        let col = col as i32;

        if start.row == end.row {
            row == start.row && col >= start.col && col <= end.col
        } else if row == start.row {
            col >= start.col
        } else if row == end.row {
            col <= end.col
        } else {
            row > start.row && row < end.row
        }
    }
}

/// Paints one cell, honoring its `CLEAN` bit.
///
/// Returns the number of cell columns written (wide glyphs cover several),
/// or 0 when the cell was already clean and nothing was touched. On return
/// the cell is marked clean.
pub fn render_cell(
    ctx: &PaintCtx,
    pix: Pix,
    cell: &mut Cell,
    col: usize,
    row: usize,
    has_cursor: bool,
) -> usize {
    if cell.is_clean() {
        return 0;
    }
    cell.flags.insert(CellFlags::CLEAN);

    let width = ctx.cell_width as i32;
    let height = ctx.cell_height as i32;
    let x = col as i32 * width;
    let y = row as i32 * height;

    let block_cursor = has_cursor && ctx.cursor_style == CursorStyle::Block;
    let selected = ctx.coord_is_selected(col, row);

    let mut fg_rgb = if cell.flags.contains(CellFlags::HAVE_FG) {
        cell.fg
    } else if !ctx.reverse_video {
        ctx.palette.fg
    } else {
        ctx.palette.bg
    };
    let mut bg_rgb = if cell.flags.contains(CellFlags::HAVE_BG) {
        cell.bg
    } else if !ctx.reverse_video {
        ctx.palette.bg
    } else {
        ctx.palette.fg
    };

    // An odd number of reversing sources flips; an even number cancels.
    if block_cursor ^ cell.flags.contains(CellFlags::REVERSE) ^ selected {
        std::mem::swap(&mut fg_rgb, &mut bg_rgb);
    }

    let blinking = cell.flags.contains(CellFlags::BLINK);
    if blinking {
        ctx.blink_seen.store(true, Ordering::Relaxed);
        if ctx.blink_off {
            fg_rgb = bg_rgb;
        }
    }

    let mut fg = Color::from_rgb(fg_rgb);
    let mut bg = Color::from_rgb_with_alpha(
        bg_rgb,
        if block_cursor { 0xffff } else { ctx.palette.alpha },
    );

    if cell.flags.contains(CellFlags::DIM) {
        fg.dim();
    }

    if block_cursor {
        if let Some((text, cursor)) = ctx.palette.cursor_override() {
            // User-configured cursor colors override all attributes.
            fg = Color::from_rgb(text);
            bg = Color::from_rgb(cursor);
        }
    }

    let font = ctx.fonts.for_flags(cell.flags);
    let glyph = font.glyph_for(cell.wc);
    let cell_cols = glyph.map_or(1, |g| g.cols.max(1));

    pix.fill_rect(
        PixOp::Src,
        bg,
        Rect {
            x,
            y,
            width: cell_cols as i32 * width,
            height,
        },
    );

    // Bar and underline cursors are drawn on top; block is the color swap.
    if has_cursor && ctx.cursor_style != CursorStyle::Block {
        let cursor_color = match ctx.palette.cursor_override() {
            Some((_, cursor)) => Color::from_rgb(cursor),
            None => Color::from_rgb(fg_rgb),
        };
        match ctx.cursor_style {
            CursorStyle::Bar => pix.fill_rect(
                PixOp::Src,
                cursor_color,
                Rect {
                    x,
                    y,
                    width: 1,
                    height,
                },
            ),
            CursorStyle::Underline => {
                draw_rule(ctx, pix, font.underline(), font, cursor_color, x, y, cell_cols)
            }
            CursorStyle::Block => unreachable!(),
        }
    }

    if cell.wc == '\0' || cell.flags.contains(CellFlags::CONCEAL) {
        return cell_cols;
    }

    if let Some(glyph) = glyph {
        let gx = x + glyph.x;
        let gy = y + font.extents().ascent - glyph.y;
        match &glyph.image {
            GlyphImage::Argb(data) => {
                // Pre-rendered image (typically a color emoji); skip it
                // entirely during the off phase.
                if !(blinking && ctx.blink_off) {
                    pix.composite_argb(data, glyph.width, glyph.height, gx, gy);
                }
            }
            GlyphImage::Alpha(mask) => {
                pix.composite_alpha_mask(fg, mask, glyph.width, glyph.height, gx, gy);
            }
        }
    }

    if cell.flags.contains(CellFlags::UNDERLINE) {
        draw_rule(
            ctx,
            pix,
            font.underline(),
            font,
            Color::from_rgb(fg_rgb),
            x,
            y,
            cell_cols,
        );
    }
    if cell.flags.contains(CellFlags::STRIKETHROUGH) {
        draw_rule(
            ctx,
            pix,
            font.strikeout(),
            font,
            Color::from_rgb(fg_rgb),
            x,
            y,
            cell_cols,
        );
    }

    cell_cols
}

/// Draws an underline/strikeout rule from the font's reported metrics.
#[allow(clippy::too_many_arguments)]
fn draw_rule(
    ctx: &PaintCtx,
    pix: Pix,
    metrics: LineMetrics,
    font: &Arc<dyn Font>,
    color: Color,
    x: i32,
    y: i32,
    cols: usize,
) {
    let extents = font.extents();
    let baseline = y + extents.height - extents.descent;
    let rule_y = baseline - metrics.position - metrics.thickness / 2;
    pix.fill_rect(
        PixOp::Src,
        color,
        Rect {
            x,
            y: rule_y,
            width: cols as i32 * ctx.cell_width as i32,
            height: metrics.thickness,
        },
    );
}

/// Paints every stale cell of a viewport row.
///
/// Columns go right to left so a wide glyph, painted after the cells it
/// spills into, ends up on top.
pub fn render_row(ctx: &PaintCtx, pix: Pix, row: &mut Row, row_no: usize) {
    for col in (0..ctx.cols).rev() {
        render_cell(ctx, pix, &mut row.cells[col], col, row_no, false);
    }
}
