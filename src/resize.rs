// src/resize.rs

//! Window and scale changes: rebuild both ring grids, reflow what fits,
//! re-home the cursor and tell the PTY.
//!
//! Reflow is column-truncating: row `r` of the old ring is copied into row
//! `r` of the new ring, `min(new_cols, old_cols)` cells wide, tail zeroed.
//! The copy loop is deliberately isolated in [`reflow`] so a wrap-aware
//! version can replace it without touching the rest.

use std::cmp::min;

use log::{debug, warn};

use crate::cell::Row;
use crate::error::RenderError;
use crate::grid::Grid;
use crate::os;
use crate::renderer::Renderer;
use crate::sink::{BufferPool, Surface};
use crate::term::Terminal;

/// Applies a new window size and output scale.
///
/// `width`/`height` are in logical (unscaled) pixels; `scale` is the
/// highest integer scale among the outputs the surface currently sits on
/// (1 before the first output enter). The computed scale is adopted first,
/// then dimensions are converted to buffer pixels.
pub fn render_resize<S>(
    term: &mut Terminal,
    renderer: &mut Renderer,
    sink: &mut S,
    width: i32,
    height: i32,
    scale: i32,
) -> Result<(), RenderError>
where
    S: Surface + BufferPool,
{
    let width = width * scale;
    let height = height * scale;

    if width == 0 && height == 0 {
        // Not fully up and running yet.
        return Ok(());
    }
    if width == term.width && height == term.height && scale == term.scale {
        return Ok(());
    }

    term.width = width;
    term.height = height;
    term.scale = scale;

    let old_rows = term.rows;

    let new_cols = (width as usize / term.cell_width).max(1);
    let new_rows = (height as usize / term.cell_height).max(1);
    let new_normal_rows = new_rows + term.scrollback_lines;
    let new_alt_rows = new_rows;

    term.normal.offset %= new_normal_rows;
    term.normal.view %= new_normal_rows;
    term.alt.offset %= new_alt_rows;
    term.alt.view %= new_alt_rows;

    rebuild_grid(&mut term.normal, new_normal_rows, new_cols, new_rows);
    rebuild_grid(&mut term.alt, new_alt_rows, new_cols, new_rows);

    term.cols = new_cols;
    term.rows = new_rows;

    debug!(
        "resize: {}x{} px (scale {}), grid: cols={}, rows={}",
        term.width, term.height, term.scale, term.cols, term.rows
    );

    if let Some(fd) = term.pty_fd {
        if let Err(err) = os::signal_window_size(
            fd,
            term.rows as u16,
            term.cols as u16,
            term.width as u16,
            term.height as u16,
        ) {
            // A size mismatch is recoverable by the emulator.
            warn!("{}", err);
        }
    }

    if term.scroll_region.start >= term.rows {
        term.scroll_region.start = 0;
    }
    if term.scroll_region.end >= old_rows {
        term.scroll_region.end = term.rows;
    }

    term.cursor.row = min(term.cursor.row, term.rows as i32 - 1);
    term.cursor.col = min(term.cursor.col, term.cols as i32 - 1);

    renderer.forget_last_cursor();
    term.damage_view();
    renderer.refresh(term, sink)
}

/// Replaces a grid's ring with a `new_num_rows`-slot ring of
/// `new_cols`-wide rows, pre-allocating the `view_rows` viewport rows and
/// reflowing the old content.
fn rebuild_grid(grid: &mut Grid, new_num_rows: usize, new_cols: usize, view_rows: usize) {
    let mut rows: Vec<Option<Box<Row>>> = Vec::with_capacity(new_num_rows);
    rows.resize_with(new_num_rows, || None);
    for r in 0..view_rows {
        rows[(grid.view + r) % new_num_rows] = Some(Box::new(Row::new(new_cols)));
    }

    reflow(&mut rows, new_cols, new_num_rows, grid.rows(), grid.num_cols, grid.num_rows);

    // Old rows drop here.
    grid.replace_rows(rows, new_num_rows, new_cols);
}

/// Column-truncation reflow: copy by ring index, clip to the narrower
/// width, zero-fill the tail.
fn reflow(
    new_grid: &mut [Option<Box<Row>>],
    new_cols: usize,
    new_rows: usize,
    old_grid: &[Option<Box<Row>>],
    old_cols: usize,
    old_rows: usize,
) {
    let copy_cols = min(new_cols, old_cols);
    for r in 0..min(new_rows, old_rows) {
        let Some(old_row) = old_grid[r].as_deref() else {
            continue;
        };
        let new_row = new_grid[r].get_or_insert_with(|| Box::new(Row::new(new_cols)));
        new_row.cells[..copy_cols].copy_from_slice(&old_row.cells[..copy_cols]);
        new_row.dirty = old_row.dirty;
        new_row.linebreak = old_row.linebreak;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cell::CellFlags;
    use crate::config::RenderConfig;
    use crate::font::testing::BoxFont;
    use crate::font::FontSet;
    use crate::sink::testing::MockSink;
    use crate::term::Coord;

    const CELL_W: usize = 4;
    const CELL_H: usize = 8;

    fn make_term(cols: usize, rows: usize) -> Terminal {
        let config = RenderConfig {
            scrollback_lines: 6,
            ..RenderConfig::default()
        };
        Terminal::new(
            &config,
            cols,
            rows,
            CELL_W,
            CELL_H,
            FontSet::single(Arc::new(BoxFont::new(CELL_W, CELL_H))),
        )
    }

    fn stamp(term: &mut Terminal, cols: usize, rows: usize) {
        for r in 0..rows {
            let row = term.grid_mut().row_in_view_mut(r);
            for c in 0..cols {
                row.cells[c].set_wc(char::from_u32(0x41 + (r * cols + c) as u32).unwrap());
                row.cells[c].set_attrs(CellFlags::HAVE_FG, (r * cols + c) as u32, 0);
            }
        }
    }

    #[test]
    fn growing_preserves_every_cell_in_place() {
        let mut term = make_term(4, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();
        stamp(&mut term, 4, 3);

        render_resize(&mut term, &mut renderer, &mut sink, 8 * CELL_W as i32, 5 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!((term.cols, term.rows), (8, 5));
        for r in 0..3 {
            let row = term.grid().row_in_view(r).unwrap();
            for c in 0..4 {
                assert_eq!(row.cells[c].wc, char::from_u32(0x41 + (r * 4 + c) as u32).unwrap());
                assert_eq!(row.cells[c].fg, (r * 4 + c) as u32);
                assert!(row.cells[c].flags.contains(CellFlags::HAVE_FG));
            }
            // The widened tail is empty.
            assert_eq!(row.cells[6].wc, '\0');
        }
    }

    #[test]
    fn shrinking_truncates_columns() {
        let mut term = make_term(6, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();
        stamp(&mut term, 6, 3);

        render_resize(&mut term, &mut renderer, &mut sink, 3 * CELL_W as i32, 3 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!((term.cols, term.rows), (3, 3));
        let row = term.grid().row_in_view(0).unwrap();
        assert_eq!(row.cells.len(), 3);
        assert_eq!(row.cells[2].wc, 'C');
    }

    #[test]
    fn cursor_is_clamped_to_new_bounds() {
        let mut term = make_term(8, 6);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();
        term.cursor = Coord { col: 7, row: 5 };

        render_resize(&mut term, &mut renderer, &mut sink, 3 * CELL_W as i32, 2 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!(term.cursor, Coord { col: 2, row: 1 });
    }

    #[test]
    fn alt_grid_never_gains_scrollback() {
        let mut term = make_term(4, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();

        render_resize(&mut term, &mut renderer, &mut sink, 5 * CELL_W as i32, 7 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!(term.alt.num_rows, 7);
        assert_eq!(term.normal.num_rows, 7 + term.scrollback_lines);
    }

    #[test]
    fn scale_is_adopted_before_scaling_dimensions() {
        let mut term = make_term(4, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();

        render_resize(&mut term, &mut renderer, &mut sink, 4 * CELL_W as i32, 3 * CELL_H as i32, 2)
            .expect("resize");

        assert_eq!(term.scale, 2);
        assert_eq!(term.width, 2 * 4 * CELL_W as i32);
        assert_eq!((term.cols, term.rows), (8, 6));
        // The committed buffer matches the scaled size.
        assert_eq!(sink.buffers[0].width, term.width);
        assert_eq!(sink.buffers[0].height, term.height);
    }

    #[test]
    fn unchanged_geometry_is_a_noop() {
        let mut term = make_term(4, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();

        render_resize(&mut term, &mut renderer, &mut sink, 5 * CELL_W as i32, 4 * CELL_H as i32, 1)
            .expect("resize");
        assert_eq!(sink.commits(), 1);

        sink.release_all();
        sink.clear_commands();
        // Same logical size and scale: nothing happens.
        render_resize(&mut term, &mut renderer, &mut sink, 5 * CELL_W as i32, 4 * CELL_H as i32, 1)
            .expect("noop");
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn resize_commits_a_full_frame() {
        let mut term = make_term(4, 3);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();

        render_resize(&mut term, &mut renderer, &mut sink, 6 * CELL_W as i32, 4 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!(sink.commits(), 1);
        for r in 0..term.rows {
            assert!(term.grid().row_in_view(r).unwrap().cells.iter().all(|c| c.is_clean()));
        }
    }

    #[test]
    fn scroll_region_is_clamped() {
        let mut term = make_term(4, 6);
        let mut renderer = Renderer::new(0);
        let mut sink = MockSink::new();
        term.scroll_region = 1..6;

        render_resize(&mut term, &mut renderer, &mut sink, 4 * CELL_W as i32, 3 * CELL_H as i32, 1)
            .expect("resize");

        assert_eq!(term.scroll_region, 1..3);
    }
}
