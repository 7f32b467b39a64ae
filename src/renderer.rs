// src/renderer.rs

//! The frame driver.
//!
//! One frame, in order: acquire a buffer, erase last frame's cursor, repaint
//! margins when the buffer is fresh (or a flash starts/ends), replay scroll
//! damage as scanline moves, hand dirty rows to the worker pool, fence,
//! overlay the cursor, then either commit with a new frame callback or hand
//! the untouched buffer back to the pool.
//!
//! The compositor's frame callback is the only clock: [`Renderer::refresh`]
//! while a callback is outstanding does nothing, the pending work being
//! implicit in the cells' clean bits.

use log::{debug, trace, warn};

use crate::blink::BlinkClock;
use crate::cell::CellFlags;
use crate::color::Color;
use crate::compositor::{self, PaintCtx};
use crate::damage::ScrollDamage;
use crate::error::RenderError;
use crate::pixels::{Pix, PixOp, Rect};
use crate::sink::{BufferId, BufferPool, Surface};
use crate::term::{BlinkPhase, Coord, Terminal};
use crate::workers::{FramePass, WorkerPool};

/// Where the cursor was drawn last frame, for next frame's erase pass.
#[derive(Debug, Clone, Copy)]
struct LastCursor {
    /// Logical cursor position, to detect movement.
    actual: Coord,
    /// Viewport position it was painted at.
    in_view: Coord,
}

pub struct Renderer {
    workers: WorkerPool,
    last_cursor: Option<LastCursor>,
    last_buf: Option<BufferId>,
    was_flashing: bool,
    callback_pending: bool,
}

impl Renderer {
    /// Creates a frame driver with `workers` render threads (0 = paint
    /// inline on the calling thread).
    pub fn new(workers: usize) -> Self {
        Renderer {
            workers: WorkerPool::new(workers),
            last_cursor: None,
            last_buf: None,
            was_flashing: false,
            callback_pending: false,
        }
    }

    /// Renders now unless a frame callback is outstanding; the callback
    /// will pick the work up otherwise.
    pub fn refresh<S>(&mut self, term: &mut Terminal, sink: &mut S) -> Result<(), RenderError>
    where
        S: Surface + BufferPool,
    {
        if self.callback_pending {
            trace!("refresh deferred: frame callback outstanding");
            return Ok(());
        }
        self.render_frame(term, sink)
    }

    /// The compositor's "done" tick: the previous commit has been shown and
    /// the next frame may be drawn.
    pub fn on_frame_callback<S>(
        &mut self,
        term: &mut Terminal,
        sink: &mut S,
    ) -> Result<(), RenderError>
    where
        S: Surface + BufferPool,
    {
        self.callback_pending = false;
        self.render_frame(term, sink)
    }

    /// Forgets the previously drawn cursor; used by the resizer after the
    /// grids have been rebuilt.
    pub(crate) fn forget_last_cursor(&mut self) {
        self.last_cursor = None;
    }

    fn render_frame<S>(&mut self, term: &mut Terminal, sink: &mut S) -> Result<(), RenderError>
    where
        S: Surface + BufferPool,
    {
        debug_assert!(term.width > 0 && term.height > 0);

        let rows = term.rows;
        let width = term.width;
        let cell_w = term.cell_width as i32;
        let cell_h = term.cell_height as i32;

        let buf = sink
            .acquire(term.width, term.height, 1 + self.workers.count())
            .ok_or(RenderError::BufferAcquire {
                width: term.width,
                height: term.height,
            })?;
        let pix = buf.pix;

        let ctx = PaintCtx::for_frame(term);
        let mut all_clean = term.grid().damage.is_empty();

        // Erase the old cursor, if the cell wasn't already queued for
        // repaint anyway.
        if let Some(last) = self.last_cursor.take() {
            let (col, row) = (last.in_view.col as usize, last.in_view.row as usize);
            if col < term.cols && row < rows {
                let cell = &mut term.grid_mut().row_in_view_mut(row).cells[col];
                if cell.is_clean() {
                    cell.flags.remove(CellFlags::CLEAN);
                    compositor::render_cell(&ctx, pix, cell, col, row, false);
                    sink.damage(col as i32 * cell_w, row as i32 * cell_h, cell_w, cell_h);
                }
            }
            if last.actual != term.cursor {
                // Cursor movement alone must produce a commit; the touched
                // cells were deliberately not dirtied.
                all_clean = false;
            }
        }

        if term.flash.active {
            term.damage_view();
        }

        // Fresh buffer, or flash started/ended: repaint the margins outside
        // the cell grid and refresh the whole view.
        if self.last_buf != Some(buf.id) || term.flash.active || self.was_flashing {
            debug!("new buffer or flash transition; repainting margins");

            let rmargin = term.cols as i32 * cell_w;
            let bmargin = rows as i32 * cell_h;
            let rmargin_width = term.width - rmargin;
            let bmargin_height = term.height - bmargin;

            let bg_rgb = if !term.reverse_video {
                term.palette.bg
            } else {
                term.palette.fg
            };
            let bg = Color::from_rgb_with_alpha(bg_rgb, term.palette.alpha);

            pix.fill_rect(
                PixOp::Src,
                bg,
                Rect {
                    x: rmargin,
                    y: 0,
                    width: rmargin_width,
                    height: term.height,
                },
            );
            pix.fill_rect(
                PixOp::Src,
                bg,
                Rect {
                    x: 0,
                    y: bmargin,
                    width: term.width,
                    height: bmargin_height,
                },
            );
            sink.damage(rmargin, 0, rmargin_width, term.height);
            sink.damage(0, bmargin, term.width, bmargin_height);

            term.damage_view();
            self.last_buf = Some(buf.id);
            self.was_flashing = term.flash.active;
        }

        // Replay scroll damage against the pixels, oldest first.
        while let Some(damage) = term.grid_mut().damage.pop() {
            apply_scroll_damage(pix, sink, term.width, cell_h, damage);
        }

        // Dispatch dirty rows.
        if self.workers.count() > 0 {
            self.workers.begin_frame(FramePass {
                pix,
                ctx: ctx.clone(),
            });

            let grid = term.grid_mut();
            for r in 0..rows {
                let row = grid.row_in_view_mut(r);
                if !row.dirty {
                    continue;
                }
                row.dirty = false;
                all_clean = false;
                // SAFETY: each dirty row is pushed once; the grid is not
                // touched again until wait_done below.
                unsafe { self.workers.push_row(r, row as *mut _) };
                sink.damage(0, r as i32 * cell_h, width, cell_h);
            }
            self.workers.finish_dispatch();
        } else {
            for r in 0..rows {
                let row = term.grid_mut().row_in_view_mut(r);
                if !row.dirty {
                    continue;
                }
                row.dirty = false;
                compositor::render_row(&ctx, pix, row, r);
                all_clean = false;
                sink.damage(0, r as i32 * cell_h, width, cell_h);
            }
        }

        // Cursor visibility: it may be scrolled out of the view.
        let cur_abs = term.grid().logical_to_abs(term.cursor.row as usize);
        let cursor_visible = term.grid().abs_in_view(cur_abs, rows);

        // The fence. The cursor cell might have been dirty, in which case a
        // worker just painted it (without the cursor); from here on the
        // buffer is ours alone.
        self.workers.wait_done();

        self.update_blink(term, &ctx);

        if cursor_visible && !term.hide_cursor {
            // Re-align against the view so next frame can erase it.
            let grid = term.grid();
            let view_row = (cur_abs + grid.num_rows - grid.view) % grid.num_rows;
            let col = term.cursor.col as usize;

            let cell = &mut term.grid_mut().row_in_view_mut(view_row).cells[col];
            cell.flags.remove(CellFlags::CLEAN);
            let cols_updated = compositor::render_cell(&ctx, pix, cell, col, view_row, true);

            sink.damage(
                col as i32 * cell_w,
                view_row as i32 * cell_h,
                cols_updated as i32 * cell_w,
                cell_h,
            );
            self.last_cursor = Some(LastCursor {
                actual: term.cursor,
                in_view: Coord {
                    col: term.cursor.col,
                    row: view_row as i32,
                },
            });
        }

        if all_clean {
            trace!("nothing changed; returning buffer uncommitted");
            sink.release(buf.id);
            return Ok(());
        }

        if term.flash.active {
            // Translucent yellow over everything; alpha pre-multiplied into
            // the channels.
            pix.fill_rect(
                PixOp::Over,
                Color {
                    red: 0x7fff,
                    green: 0x7fff,
                    blue: 0,
                    alpha: 0x7fff,
                },
                Rect {
                    x: 0,
                    y: 0,
                    width: term.width,
                    height: term.height,
                },
            );
            sink.damage(0, 0, term.width, term.height);
        }

        debug_assert!(term.grid().offset < term.grid().num_rows);
        debug_assert!(term.grid().view < term.grid().num_rows);

        sink.attach(buf.id);
        sink.request_frame_callback();
        self.callback_pending = true;
        sink.set_buffer_scale(term.scale);
        sink.commit();
        Ok(())
    }

    /// Disarms the blink clock when no visible cell blinks anymore; arms it
    /// when this frame painted the first blinking cell of a burst. Runs
    /// after the fence so the cell scan doesn't race the workers.
    fn update_blink(&self, term: &mut Terminal, ctx: &PaintCtx) {
        if term.blink.active && !term.view_has_blink() {
            term.blink.active = false;
            term.blink.phase = BlinkPhase::On;
            if let Some(clock) = &term.blink.clock {
                if let Err(err) = clock.disarm() {
                    warn!("{}", err);
                }
            }
        }

        if !term.blink.active && ctx.blink_seen.load(std::sync::atomic::Ordering::Relaxed) {
            term.blink.active = true;
            if term.blink.clock.is_none() {
                match BlinkClock::new() {
                    Ok(clock) => term.blink.clock = Some(clock),
                    Err(err) => warn!("{}; blinking degrades to always-on", err),
                }
            }
            if let Some(clock) = &term.blink.clock {
                if let Err(err) = clock.arm() {
                    warn!("{}; blinking degrades to always-on", err);
                }
            }
        }
    }
}

/// One scroll record against the pixels: a scanline-band memmove plus a
/// damage rectangle over the destination band. Forward scrolls move the
/// band up by `lines` rows, reverse scrolls move it down.
fn apply_scroll_damage<S: Surface>(
    pix: Pix,
    sink: &mut S,
    width: i32,
    cell_h: i32,
    damage: ScrollDamage,
) {
    let (dst_y, src_y, height) = match damage {
        ScrollDamage::Scroll { region, lines } => (
            region.start as i32 * cell_h,
            (region.start + lines) as i32 * cell_h,
            (region.end as i32 - region.start as i32 - lines as i32) * cell_h,
        ),
        ScrollDamage::ScrollReverse { region, lines } => (
            (region.start + lines) as i32 * cell_h,
            region.start as i32 * cell_h,
            (region.end as i32 - region.start as i32 - lines as i32) * cell_h,
        ),
    };

    trace!(
        "scroll damage: dst_y={} src_y={} height={}",
        dst_y,
        src_y,
        height
    );

    if height > 0 {
        pix.shift_band(dst_y, src_y, height);
        sink.damage(0, dst_y, width, height);
    }
}
