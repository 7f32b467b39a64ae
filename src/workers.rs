// src/workers.rs

//! The render worker pool: N threads pulling row jobs off a shared queue.
//!
//! Synchronization is a semaphore pair plus a condvar-guarded queue. The
//! `start` and `done` semaphores count frames: the frame driver posts
//! `start` N times to open a frame and waits on `done` N times to fence it.
//! The condvar only signals queue occupancy. They are separate on purpose;
//! frames must be counted even when the queue stays empty.
//!
//! Per frame, each worker:
//!
//! ```text
//! wait(start)
//! loop:
//!     pop job (condvar wait while empty)
//!     Row        -> paint it
//!     FrameDone  -> post(done), back to wait(start)
//!     Exit       -> thread returns
//! ```
//!
//! The driver pushes every row before any `FrameDone` sentinel and pushes
//! exactly N sentinels, so each worker consumes one per frame. After the
//! driver's N `done` waits, no worker can touch the frame's buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::trace;

use crate::cell::Row;
use crate::compositor::{self, PaintCtx};
use crate::pixels::Pix;

/// Counting semaphore over a mutex and condvar.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// A row handed to exactly one worker for the duration of a frame.
struct RowPtr(*mut Row);

// SAFETY: the driver dispatches each dirty row at most once per frame and
// does not touch cells between begin_frame and wait_done, so the receiving
// worker has exclusive access.
unsafe impl Send for RowPtr {}

enum Job {
    Row { index: usize, row: RowPtr },
    /// Frame-done sentinel; one per worker per frame.
    FrameDone,
    /// Shutdown sentinel; one per worker, ever.
    Exit,
}

/// Everything a worker needs for one frame: the buffer view and the paint
/// snapshot. Published before `start` is posted, cleared after the fence.
#[derive(Debug, Clone)]
pub struct FramePass {
    pub pix: Pix,
    pub ctx: PaintCtx,
}

struct Shared {
    start: Semaphore,
    done: Semaphore,
    queue: Mutex<VecDeque<Job>>,
    cond: Condvar,
    pass: Mutex<Option<FramePass>>,
}

/// Fixed pool of render threads. A pool of size 0 is valid; the frame
/// driver then paints inline.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(count: usize) -> Self {
        let shared = Arc::new(Shared {
            start: Semaphore::new(),
            done: Semaphore::new(),
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            pass: Mutex::new(None),
        });

        let threads = (0..count)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("render:{}", i))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn render worker")
            })
            .collect();

        WorkerPool { shared, threads }
    }

    pub fn count(&self) -> usize {
        self.threads.len()
    }

    /// Publishes the frame pass and wakes every worker.
    pub fn begin_frame(&self, pass: FramePass) {
        debug_assert!(self.shared.queue.lock().unwrap().is_empty());
        *self.shared.pass.lock().unwrap() = Some(pass);
        for _ in 0..self.count() {
            self.shared.start.post();
        }
    }

    /// Queues one dirty row.
    ///
    /// # Safety
    /// `row` must stay valid and unaliased until [`WorkerPool::wait_done`]
    /// returns, and must be pushed at most once this frame.
    pub unsafe fn push_row(&self, index: usize, row: *mut Row) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Job::Row {
            index,
            row: RowPtr(row),
        });
        self.shared.cond.notify_one();
    }

    /// Queues the frame-done sentinels, one per worker.
    pub fn finish_dispatch(&self) {
        let mut queue = self.shared.queue.lock().unwrap();
        for _ in 0..self.count() {
            queue.push_back(Job::FrameDone);
        }
        self.shared.cond.notify_all();
    }

    /// The fence: blocks until every worker posted `done`, then retires the
    /// published pass. Afterwards no worker touches the frame's buffer.
    pub fn wait_done(&self) {
        for _ in 0..self.count() {
            self.shared.done.wait();
        }
        *self.shared.pass.lock().unwrap() = None;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            for _ in 0..self.threads.len() {
                queue.push_back(Job::Exit);
            }
            self.shared.cond.notify_all();
        }
        // Workers idle between frames block on `start`; wake them so they
        // can pop their Exit sentinel.
        for _ in 0..self.threads.len() {
            self.shared.start.post();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        shared.start.wait();
        let pass = shared.pass.lock().unwrap().clone();

        loop {
            let job = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if let Some(job) = queue.pop_front() {
                        break job;
                    }
                    queue = shared.cond.wait(queue).unwrap();
                }
            };

            match job {
                Job::Row { index, row } => {
                    let Some(pass) = pass.as_ref() else {
                        trace!("row {} dispatched without a frame pass", index);
                        continue;
                    };
                    // SAFETY: exclusive per the RowPtr contract; the buffer
                    // behind pass.pix is valid until the done fence.
                    let row = unsafe { &mut *row.0 };
                    compositor::render_row(&pass.ctx, pass.pix, row, index);
                }
                Job::FrameDone => {
                    shared.done.post();
                    break;
                }
                Job::Exit => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::cell::{Cell, CellFlags};
    use crate::font::testing::BoxFont;
    use crate::font::FontSet;
    use crate::term::{CursorStyle, Palette};

    #[test]
    fn semaphore_counts_posts() {
        let sem = Semaphore::new();
        sem.post();
        sem.post();
        sem.wait();
        sem.wait();
        // A third wait would block; the count is exact.
    }

    fn test_ctx(cols: usize) -> PaintCtx {
        PaintCtx {
            cols,
            cell_width: 2,
            cell_height: 2,
            palette: Palette {
                fg: 0xffffff,
                bg: 0x000000,
                alpha: 0xffff,
                cursor_text: 0,
                cursor_cursor: 0,
            },
            reverse_video: false,
            cursor_style: CursorStyle::Block,
            blink_off: false,
            selection: None,
            view: 0,
            num_rows: 8,
            fonts: FontSet::single(Arc::new(BoxFont::new(2, 2))),
            blink_seen: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn pool_paints_every_dispatched_row_before_the_fence() {
        const COLS: usize = 8;
        const ROWS: usize = 16;

        let pool = WorkerPool::new(3);
        let ctx = test_ctx(COLS);
        let mut data = vec![0u32; COLS * 2 * ROWS * 2].into_boxed_slice();
        let pix = unsafe {
            Pix::from_raw_parts(
                data.as_mut_ptr() as *mut u8,
                (COLS * 2) as i32,
                (ROWS * 2) as i32,
                COLS * 2 * 4,
            )
        };

        let mut rows: Vec<Box<Row>> = (0..ROWS)
            .map(|_| {
                let mut row = Box::new(Row::new(COLS));
                for cell in row.cells.iter_mut() {
                    *cell = Cell {
                        wc: 'x',
                        flags: CellFlags::HAVE_FG | CellFlags::HAVE_BG,
                        fg: 0xff0000,
                        bg: 0x0000ff,
                    };
                }
                row
            })
            .collect();

        // Several frames in a row, reusing the pool.
        for _ in 0..3 {
            for row in rows.iter_mut() {
                for cell in row.cells.iter_mut() {
                    cell.flags.remove(CellFlags::CLEAN);
                }
            }

            pool.begin_frame(FramePass {
                pix,
                ctx: ctx.clone(),
            });
            for (i, row) in rows.iter_mut().enumerate() {
                unsafe { pool.push_row(i, row.as_mut() as *mut Row) };
            }
            pool.finish_dispatch();
            pool.wait_done();

            for row in rows.iter() {
                assert!(row.cells.iter().all(Cell::is_clean));
            }
            assert!(data.iter().all(|&p| p == 0xffff0000));
        }
    }

    #[test]
    fn empty_frame_still_fences() {
        let pool = WorkerPool::new(2);
        let ctx = test_ctx(1);
        let mut data = vec![0u32; 4].into_boxed_slice();
        let pix = unsafe { Pix::from_raw_parts(data.as_mut_ptr() as *mut u8, 2, 2, 8) };

        pool.begin_frame(FramePass { pix, ctx });
        pool.finish_dispatch();
        pool.wait_done();
        assert!(data.iter().all(|&p| p == 0));
    }

    #[test]
    fn pool_of_zero_is_inert() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.count(), 0);
        pool.finish_dispatch();
        pool.wait_done();
    }
}
