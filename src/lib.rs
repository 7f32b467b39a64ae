// src/lib.rs

//! Rendering core of a Wayland terminal emulator.
//!
//! This crate takes a logical character grid (cells with glyphs and
//! attributes) plus cursor, selection and blink state, and materializes it
//! into pixels inside a shared-memory buffer, committing that buffer to the
//! compositor in lockstep with its frame-callback clock.
//!
//! The main pieces:
//!
//! * [`term::Terminal`] — the grid model: two ring-buffered grids (normal
//!   and alternate), palette, cursor, selection, blink and flash state.
//! * [`compositor`] — the pure per-cell painter.
//! * [`renderer::Renderer`] — the frame driver: drains scroll damage,
//!   dispatches dirty rows to the worker pool, overlays the cursor after the
//!   done-fence, and commits.
//! * [`workers::WorkerPool`] — N render threads fed row jobs from a shared
//!   queue, synchronized with start/done semaphores.
//! * [`resize`] — grid rebuild and column-truncation reflow on window or
//!   scale changes.
//! * [`wayland::WaylandSink`] — a concrete [`sink::Surface`] +
//!   [`sink::BufferPool`] over `wayland-client` shm buffers.
//!
//! Font loading, the terminal state machine and config parsing live outside
//! this crate; they drive it through [`term::Terminal`], the [`font::Font`]
//! trait and [`renderer::Renderer`].

pub mod blink;
pub mod cell;
pub mod color;
pub mod compositor;
pub mod config;
pub mod damage;
pub mod error;
pub mod font;
pub mod grid;
pub mod os;
pub mod pixels;
pub mod renderer;
pub mod resize;
pub mod sink;
pub mod term;
pub mod wayland;
pub mod workers;

pub use error::RenderError;
pub use renderer::Renderer;
pub use term::Terminal;
