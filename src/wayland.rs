// src/wayland.rs

//! Wayland presentation backend: [`Surface`] and [`BufferPool`] over
//! `wl_shm` buffers on an xdg-shell toplevel.
//!
//! [`WaylandSink::connect`] returns the sink and its event queue; the
//! embedding event loop owns dispatch:
//!
//! ```ignore
//! let (mut sink, mut queue) = WaylandSink::connect("termframe", "termframe")?;
//! loop {
//!     queue.blocking_dispatch(&mut sink)?;
//!     if sink.take_frame_done() {
//!         renderer.on_frame_callback(&mut term, &mut sink)?;
//!     }
//!     if let Some((w, h)) = sink.take_pending_resize() {
//!         let scale = sink.max_output_scale();
//!         resize::render_resize(&mut term, &mut renderer, &mut sink, w, h, scale)?;
//!     }
//! }
//! ```
//!
//! Buffers are memfd-backed mappings; a `wl_buffer` release event flips the
//! slot back to free, so `acquire` never hands out memory the compositor
//! still scans.

use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, trace, warn};
use wayland_client::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_output, wl_registry, wl_shm, wl_shm_pool,
    wl_surface,
};
use wayland_client::{Connection, Dispatch, EventQueue, QueueHandle};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use crate::pixels::Pix;
use crate::sink::{BufferId, BufferPool, BufferRef, Surface};

const SHM_FORMAT: wl_shm::Format = wl_shm::Format::Argb8888;

/// A mapped memfd region backing one buffer.
struct ShmMap {
    ptr: *mut u8,
    len: usize,
}

impl Drop for ShmMap {
    fn drop(&mut self) {
        if !self.ptr.is_null() && self.len > 0 {
            unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
        }
    }
}

struct Slot {
    serial: usize,
    buffer: wl_buffer::WlBuffer,
    pool: wl_shm_pool::WlShmPool,
    map: ShmMap,
    width: i32,
    height: i32,
    stride: usize,
    /// Owned by the renderer or the compositor; not eligible for acquire.
    busy: bool,
}

impl Slot {
    fn destroy(&self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

/// The compositor connection: globals, the toplevel surface, and the shm
/// slot pool.
pub struct WaylandSink {
    conn: Connection,
    qh: QueueHandle<WaylandSink>,

    compositor: Option<wl_compositor::WlCompositor>,
    shm: Option<wl_shm::WlShm>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,

    surface: Option<wl_surface::WlSurface>,
    xdg_surface: Option<xdg_surface::XdgSurface>,
    toplevel: Option<xdg_toplevel::XdgToplevel>,
    configured: bool,

    outputs: Vec<(wl_output::WlOutput, i32)>,
    surface_outputs: Vec<wl_output::WlOutput>,

    slots: Vec<Slot>,
    next_serial: usize,

    frame_callback: Option<wl_callback::WlCallback>,
    frame_done: bool,
    pending_resize: Option<(i32, i32)>,
    close_requested: bool,
}

impl WaylandSink {
    /// Connects to the compositor named by the environment, binds the
    /// required globals and maps an xdg toplevel.
    pub fn connect(title: &str, app_id: &str) -> Result<(Self, EventQueue<WaylandSink>)> {
        let conn = Connection::connect_to_env().context("connecting to Wayland display")?;
        let mut event_queue = conn.new_event_queue();
        let qh = event_queue.handle();

        let mut sink = WaylandSink {
            conn: conn.clone(),
            qh: qh.clone(),
            compositor: None,
            shm: None,
            wm_base: None,
            surface: None,
            xdg_surface: None,
            toplevel: None,
            configured: false,
            outputs: Vec::new(),
            surface_outputs: Vec::new(),
            slots: Vec::new(),
            next_serial: 0,
            frame_callback: None,
            frame_done: false,
            pending_resize: None,
            close_requested: false,
        };

        let _registry = conn.display().get_registry(&qh, ());
        event_queue
            .roundtrip(&mut sink)
            .context("initial registry roundtrip")?;

        let compositor = sink
            .compositor
            .clone()
            .ok_or_else(|| anyhow!("compositor lacks wl_compositor"))?;
        let wm_base = sink
            .wm_base
            .clone()
            .ok_or_else(|| anyhow!("compositor lacks xdg_wm_base"))?;
        if sink.shm.is_none() {
            return Err(anyhow!("compositor lacks wl_shm"));
        }

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_title(title.to_string());
        toplevel.set_app_id(app_id.to_string());
        surface.commit();

        sink.surface = Some(surface);
        sink.xdg_surface = Some(xdg_surface);
        sink.toplevel = Some(toplevel);

        info!("wayland: surface mapped, waiting for configure");
        Ok((sink, event_queue))
    }

    /// True once the toplevel received its first configure.
    pub fn configured(&self) -> bool {
        self.configured
    }

    /// Consumes the "frame shown" tick from the last frame callback.
    pub fn take_frame_done(&mut self) -> bool {
        std::mem::take(&mut self.frame_done)
    }

    /// Consumes a pending toplevel size, in logical pixels.
    pub fn take_pending_resize(&mut self) -> Option<(i32, i32)> {
        self.pending_resize.take()
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Highest integer scale among the outputs the surface currently shows
    /// on; 1 before the first enter event.
    pub fn max_output_scale(&self) -> i32 {
        self.surface_outputs
            .iter()
            .filter_map(|entered| {
                self.outputs
                    .iter()
                    .find(|(output, _)| output == entered)
                    .map(|&(_, scale)| scale)
            })
            .max()
            .unwrap_or(1)
    }

    fn slot_by_serial(&mut self, id: BufferId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.serial == id.0)
    }

    fn create_slot(&mut self, width: i32, height: i32) -> Result<usize> {
        let shm = self.shm.as_ref().ok_or_else(|| anyhow!("no wl_shm global"))?;
        let stride = width as usize * 4;
        let size = stride * height as usize;

        let fd = create_memfd(size).context("creating shm memfd")?;
        let pool = shm.create_pool(fd.as_fd(), size as i32, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            stride as i32,
            SHM_FORMAT,
            &self.qh,
            (),
        );

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            buffer.destroy();
            pool.destroy();
            return Err(std::io::Error::last_os_error()).context("mapping shm buffer");
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        debug!(
            "wayland: new shm buffer #{} {}x{} ({} bytes)",
            serial, width, height, size
        );

        self.slots.push(Slot {
            serial,
            buffer,
            pool,
            map: ShmMap {
                ptr: ptr as *mut u8,
                len: size,
            },
            width,
            height,
            stride,
            busy: false,
        });
        Ok(self.slots.len() - 1)
    }
}

impl BufferPool for WaylandSink {
    fn acquire(&mut self, width: i32, height: i32, min_free: usize) -> Option<BufferRef> {
        // Stale free slots (old size) are useless; drop them.
        self.slots.retain(|slot| {
            if !slot.busy && (slot.width != width || slot.height != height) {
                slot.destroy();
                false
            } else {
                true
            }
        });

        // Bound the pool: keep at most min_free spare buffers around.
        let mut free: Vec<usize> = (0..self.slots.len())
            .filter(|&i| !self.slots[i].busy)
            .collect();
        while free.len() > min_free.max(1) {
            let idx = free.pop().unwrap();
            self.slots[idx].destroy();
            self.slots.remove(idx);
        }

        let idx = match self.slots.iter().position(|s| !s.busy) {
            Some(idx) => idx,
            None => match self.create_slot(width, height) {
                Ok(idx) => idx,
                Err(err) => {
                    warn!("wayland: buffer allocation failed: {:#}", err);
                    return None;
                }
            },
        };

        let slot = &mut self.slots[idx];
        slot.busy = true;
        // SAFETY: the mapping lives until the slot is destroyed, which only
        // happens while the slot is free; the renderer uses the view only
        // while it holds the acquisition.
        let pix = unsafe { Pix::from_raw_parts(slot.map.ptr, slot.width, slot.height, slot.stride) };
        Some(BufferRef {
            id: BufferId(slot.serial),
            pix,
        })
    }

    fn release(&mut self, id: BufferId) {
        if let Some(slot) = self.slot_by_serial(id) {
            slot.busy = false;
        }
    }
}

impl Surface for WaylandSink {
    fn damage(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if let Some(surface) = &self.surface {
            surface.damage_buffer(x, y, width, height);
        }
    }

    fn attach(&mut self, id: BufferId) {
        let Some(slot) = self.slots.iter().find(|s| s.serial == id.0) else {
            warn!("wayland: attach of unknown buffer #{}", id.0);
            return;
        };
        if let Some(surface) = &self.surface {
            // The compositor owns the buffer from here until its release
            // event; the slot stays busy.
            surface.attach(Some(&slot.buffer), 0, 0);
        }
    }

    fn set_buffer_scale(&mut self, scale: i32) {
        if let Some(surface) = &self.surface {
            surface.set_buffer_scale(scale);
        }
    }

    fn request_frame_callback(&mut self) {
        debug_assert!(self.frame_callback.is_none());
        if let Some(surface) = &self.surface {
            self.frame_callback = Some(surface.frame(&self.qh, ()));
        }
    }

    fn commit(&mut self) {
        if let Some(surface) = &self.surface {
            surface.commit();
        }
        let _ = self.conn.flush();
    }
}

impl Drop for WaylandSink {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.destroy();
        }
    }
}

// --- Dispatch plumbing ---

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            match interface.as_str() {
                "wl_compositor" => {
                    // Need surface v4 for damage_buffer.
                    let compositor =
                        registry.bind::<wl_compositor::WlCompositor, _, _>(name, version.min(4), qh, ());
                    sink.compositor = Some(compositor);
                }
                "wl_shm" => {
                    let shm = registry.bind::<wl_shm::WlShm, _, _>(name, version.min(1), qh, ());
                    sink.shm = Some(shm);
                }
                "xdg_wm_base" => {
                    let wm_base =
                        registry.bind::<xdg_wm_base::XdgWmBase, _, _>(name, version.min(1), qh, ());
                    sink.wm_base = Some(wm_base);
                }
                "wl_output" => {
                    let output =
                        registry.bind::<wl_output::WlOutput, _, _>(name, version.min(2), qh, ());
                    sink.outputs.push((output, 1));
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for WaylandSink {
    fn event(
        _: &mut Self,
        _: &wl_compositor::WlCompositor,
        _: wl_compositor::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_shm::WlShm, ()> for WaylandSink {
    fn event(
        _: &mut Self,
        _: &wl_shm::WlShm,
        _: wl_shm::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for WaylandSink {
    fn event(
        _: &mut Self,
        _: &wl_shm_pool::WlShmPool,
        _: wl_shm_pool::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            for slot in &mut sink.slots {
                if &slot.buffer == buffer {
                    trace!("wayland: buffer #{} released", slot.serial);
                    slot.busy = false;
                    break;
                }
            }
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            sink.frame_callback = None;
            sink.frame_done = true;
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WaylandSink {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            sink.configured = true;
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                if width > 0 && height > 0 {
                    sink.pending_resize = Some((width, height));
                }
            }
            xdg_toplevel::Event::Close => {
                sink.close_requested = true;
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_surface::WlSurface, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        _: &wl_surface::WlSurface,
        event: wl_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_surface::Event::Enter { output } => {
                sink.surface_outputs.push(output);
            }
            wl_surface::Event::Leave { output } => {
                sink.surface_outputs.retain(|o| o != &output);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, ()> for WaylandSink {
    fn event(
        sink: &mut Self,
        output: &wl_output::WlOutput,
        event: wl_output::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Scale { factor } = event {
            for (known, scale) in &mut sink.outputs {
                if known == output {
                    *scale = factor;
                    break;
                }
            }
        }
    }
}

fn create_memfd(size: usize) -> Result<OwnedFd> {
    let name = CString::new("termframe-shm")?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error()).context("memfd_create");
    }
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    if unsafe { libc::ftruncate(fd, size as i64) } < 0 {
        return Err(std::io::Error::last_os_error()).context("ftruncate");
    }
    Ok(owned)
}
