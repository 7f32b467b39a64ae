// src/font.rs

//! The font interface the renderer consumes.
//!
//! Rasterization lives outside this crate; the renderer only needs glyph
//! lookup by code point plus a handful of metrics. Glyphs are pre-shaped per
//! code point — no shaping, no sub-pixel positioning.

use std::sync::Arc;

use unicode_width::UnicodeWidthChar;

use crate::cell::CellFlags;

/// Pixel payload of a rasterized glyph.
#[derive(Debug, Clone)]
pub enum GlyphImage {
    /// 8-bit coverage mask, multiplied with a solid foreground at composite
    /// time.
    Alpha(Box<[u8]>),
    /// Pre-rendered, pre-multiplied ARGB image (color emoji and friends),
    /// composited directly.
    Argb(Box<[u32]>),
}

/// A rasterized glyph with its placement offsets.
///
/// `x`/`y` offset the bitmap from the cell origin; `y` is measured from the
/// baseline (subtracted from the ascent when placing). `cols` is the number
/// of terminal columns the glyph occupies.
#[derive(Debug, Clone)]
pub struct RasterGlyph {
    pub image: GlyphImage,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub cols: usize,
}

/// Placement of an underline or strikeout rule, relative to the baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineMetrics {
    pub position: i32,
    pub thickness: i32,
}

/// Vertical extents of the font.
#[derive(Debug, Clone, Copy, Default)]
pub struct FontExtents {
    pub height: i32,
    pub ascent: i32,
    pub descent: i32,
}

/// A loaded font face, queried per code point.
pub trait Font: Send + Sync {
    fn glyph_for(&self, wc: char) -> Option<&RasterGlyph>;
    fn underline(&self) -> LineMetrics;
    fn strikeout(&self) -> LineMetrics;
    fn extents(&self) -> FontExtents;
}

/// The four faces of a family, indexed by the bold and italic attributes.
#[derive(Clone)]
pub struct FontSet {
    /// regular, bold, italic, bold-italic
    fonts: [Arc<dyn Font>; 4],
}

impl FontSet {
    pub fn new(
        regular: Arc<dyn Font>,
        bold: Arc<dyn Font>,
        italic: Arc<dyn Font>,
        bold_italic: Arc<dyn Font>,
    ) -> Self {
        FontSet {
            fonts: [regular, bold, italic, bold_italic],
        }
    }

    /// A set that renders every attribute combination with the same face.
    pub fn single(font: Arc<dyn Font>) -> Self {
        FontSet {
            fonts: [font.clone(), font.clone(), font.clone(), font],
        }
    }

    /// Face for a cell's attributes.
    pub fn for_flags(&self, flags: CellFlags) -> &Arc<dyn Font> {
        let idx = (flags.contains(CellFlags::ITALIC) as usize) << 1
            | flags.contains(CellFlags::BOLD) as usize;
        &self.fonts[idx]
    }
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet").finish_non_exhaustive()
    }
}

/// Terminal column width of a code point.
///
/// Control characters and zero-width combiners report 0. U+00AD (SOFT
/// HYPHEN) reports 1, matching the width table this replaces.
pub fn char_cols(wc: char) -> usize {
    UnicodeWidthChar::width(wc).unwrap_or(0)
}
