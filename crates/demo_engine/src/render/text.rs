//! Screen-space text: glyph atlas and layout
//!
//! Glyphs for printable ASCII (32-126) are rasterized once with `fontdue` into
//! a single-channel atlas laid out as a 16-column grid. Layout turns pixel
//! positioned lines into textured triangles in normalized device coordinates,
//! ready for the overlay pipeline.

use std::collections::HashMap;
use fontdue::{Font, FontSettings};
use nalgebra::Vector2;
use crate::assets::AssetError;

const FIRST_GLYPH: u32 = 32;
const LAST_GLYPH: u32 = 126;
const GLYPHS_PER_ROW: u32 = 16;
const CELL_PADDING: u32 = 2;

/// Horizontal anchoring of a line relative to its x position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    /// x is the left edge
    Left,
    /// x is the centre
    Center,
    /// x is the right edge
    Right,
}

/// Placement of one glyph inside the atlas
#[derive(Debug, Clone, Copy)]
pub struct GlyphInfo {
    /// Top-left UV
    pub uv_min: Vector2<f32>,
    /// Bottom-right UV
    pub uv_max: Vector2<f32>,
    /// Bitmap size in pixels
    pub size: Vector2<f32>,
    /// Horizontal advance in pixels
    pub advance: f32,
    /// Offset of the bitmap's bottom-left corner from the pen position on the baseline
    pub bearing: Vector2<f32>,
}

/// Rasterized ASCII glyphs packed into one R8 texture
pub struct FontAtlas {
    glyphs: HashMap<char, GlyphInfo>,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    ascent: f32,
    line_height: f32,
}

impl FontAtlas {
    /// Rasterize printable ASCII from TrueType/OpenType data at `font_size` pixels
    pub fn new(font_data: &[u8], font_size: f32) -> Result<Self, AssetError> {
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| AssetError::Font(e.to_string()))?;

        let rasterized: Vec<(char, fontdue::Metrics, Vec<u8>)> = (FIRST_GLYPH..=LAST_GLYPH)
            .filter_map(char::from_u32)
            .map(|ch| {
                let (metrics, bitmap) = font.rasterize(ch, font_size);
                (ch, metrics, bitmap)
            })
            .collect();

        let cell_width = rasterized.iter().map(|(_, m, _)| m.width as u32).max().unwrap_or(0) + CELL_PADDING;
        let cell_height = rasterized.iter().map(|(_, m, _)| m.height as u32).max().unwrap_or(0) + CELL_PADDING;
        let rows = (rasterized.len() as u32).div_ceil(GLYPHS_PER_ROW);
        let width = cell_width * GLYPHS_PER_ROW;
        let height = cell_height * rows.max(1);
        let mut pixels = vec![0u8; (width * height) as usize];
        let mut glyphs = HashMap::with_capacity(rasterized.len());

        for (slot, (ch, metrics, bitmap)) in rasterized.iter().enumerate() {
            let slot = slot as u32;
            let x0 = (slot % GLYPHS_PER_ROW) * cell_width;
            let y0 = (slot / GLYPHS_PER_ROW) * cell_height;

            for row in 0..metrics.height {
                let src = &bitmap[row * metrics.width..(row + 1) * metrics.width];
                let dst_start = ((y0 + row as u32) * width + x0) as usize;
                pixels[dst_start..dst_start + metrics.width].copy_from_slice(src);
            }

            glyphs.insert(
                *ch,
                GlyphInfo {
                    uv_min: Vector2::new(x0 as f32 / width as f32, y0 as f32 / height as f32),
                    uv_max: Vector2::new(
                        (x0 + metrics.width as u32) as f32 / width as f32,
                        (y0 + metrics.height as u32) as f32 / height as f32,
                    ),
                    size: Vector2::new(metrics.width as f32, metrics.height as f32),
                    advance: metrics.advance_width,
                    bearing: Vector2::new(metrics.xmin as f32, metrics.ymin as f32),
                },
            );
        }

        let (ascent, line_height) = font
            .horizontal_line_metrics(font_size)
            .map_or((font_size * 0.8, font_size), |m| (m.ascent, m.new_line_size));

        log::info!(
            "Font atlas {}x{} with {} glyphs at {}px",
            width,
            height,
            glyphs.len(),
            font_size
        );

        Ok(Self {
            glyphs,
            width,
            height,
            pixels,
            ascent,
            line_height,
        })
    }

    /// Glyph for `ch`, if it was rasterized
    pub fn glyph(&self, ch: char) -> Option<&GlyphInfo> {
        self.glyphs.get(&ch)
    }

    /// Atlas width in texels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Atlas height in texels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Single-channel coverage texels, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Distance between consecutive baselines in pixels
    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// Advance of a whole string in pixels
    pub fn text_width(&self, text: &str) -> f32 {
        text.chars().map(|ch| self.advance(ch)).sum()
    }

    fn advance(&self, ch: char) -> f32 {
        self.glyph(ch)
            .or_else(|| self.glyph(' '))
            .map_or(0.0, |glyph| glyph.advance)
    }
}

/// Overlay vertex: NDC position and atlas UV
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TextVertex {
    /// Position in normalized device coordinates
    pub position: [f32; 2],
    /// Atlas texture coordinate
    pub uv: [f32; 2],
}

/// One line of overlay text in window pixels (origin top-left)
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Contents
    pub text: String,
    /// Anchor x in pixels
    pub x: f32,
    /// Top of the line in pixels
    pub y: f32,
    /// How `x` anchors the line
    pub align: TextAlign,
}

/// Lines of overlay text collected for one refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayText {
    lines: Vec<TextLine>,
}

impl OverlayText {
    /// Start an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line at pixel position `(x, y)`
    pub fn add_text(&mut self, text: impl Into<String>, x: f32, y: f32, align: TextAlign) {
        self.lines.push(TextLine {
            text: text.into(),
            x,
            y,
            align,
        });
    }

    /// Queued lines in insertion order
    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    /// Number of printable characters across all lines
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|line| line.text.chars().count()).sum()
    }

    /// Drop every queued line
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Lay out every line as two triangles per visible glyph
///
/// `viewport` is the window size in pixels.
pub fn layout_text(atlas: &FontAtlas, text: &OverlayText, viewport: (u32, u32)) -> Vec<TextVertex> {
    let (width, height) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
    let to_ndc = |x: f32, y: f32| [x / width * 2.0 - 1.0, y / height * 2.0 - 1.0];
    let mut vertices = Vec::with_capacity(text.char_count() * 6);

    for line in text.lines() {
        let line_width = atlas.text_width(&line.text);
        let mut pen_x = match line.align {
            TextAlign::Left => line.x,
            TextAlign::Center => line.x - line_width / 2.0,
            TextAlign::Right => line.x - line_width,
        };
        let baseline = line.y + atlas.ascent;

        for ch in line.text.chars() {
            let Some(glyph) = atlas.glyph(ch) else {
                pen_x += atlas.advance(ch);
                continue;
            };

            if glyph.size.x > 0.0 && glyph.size.y > 0.0 {
                let left = pen_x + glyph.bearing.x;
                let top = baseline - (glyph.bearing.y + glyph.size.y);
                let right = left + glyph.size.x;
                let bottom = top + glyph.size.y;

                let tl = TextVertex { position: to_ndc(left, top), uv: [glyph.uv_min.x, glyph.uv_min.y] };
                let tr = TextVertex { position: to_ndc(right, top), uv: [glyph.uv_max.x, glyph.uv_min.y] };
                let bl = TextVertex { position: to_ndc(left, bottom), uv: [glyph.uv_min.x, glyph.uv_max.y] };
                let br = TextVertex { position: to_ndc(right, bottom), uv: [glyph.uv_max.x, glyph.uv_max.y] };
                vertices.extend_from_slice(&[tl, bl, br, tl, br, tr]);
            }

            pen_x += glyph.advance;
        }
    }

    vertices
}
