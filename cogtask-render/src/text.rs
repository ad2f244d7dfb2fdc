use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("parsing font {}: {e}", path.display()))
}

fn layout(text: &str, font_size: f32, font: &FontVec) -> (Vec<Glyph>, f32) {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }
    (glyphs, pen_x)
}

/// Horizontal advance of `text`, kerning included.
pub fn text_width(text: &str, font_size: f32, font: &FontVec) -> f32 {
    layout(text, font_size, font).1
}

/// Rasterises one line of text into a transparent pixmap whose box is the
/// full line: advance width by ascent-to-descent height. Glyphs of equal size
/// therefore share a baseline when their pixmaps are centred on one row.
///
/// `None` for text with no advance (empty string).
pub fn render_text_pixmap(
    text: &str,
    font_size: f32,
    font: &FontVec,
    color: Color,
) -> Option<Pixmap> {
    let (glyphs, advance) = layout(text, font_size, font);
    let sf = font.as_scaled(PxScale::from(font_size));
    let w = advance.ceil() as u32;
    let h = (sf.ascent() - sf.descent()).ceil() as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in glyphs {
        let Some(out) = font.outline_glyph(g) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x).floor() as i32;
            let iy = (y as f32 + b.min.y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a_lin * 255.0) as u8;
            let bg = dst[i];
            // Premultiplied source over whatever an overlapping glyph left.
            let inv = 1.0 - a_lin;
            let over = |s: u8, d: u8| ((s as f32 * a_lin) as u8).saturating_add((d as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(
                over(cu[0], bg.red()),
                over(cu[1], bg.green()),
                over(cu[2], bg.blue()),
                sa.saturating_add((bg.alpha() as f32 * inv) as u8),
            ) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Rendered strings keyed by content, size and colour.
pub struct TextCache {
    font: FontVec,
    map: HashMap<(String, u32, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontVec) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    pub fn font(&self) -> &FontVec {
        &self.font
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get_or_render(&mut self, text: &str, size_px: f32, rgba: [u8; 4]) -> Option<Arc<Pixmap>> {
        let key = (text.to_string(), size_px.to_bits(), rgba);
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let color = Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]);
        let pm = Arc::new(render_text_pixmap(text, size_px, &self.font, color)?);
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }

    /// Cell width for grid-aligned text: wide enough for any letter or the
    /// mask underscore.
    pub fn cell_width(&self, size_px: f32) -> f32 {
        ['W', 'M', '_']
            .iter()
            .map(|c| text_width(&c.to_string(), size_px, &self.font))
            .fold(0.0, f32::max)
    }
}
