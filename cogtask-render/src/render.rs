use crate::shapes::{arrow_row, fixation_cross};
use crate::text::TextCache;
use ab_glyph::FontVec;
use anyhow::{Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use cogtask_core::{Colour, StimulusType};
use cogtask_experiment::{Display, ReadingFrame, Screen};
use cogtask_timing::{HighPrecisionTimer, Timer};
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, Pixmap, Rect};
use tracing::warn;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const MASK_GREY: [u8; 4] = [150, 150, 150, 255];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub stimulus_px: f32,
    pub text_px: f32,
    pub feedback_px: f32,
    pub reading_px: f32,
    pub arrow_px: f32,
    pub fixation_px: u32,
    /// Line height as a multiple of the font size.
    pub line_spacing: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stimulus_px: 64.0,
            text_px: 28.0,
            feedback_px: 44.0,
            reading_px: 30.0,
            arrow_px: 48.0,
            fixation_px: 40,
            line_spacing: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    /// Time spent drawing the last screen into the canvas.
    pub draw: Duration,
    pub copy: Duration,
    pub dirty_count: usize,
}

/// Owned copy of the last screen, kept so a resize can redraw it.
#[derive(Debug, Clone)]
enum Shown {
    Blank,
    Fixation,
    Stimulus(StimulusType),
    Feedback { text: String, colour: Colour },
    Message(String),
    Reading(ReadingFrame),
}

impl From<Screen<'_>> for Shown {
    fn from(screen: Screen<'_>) -> Self {
        match screen {
            Screen::Blank => Shown::Blank,
            Screen::Fixation => Shown::Fixation,
            Screen::Stimulus(s) => Shown::Stimulus(s.clone()),
            Screen::Feedback { text, colour, .. } => Shown::Feedback {
                text: text.to_string(),
                colour,
            },
            Screen::Message(text) => Shown::Message(text.to_string()),
            Screen::Reading(frame) => Shown::Reading(frame.clone()),
        }
    }
}

/// Software renderer: draws each screen into an opaque black canvas and
/// copies only the regions that changed into the frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    style: Style,

    text: Option<TextCache>,
    fixation: Arc<Pixmap>,

    canvas: Pixmap,
    shown: Shown,
    /// Regions drawn for the current screen.
    dirty_regions: Vec<Rect>,
    /// Regions cleared on the canvas but not yet presented.
    stale_regions: Vec<Rect>,
    first_frame: bool,
    pending: bool,

    timer: HighPrecisionTimer,
    last_draw: Duration,
    clear_buffer: Vec<u8>,
}

fn black_buffer(width: u32, height: u32) -> Vec<u8> {
    [0u8, 0, 0, 255]
        .into_iter()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

fn black_canvas(width: u32, height: u32) -> Result<Pixmap> {
    let mut canvas = Pixmap::new(width, height)
        .with_context(|| format!("cannot allocate a {width}x{height} canvas"))?;
    canvas.fill(Color::from_rgba8(0, 0, 0, 255));
    Ok(canvas)
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_style(width, height, Style::default())
    }

    pub fn with_style(width: u32, height: u32, style: Style) -> Result<Self> {
        let fixation = fixation_cross(style.fixation_px, 2.0).context("fixation cross")?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            style,
            text: None,
            fixation: Arc::new(fixation),
            canvas: black_canvas(width, height)?,
            shown: Shown::Blank,
            dirty_regions: Vec::with_capacity(16),
            stale_regions: Vec::with_capacity(16),
            first_frame: true,
            pending: true,
            timer: HighPrecisionTimer::new(),
            last_draw: Duration::ZERO,
            clear_buffer: black_buffer(width, height),
        })
    }

    /// Without a font, text screens stay blank.
    pub fn with_font(mut self, font: FontVec) -> Self {
        self.text = Some(TextCache::new(font));
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Whether the canvas changed since the last [`SkiaRenderer::present`].
    pub fn needs_present(&self) -> bool {
        self.pending
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.width = new_width;
        self.height = new_height;
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.canvas = black_canvas(new_width, new_height)?;
        self.clear_buffer = black_buffer(new_width, new_height);
        self.dirty_regions.clear();
        self.stale_regions.clear();
        self.first_frame = true;
        let shown = self.shown.clone();
        self.draw(&shown);
        self.pending = true;
        Ok(())
    }

    /// Copies everything that changed since the last call into
    /// `frame_buffer` (RGBA8, canvas-sized).
    pub fn present(&mut self, frame_buffer: &mut [u8]) -> FrameStats {
        let t = self.timer.now();
        if frame_buffer.len() != self.canvas.data().len() {
            warn!(
                buffer = frame_buffer.len(),
                canvas = self.canvas.data().len(),
                "frame buffer does not match canvas size"
            );
            return FrameStats::default();
        }

        let mut present_rects = std::mem::take(&mut self.stale_regions);
        if self.first_frame {
            self.first_frame = false;
            frame_buffer.copy_from_slice(self.canvas.data());
            present_rects.clear();
        } else {
            present_rects.extend_from_slice(&self.dirty_regions);
            Self::coalesce_dirty(&mut present_rects);
            for rect in &present_rects {
                self.copy_dirty_region(*rect, frame_buffer);
            }
        }
        self.pending = false;
        self.timer.record_frame(self.last_draw);

        FrameStats {
            draw: self.last_draw,
            copy: self.timer.elapsed(t),
            dirty_count: present_rects.len(),
        }
    }

    fn draw(&mut self, shown: &Shown) {
        match shown {
            Shown::Blank => {}
            Shown::Fixation => {
                let cross = Arc::clone(&self.fixation);
                self.blit(&cross, self.center);
            }
            Shown::Stimulus(stimulus) => self.draw_stimulus(stimulus),
            Shown::Feedback { text, colour } => {
                self.draw_lines(text, self.style.feedback_px, colour.0);
            }
            Shown::Message(text) => self.draw_lines(text, self.style.text_px, WHITE),
            Shown::Reading(frame) => self.draw_reading(frame),
        }
    }

    fn draw_stimulus(&mut self, stimulus: &StimulusType) {
        match stimulus {
            StimulusType::Arrows {
                target,
                flankers,
                count,
            } => {
                let colour = Color::from_rgba8(255, 255, 255, 255);
                match arrow_row(*target, *flankers, *count, self.style.arrow_px, colour) {
                    Some(pm) => self.blit(&pm, self.center),
                    None => warn!(count, "arrow row could not be drawn"),
                }
            }
            StimulusType::Letters { text } => self.draw_grid_line(text, self.center.1, self.style.stimulus_px, WHITE),
            StimulusType::ColourWord { word, ink } => {
                self.draw_text(word, self.style.stimulus_px, ink.0, self.center)
            }
            StimulusType::Text { content } => self.draw_lines(content, self.style.stimulus_px, WHITE),
        }
    }

    fn draw_text(&mut self, text: &str, size: f32, rgba: [u8; 4], centre: (f32, f32)) {
        let Some(cache) = self.text.as_mut() else {
            return;
        };
        if let Some(pm) = cache.get_or_render(text, size, rgba) {
            self.blit(&pm, centre);
        }
    }

    /// Lines stacked around the screen centre.
    fn draw_lines(&mut self, text: &str, size: f32, rgba: [u8; 4]) {
        let lines: Vec<&str> = text.lines().collect();
        let line_h = size * self.style.line_spacing;
        let top = self.center.1 - (lines.len().saturating_sub(1)) as f32 * line_h * 0.5;
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            self.draw_text(line, size, rgba, (self.center.0, top + i as f32 * line_h));
        }
    }

    /// Characters placed on a fixed grid, so a masked line and its text
    /// line up column by column.
    fn draw_grid_line(&mut self, line: &str, y: f32, size: f32, rgba: [u8; 4]) {
        let Some(cell) = self.text.as_ref().map(|t| t.cell_width(size)) else {
            return;
        };
        let n = line.chars().count() as f32;
        let x0 = self.center.0 - n * cell * 0.5;
        for (i, c) in line.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let x = x0 + (i as f32 + 0.5) * cell;
            self.draw_text(c.encode_utf8(&mut [0; 4]), size, rgba, (x, y));
        }
    }

    fn draw_reading(&mut self, frame: &ReadingFrame) {
        let size = self.style.reading_px;
        if frame.centred {
            let text = frame.lines.first().map(|l| l.text.as_str()).unwrap_or("");
            self.draw_text(text, size, WHITE, self.center);
            return;
        }
        let line_h = size * self.style.line_spacing;
        let top = self.center.1 - (frame.lines.len().saturating_sub(1)) as f32 * line_h * 0.5;
        for (i, line) in frame.lines.iter().enumerate() {
            let y = top + i as f32 * line_h;
            self.draw_grid_line(&line.mask, y, size, MASK_GREY);
            self.draw_grid_line(&line.text, y, size, WHITE);
        }
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let x0 = rect.x().floor().max(0.0).min(self.width as f32) as usize;
            let y0 = rect.y().floor().max(0.0).min(self.height as f32) as usize;
            let x1 = (rect.x() + rect.width()).ceil().min(self.width as f32) as usize;
            let y1 = (rect.y() + rect.height()).ceil().min(self.height as f32) as usize;
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len]
                    .copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let (x0, y0, x1, y1) = (
            dirty.x().floor().max(0.0).min(self.width as f32) as usize,
            dirty.y().floor().max(0.0).min(self.height as f32) as usize,
            (dirty.x() + dirty.width()).ceil().min(self.width as f32) as usize,
            (dirty.y() + dirty.height()).ceil().min(self.height as f32) as usize,
        );
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();
        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            frame_buffer[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }

    /// Merges rects on the same row that touch.
    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row =
                    (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    /// Source-over blit of a premultiplied pixmap centred on `pos`.
    fn blit(&mut self, pm: &Pixmap, pos: (f32, f32)) {
        let (w, h) = (pm.width(), pm.height());
        let (cw, ch) = (self.width as usize, self.height as usize);

        let x = (pos.0 - w as f32 * 0.5) as i32;
        let y = (pos.1 - h as f32 * 0.5) as i32;
        if x + w as i32 <= 0 || y + h as i32 <= 0 || x >= cw as i32 || y >= ch as i32 {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x_offset = (-x).max(0) as usize;
        let src_y_offset = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x_offset).min(cw - dst_x);
        let copy_h = (h as usize - src_y_offset).min(ch - dst_y);

        let src_u32: &[u32] = cast_slice(pm.data());
        let dst_u32: &mut [u32] = cast_slice_mut(self.canvas.data_mut());
        let src_stride = w as usize;

        for row in 0..copy_h {
            let src_row_start = (src_y_offset + row) * src_stride + src_x_offset;
            let dst_row_start = (dst_y + row) * cw + dst_x;
            let src_row = &src_u32[src_row_start..src_row_start + copy_w];
            let dst_row = &mut dst_u32[dst_row_start..dst_row_start + copy_w];

            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                let sa = (s >> 24) & 0xFF;
                if sa == 0 {
                    continue;
                }
                if sa == 255 {
                    *d = s;
                    continue;
                }
                let inv = 255 - sa;
                let channel = |shift: u32| {
                    let sc = (s >> shift) & 0xFF;
                    let dc = (*d >> shift) & 0xFF;
                    (sc + (dc * inv + 127) / 255).min(255) << shift
                };
                *d = channel(0) | channel(8) | channel(16) | channel(24);
            }
        }

        if let Some(rect) =
            Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
        {
            self.dirty_regions.push(rect);
        }
    }
}

impl Display for SkiaRenderer {
    fn show(&mut self, screen: Screen<'_>) {
        let t = self.timer.now();
        let old = std::mem::take(&mut self.dirty_regions);
        self.clear_dirty(&old);
        self.stale_regions.extend(old);

        let shown = Shown::from(screen);
        self.draw(&shown);
        self.shown = shown;

        self.last_draw = self.timer.elapsed(t);
        self.pending = true;
    }
}
