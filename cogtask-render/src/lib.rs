//! Software rendering of experiment screens into an RGBA frame buffer.

pub mod render;
pub mod shapes;
pub mod text;

pub use render::{FrameStats, SkiaRenderer, Style};
pub use shapes::{arrow_path, arrow_row, fixation_cross};
pub use text::{TextCache, load_font, render_text_pixmap, text_width};
