use cogtask_core::ArrowDirection;
use tiny_skia::{Color, FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Transform};

/// White cross of `size` px with bars `thickness` px wide.
pub fn fixation_cross(size: u32, thickness: f32) -> Option<Pixmap> {
    let mut pm = Pixmap::new(size, size)?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(255, 255, 255, 255));

    let s = size as f32;
    let h = Rect::from_xywh(0.0, (s - thickness) * 0.5, s, thickness)?;
    pm.fill_rect(h, &paint, Transform::identity(), None);
    let v = Rect::from_xywh((s - thickness) * 0.5, 0.0, thickness, s)?;
    pm.fill_rect(v, &paint, Transform::identity(), None);
    Some(pm)
}

/// Arrow of overall length `size` centred on `(cx, cy)`: a shaft and a
/// triangular head.
pub fn arrow_path(direction: ArrowDirection, cx: f32, cy: f32, size: f32) -> Option<Path> {
    let half = size * 0.5;
    let head = size * 0.45;
    let shaft = size * 0.16;

    // Built pointing right, then rotated into place.
    let mut pb = PathBuilder::new();
    pb.push_rect(Rect::from_xywh(cx - half, cy - shaft * 0.5, size - head, shaft)?);
    pb.move_to(cx + half, cy);
    pb.line_to(cx + half - head, cy - head * 0.8);
    pb.line_to(cx + half - head, cy + head * 0.8);
    pb.close();
    let path = pb.finish()?;

    let angle = match direction {
        ArrowDirection::Right => return Some(path),
        ArrowDirection::Down => 90.0,
        ArrowDirection::Left => 180.0,
        ArrowDirection::Up => 270.0,
    };
    path.transform(Transform::from_rotate_at(angle, cx, cy))
}

/// A row of `count` arrows; the middle one points `target`, the rest
/// `flankers`.
pub fn arrow_row(
    target: ArrowDirection,
    flankers: ArrowDirection,
    count: usize,
    size: f32,
    colour: Color,
) -> Option<Pixmap> {
    let count = count.max(1);
    let spacing = size * 1.25;
    let w = (spacing * count as f32).ceil() as u32;
    let h = size.ceil() as u32;
    let mut pm = Pixmap::new(w, h)?;

    let mut paint = Paint::default();
    paint.set_color(colour);
    let centre = count / 2;
    for i in 0..count {
        let dir = if i == centre { target } else { flankers };
        let cx = spacing * (i as f32 + 0.5);
        if let Some(path) = arrow_path(dir, cx, h as f32 * 0.5, size) {
            pm.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }
    Some(pm)
}
