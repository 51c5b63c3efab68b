/// Draw element boxes and numeric id labels onto a screenshot.
///
/// Output is a pure function of (screenshot, catalog, viewport): labels are
/// placed greedily with the topmost element choosing first, then everything is
/// drawn in ascending z-order so the topmost label ends up on top.
use crate::errors::{WebClawError, WebClawResult};
use crate::perception::types::{ElementRole, IndexedElement, Viewport};

/// RGBA colour palette indexed by element role.
fn role_colour(el: &IndexedElement) -> [u8; 4] {
    if !el.enabled {
        return [150, 150, 150, 200]; // grey
    }
    match el.role {
        ElementRole::Button => [255, 68, 68, 220],                          // red
        ElementRole::Input | ElementRole::TextArea | ElementRole::Editable => [68, 200, 68, 220], // green
        ElementRole::Link => [68, 68, 255, 220],                            // blue
        ElementRole::Checkbox | ElementRole::Radio => [255, 68, 255, 220],  // magenta
        ElementRole::Select | ElementRole::Option => [170, 170, 68, 220],   // olive
        ElementRole::Tab | ElementRole::MenuItem => [0, 200, 220, 220],     // cyan
        ElementRole::Other(_) => [255, 170, 0, 220],                        // orange
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl LabelRect {
    fn intersects(&self, other: &LabelRect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

fn to_pixels(el: &IndexedElement, scale: f64) -> PixelBox {
    let b = &el.bounds;
    PixelBox {
        x1: (b.x * scale).round() as i32,
        y1: (b.y * scale).round() as i32,
        x2: ((b.x + b.width) * scale).round() as i32,
        y2: ((b.y + b.height) * scale).round() as i32,
    }
}

fn label_size(text: &str, font_scale: u32) -> (i32, i32) {
    let char_w = 5 * font_scale + 1;
    let pad = 2 * font_scale;
    let w = text.len() as u32 * char_w + pad * 2;
    let h = 5 * font_scale + pad * 2;
    (w as i32, h as i32)
}

fn clamp_rect(r: LabelRect, img_w: i32, img_h: i32) -> LabelRect {
    LabelRect {
        x: r.x.clamp(0, (img_w - r.w).max(0)),
        y: r.y.clamp(0, (img_h - r.h).max(0)),
        ..r
    }
}

const LABEL_RINGS: i32 = 6;

/// Slots on widening rings around `anchor`, nearest ring first. Used once the
/// slots attached to the element's box are all taken.
fn ring_slots(anchor: LabelRect, img_w: i32, img_h: i32) -> impl Iterator<Item = LabelRect> {
    (1..=LABEL_RINGS).flat_map(move |ring| {
        [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)]
            .into_iter()
            .map(move |(dx, dy)| {
                let r = LabelRect {
                    x: anchor.x + dx * ring * (anchor.w + 1),
                    y: anchor.y + dy * ring * (anchor.h + 1),
                    ..anchor
                };
                clamp_rect(r, img_w, img_h)
            })
    })
}

/// Only visible elements get a label; invisible ones stay in the catalog for the prompt.
fn drawable(elements: &[IndexedElement]) -> Vec<&IndexedElement> {
    let mut items: Vec<&IndexedElement> = elements
        .iter()
        .filter(|e| e.visible && !e.bounds.is_empty())
        .collect();
    items.sort_by_key(|e| (e.z_order, e.id));
    items
}

/// Choose a label rectangle per element. Returned in the same order as
/// `drawable()` (ascending z-order).
pub fn place_labels(
    elements: &[IndexedElement],
    scale: f64,
    img_w: u32,
    img_h: u32,
    font_scale: u32,
) -> Vec<(u32, LabelRect)> {
    let items = drawable(elements);
    let (iw, ih) = (img_w as i32, img_h as i32);
    let mut placed: Vec<Option<LabelRect>> = vec![None; items.len()];
    let mut taken: Vec<LabelRect> = Vec::with_capacity(items.len());

    for (slot, el) in items.iter().enumerate().rev() {
        let px = to_pixels(el, scale);
        let (w, h) = label_size(&el.id.to_string(), font_scale);
        let candidates = [
            LabelRect { x: px.x1, y: px.y1 - h, w, h }, // above, left-aligned
            LabelRect { x: px.x1, y: px.y1, w, h },     // inside top-left
            LabelRect { x: px.x1, y: px.y2, w, h },     // below
            LabelRect { x: px.x2, y: px.y1, w, h },     // right
            LabelRect { x: px.x2 - w, y: px.y2 - h, w, h }, // inside bottom-right
        ];
        let candidates = candidates.map(|c| clamp_rect(c, iw, ih));
        let free = |c: &LabelRect| !taken.iter().any(|t| t.intersects(c));
        let chosen = candidates
            .iter()
            .copied()
            .find(|c| free(c))
            .or_else(|| ring_slots(candidates[0], iw, ih).find(|c| free(c)))
            .unwrap_or(candidates[0]);
        taken.push(chosen);
        placed[slot] = Some(chosen);
    }

    items
        .iter()
        .zip(placed)
        .filter_map(|(el, rect)| rect.map(|r| (el.id, r)))
        .collect()
}

/// Annotate `src_bytes` (PNG/JPEG) with a box and id label per visible element.
/// Returns PNG-encoded bytes.
pub fn annotate_scene(
    src_bytes: &[u8],
    elements: &[IndexedElement],
    viewport: &Viewport,
) -> WebClawResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| WebClawError::SceneUnavailable(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    let scale = if viewport.width > 0.0 {
        w as f64 / viewport.width
    } else {
        1.0
    };
    // Use 2× scale for labels on high-res captures (> 1600 px wide)
    let font_scale: u32 = if w > 1600 { 2 } else { 1 };
    let box_thickness: i32 = if w > 1600 { 3 } else { 2 };

    let items = drawable(elements);
    let labels = place_labels(elements, scale, w, h, font_scale);

    for (el, (id, rect)) in items.iter().zip(labels.iter()) {
        debug_assert_eq!(el.id, *id);
        let col = role_colour(el);
        let px = to_pixels(el, scale);
        draw_rect(&mut canvas, px.x1, px.y1, px.x2, px.y2, col, box_thickness);
        draw_label(&mut canvas, rect, &id.to_string(), col, font_scale);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| WebClawError::SceneUnavailable(format!("PNG encode: {e}")))?;

    Ok(out)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);

    for t in 0..thickness {
        let ty = y1 + t;
        let by = y2 - t;
        for x in x1.max(0)..=x2.min(iw - 1) {
            if ty >= 0 && ty < ih { set_pixel(canvas, x as u32, ty as u32, col); }
            if by >= 0 && by < ih { set_pixel(canvas, x as u32, by as u32, col); }
        }
    }
    for t in 0..thickness {
        let lx = x1 + t;
        let rx = x2 - t;
        for y in y1.max(0)..=y2.min(ih - 1) {
            if lx >= 0 && lx < iw { set_pixel(canvas, lx as u32, y as u32, col); }
            if rx >= 0 && rx < iw { set_pixel(canvas, rx as u32, y as u32, col); }
        }
    }
}

fn draw_label(canvas: &mut image::RgbaImage, rect: &LabelRect, text: &str, col: [u8; 4], scale: u32) {
    let (w, h) = canvas.dimensions();

    // Solid background in the role colour so overlapping labels stay legible.
    for dy in 0..rect.h.max(0) as u32 {
        for dx in 0..rect.w.max(0) as u32 {
            let px = rect.x.max(0) as u32 + dx;
            let py = rect.y.max(0) as u32 + dy;
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                *p = image::Rgba([col[0] / 2, col[1] / 2, col[2] / 2, 255]);
            }
        }
    }

    let pad = 2 * scale;
    let step = 5 * scale + 1;
    for (i, c) in text.chars().enumerate() {
        let gx = rect.x.max(0) as u32 + pad + i as u32 * step;
        let gy = rect.y.max(0) as u32 + pad;
        draw_digit(canvas, c, gx, gy, scale);
    }
}

fn draw_digit(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, scale: u32) {
    let Some(d) = c.to_digit(10) else { return };
    let glyph = DIGITS[d as usize];
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 { continue; }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        canvas.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
                    }
                }
            }
        }
    }
}

fn set_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}

/// 5×5 bitmap digits; bit4 is the leftmost pixel.
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::Bounds;

    fn blank_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([250, 250, 250, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn el(id: u32, x: f64, y: f64, z: i32) -> IndexedElement {
        IndexedElement {
            id,
            role: ElementRole::Button,
            tag: "button".into(),
            label: String::new(),
            bounds: Bounds { x, y, width: 60.0, height: 24.0 },
            frame_path: vec![],
            visible: true,
            enabled: true,
            z_order: z,
        }
    }

    fn viewport(w: f64, h: f64) -> Viewport {
        Viewport { width: w, height: h, device_pixel_ratio: 1.0 }
    }

    #[test]
    fn identical_input_gives_identical_pixels() {
        let src = blank_png(320, 200);
        let catalog = vec![el(1, 10.0, 30.0, 0), el(2, 20.0, 35.0, 5), el(3, 200.0, 120.0, 0)];
        let a = annotate_scene(&src, &catalog, &viewport(320.0, 200.0)).unwrap();
        let b = annotate_scene(&src, &catalog, &viewport(320.0, 200.0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, src);
    }

    #[test]
    fn overlapping_elements_get_disjoint_labels() {
        let catalog = vec![el(1, 50.0, 50.0, 0), el(2, 52.0, 52.0, 0), el(3, 54.0, 54.0, 1)];
        let labels = place_labels(&catalog, 1.0, 400, 300, 1);
        assert_eq!(labels.len(), 3);
        for (i, (_, a)) in labels.iter().enumerate() {
            for (_, b) in labels.iter().skip(i + 1) {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn stacked_elements_spill_onto_outer_rings() {
        let catalog: Vec<_> = (1..=9).map(|id| el(id, 150.0, 120.0, 0)).collect();
        let labels = place_labels(&catalog, 1.0, 400, 300, 1);
        assert_eq!(labels.len(), 9);
        for (i, (a_id, a)) in labels.iter().enumerate() {
            for (b_id, b) in labels.iter().skip(i + 1) {
                assert!(!a.intersects(b), "label {a_id} {a:?} overlaps label {b_id} {b:?}");
            }
        }
    }

    #[test]
    fn labels_follow_z_order_and_skip_invisible() {
        let mut hidden = el(4, 0.0, 0.0, 9);
        hidden.visible = false;
        let catalog = vec![el(1, 10.0, 40.0, 3), el(2, 100.0, 40.0, 0), hidden];
        let ids: Vec<u32> = place_labels(&catalog, 1.0, 400, 300, 1)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn topmost_element_gets_preferred_slot() {
        let catalog = vec![el(1, 50.0, 50.0, 0), el(2, 50.0, 50.0, 7)];
        let labels = place_labels(&catalog, 1.0, 400, 300, 1);
        let top = labels.iter().find(|(id, _)| *id == 2).unwrap().1;
        let (_, h) = label_size("2", 1);
        assert_eq!((top.x, top.y), (50, 50 - h));
    }

    #[test]
    fn labels_stay_inside_image() {
        let catalog = vec![el(12, 0.0, 0.0, 0)];
        let labels = place_labels(&catalog, 2.0, 100, 60, 1);
        let (_, r) = labels[0];
        assert!(r.x >= 0 && r.y >= 0);
        assert!(r.x + r.w <= 100 && r.y + r.h <= 60);
    }
}
