//! Draw verdicts onto a copy of the frame.

use anyhow::Result;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::collections::HashMap;

use crate::classify::Verdict;
use crate::frame::Frame;
use crate::region::{Point, RegionModel};

pub const OCCUPIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FREE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const PREVIEW_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const PLACEHOLDER_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

const OUTLINE_THICKNESS: i32 = 3;
const LABEL_PADDING: i32 = 5;
const GLYPH_SIZE: u32 = 8;
const GLYPH_SCALE: u32 = 2;

pub fn verdict_color(occupied: bool) -> Rgb<u8> {
    if occupied {
        OCCUPIED_COLOR
    } else {
        FREE_COLOR
    }
}

/// Outline every region in its verdict colour and label it at the vertex centroid.
///
/// Regions without a verdict are left undrawn. The input frame is not touched.
pub fn annotate(frame: &Frame, regions: &RegionModel, verdicts: &[Verdict]) -> Frame {
    let by_id: HashMap<&str, &Verdict> =
        verdicts.iter().map(|v| (v.region_id.as_str(), v)).collect();
    let mut out = frame.clone();
    let canvas = out.image_mut();
    for region in regions {
        let Some(verdict) = by_id.get(region.id()) else {
            continue;
        };
        let color = verdict_color(verdict.occupied);
        draw_polygon_outline(canvas, region.polygon(), color);
        let label = format!("{}: {}", region.id(), verdict.status_label());
        draw_label(canvas, region.centroid(), &label, color);
    }
    out
}

/// Outline and name every region without classifying, for checking a region file
/// against its image.
pub fn preview(frame: &Frame, regions: &RegionModel) -> Frame {
    let mut out = frame.clone();
    let canvas = out.image_mut();
    for region in regions {
        draw_polygon_outline(canvas, region.polygon(), PREVIEW_COLOR);
        draw_label(canvas, region.centroid(), region.id(), PREVIEW_COLOR);
    }
    out
}

/// Black frame with a centred message, served when no real frame is available.
pub fn placeholder(width: u32, height: u32, message: &str) -> Result<Frame> {
    let mut frame = Frame::filled(width, height, [0, 0, 0])?;
    let (tw, th) = text_size(message);
    let origin = (
        (width as i64 - tw as i64) / 2,
        (height as i64 - th as i64) / 2,
    );
    draw_text(frame.image_mut(), origin, message, PLACEHOLDER_TEXT);
    Ok(frame)
}

fn draw_polygon_outline(canvas: &mut RgbImage, polygon: &[Point], color: Rgb<u8>) {
    let half = OUTLINE_THICKNESS / 2;
    // Clip to the canvas plus the outline margin before rasterising.
    let margin = (half + 1) as f64;
    let bounds = (
        -margin,
        -margin,
        canvas.width() as f64 - 1.0 + margin,
        canvas.height() as f64 - 1.0 + margin,
    );
    for (i, a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        let start = (a.x as f64, a.y as f64);
        let end = (b.x as f64, b.y as f64);
        let Some((start, end)) = clip_segment(start, end, bounds) else {
            continue;
        };
        for dy in -half..=half {
            for dx in -half..=half {
                let (dx, dy) = (dx as f64, dy as f64);
                draw_line_segment_mut(
                    canvas,
                    ((start.0 + dx) as f32, (start.1 + dy) as f32),
                    ((end.0 + dx) as f32, (end.1 + dy) as f32),
                    color,
                );
            }
        }
    }
}

/// Liang-Barsky clip of `start..end` against `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    start: (f64, f64),
    end: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, start.0 - min_x),
        (dx, max_x - start.0),
        (-dy, start.1 - min_y),
        (dy, max_y - start.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (start.0 + t0 * dx, start.1 + t0 * dy),
        (start.0 + t1 * dx, start.1 + t1 * dy),
    ))
}

/// Filled background box plus text whose baseline sits on `anchor.y`, centred on `anchor.x`.
fn draw_label(canvas: &mut RgbImage, anchor: Point, text: &str, color: Rgb<u8>) {
    let (tw, th) = text_size(text);
    let (tw, th) = (tw as i64, th as i64);
    let (ax, ay) = (anchor.x as i64, anchor.y as i64);
    let pad = LABEL_PADDING as i64;
    let left = ax - tw / 2 - pad;
    let top = ay - th - pad;
    let right = ax + tw / 2 + pad;
    let bottom = ay + pad;
    if right < 0
        || bottom < 0
        || left >= canvas.width() as i64
        || top >= canvas.height() as i64
    {
        return;
    }
    // Clamp to one pixel outside the canvas; the visible part is unchanged.
    let left = left.max(-1);
    let top = top.max(-1);
    let right = right.min(canvas.width() as i64);
    let bottom = bottom.min(canvas.height() as i64);
    let rect = Rect::at(left as i32, top as i32)
        .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
    draw_filled_rect_mut(canvas, rect, LABEL_BACKGROUND);
    draw_text(canvas, (ax - tw / 2, ay - th), text, color);
}

/// Rendered size of `text` in pixels.
pub fn text_size(text: &str) -> (u32, u32) {
    let advance = GLYPH_SIZE * GLYPH_SCALE;
    (text.chars().count() as u32 * advance, advance)
}

/// Blit `text` with its top-left corner at `origin`, clipped to the canvas.
fn draw_text(canvas: &mut RgbImage, origin: (i64, i64), text: &str, color: Rgb<u8>) {
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let scale = GLYPH_SCALE as i64;
    let advance = (GLYPH_SIZE * GLYPH_SCALE) as i64;
    for (i, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let gx = origin.0 + i as i64 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE as i64 {
                // Bit 0 is the leftmost column.
                if bits & (1 << col) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let x = gx + col * scale + sx;
                        let y = origin.1 + row as i64 * scale + sy;
                        if (0..w).contains(&x) && (0..h).contains(&y) {
                            canvas.put_pixel(x as u32, y as u32, color);
                        }
                    }
                }
            }
        }
    }
}
