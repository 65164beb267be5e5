//! Composites annotation objects onto the base bitmap.
//!
//! Geometry is computed in image-pixel space (bottom-left origin) through the
//! same [`CoordinateMapper`] the gestures use; a single Y-flip transform then
//! maps it onto the top-left pixmap memory layout.

use ab_glyph::FontArc;
use egui::{vec2, Pos2};
use image::RgbaImage;
use log::debug;
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Rect, Stroke, Transform,
};

use crate::annotation::{Annotation, AnnotationKind, Rgba};
use crate::error::{EditorError, EditorResult};
use crate::geometry::{arrow_geometry, rotated_corners, CoordinateMapper};
use crate::text::{self, BACKGROUND_PADDING, TEXT_INSET};

/// Renders `base` plus every object into a new bitmap of the same size.
///
/// The result is complete or absent; a failure never yields partial output.
pub fn flatten(
    base: &RgbaImage,
    objects: &[Annotation],
    mapper: &CoordinateMapper,
    font: Option<&FontArc>,
) -> EditorResult<RgbaImage> {
    let (width, height) = base.dimensions();
    let mapper = CoordinateMapper {
        pixel: vec2(width as f32, height as f32),
        ..*mapper
    };

    let mut pixmap = pixmap_from_rgba(base)?;
    let flip = Transform::from_row(1.0, 0.0, 0.0, -1.0, 0.0, height as f32);

    for object in objects {
        draw_object(&mut pixmap, object, &mapper, flip, font)?;
    }

    pixmap_to_rgba(&pixmap)
}

fn pixmap_from_rgba(image: &RgbaImage) -> EditorResult<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or(EditorError::PixmapAllocation { width, height })?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> EditorResult<RgbaImage> {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    let actual = data.len();
    RgbaImage::from_raw(width, height, data).ok_or(EditorError::BitmapSizeMismatch {
        width,
        height,
        actual,
    })
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    }
}

fn to_skia_rect(rect: egui::Rect) -> Option<Rect> {
    Rect::from_ltrb(rect.min.x, rect.min.y, rect.max.x, rect.max.y)
}

fn polygon(points: &[Pos2]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in rest {
        pb.line_to(p.x, p.y);
    }
    pb.close();
    pb.finish()
}

fn draw_object(
    pixmap: &mut Pixmap,
    object: &Annotation,
    mapper: &CoordinateMapper,
    flip: Transform,
    font: Option<&FontArc>,
) -> EditorResult<()> {
    let unit = mapper.author_unit_in_pixels();
    let color = paint(object.color);

    match &object.kind {
        AnnotationKind::Line {
            from,
            to,
            width,
            arrow,
        } => {
            let start = mapper.to_pixel(*from);
            let end = mapper.to_pixel(*to);
            let width_px = width * unit;
            let head = if *arrow {
                arrow_geometry(start, end, width_px, unit)
            } else {
                None
            };
            let shaft_end = head.map(|h| h.shaft_end).unwrap_or(end);

            let mut pb = PathBuilder::new();
            pb.move_to(start.x, start.y);
            pb.line_to(shaft_end.x, shaft_end.y);
            match pb.finish() {
                Some(path) => pixmap.stroke_path(&path, &color, &stroke(width_px), flip, None),
                None => debug!("skipping degenerate line #{}", object.id),
            }

            if let Some(head) = head {
                if let Some(path) = polygon(&[head.tip, head.left, head.right]) {
                    pixmap.fill_path(&path, &color, FillRule::Winding, flip, None);
                }
            }
        }
        AnnotationKind::Rect {
            rect,
            width,
            rotation,
        } => {
            // Rotate in author space first: the Y axis flips on the way to pixels.
            let path = if *rotation == 0.0 {
                to_skia_rect(mapper.rect_to_pixel(*rect)).map(PathBuilder::from_rect)
            } else {
                polygon(&rotated_corners(*rect, *rotation).map(|c| mapper.to_pixel(c)))
            };
            match path {
                Some(path) => pixmap.stroke_path(&path, &color, &stroke(width * unit), flip, None),
                None => debug!("skipping degenerate rect #{}", object.id),
            }
        }
        AnnotationKind::Oval { rect, width } => {
            match to_skia_rect(mapper.rect_to_pixel(*rect)).and_then(PathBuilder::from_oval) {
                Some(path) => pixmap.stroke_path(&path, &color, &stroke(width * unit), flip, None),
                None => debug!("skipping degenerate oval #{}", object.id),
            }
        }
        AnnotationKind::Highlight { rect } => {
            if let Some(rect) = to_skia_rect(mapper.rect_to_pixel(*rect)) {
                pixmap.fill_rect(rect, &color, flip, None);
            }
        }
        AnnotationKind::Badge {
            rect,
            number,
            text_color,
        } => {
            let px = mapper.rect_to_pixel(*rect);
            if let Some(path) = to_skia_rect(px).and_then(PathBuilder::from_oval) {
                pixmap.fill_path(&path, &color, FillRule::Winding, flip, None);
            }
            if let Some(font) = font {
                draw_badge_label(pixmap, font, px, *number, *text_color, flip);
            }
        }
        AnnotationKind::Text {
            rect,
            content,
            font_size,
            background,
            rotation,
        } => {
            let px = mapper.rect_to_pixel(*rect);
            let center = mapper.to_pixel(rect.center());
            let (w, h) = (px.width(), px.height());
            // Single transform: the angle is negated for the Y-up pixel frame.
            let transform = flip
                .pre_concat(Transform::from_translate(center.x, center.y))
                .pre_concat(Transform::from_rotate(-rotation.to_degrees()));

            if let Some(background) = background {
                let pad = BACKGROUND_PADDING * unit;
                if let Some(bg) = Rect::from_xywh(-w / 2.0 - pad, -h / 2.0 - pad, w + 2.0 * pad, h + 2.0 * pad) {
                    pixmap.fill_rect(bg, &paint(*background), transform, None);
                }
            }

            if let Some(font) = font {
                let size = font_size * unit;
                let inset = TEXT_INSET * unit;
                let layout = text::layout(font, content, size, (w - 2.0 * inset).max(1.0));
                let mut pb = PathBuilder::new();
                let mut baseline = h / 2.0 - inset - layout.ascent;
                for line in &layout.lines {
                    text::push_glyphs(&mut pb, font, line, size, (-w / 2.0 + inset, baseline));
                    baseline -= layout.line_height;
                }
                if let Some(path) = pb.finish() {
                    pixmap.fill_path(&path, &color, FillRule::Winding, transform, None);
                }
            }
        }
        AnnotationKind::PastedImage {
            rect,
            bitmap,
            rotation,
        } => {
            let (iw, ih) = (bitmap.width() as f32, bitmap.height() as f32);
            if iw == 0.0 || ih == 0.0 {
                debug!("skipping empty pasted image #{}", object.id);
                return Ok(());
            }
            let source = pixmap_from_rgba(bitmap)?;
            let px = mapper.rect_to_pixel(*rect);
            let center = mapper.to_pixel(rect.center());
            // Bitmap rows run top-down, so the local frame flips once more.
            let transform = flip
                .pre_concat(Transform::from_translate(center.x, center.y))
                .pre_concat(Transform::from_rotate(-rotation.to_degrees()))
                .pre_concat(Transform::from_scale(px.width() / iw, -px.height() / ih))
                .pre_concat(Transform::from_translate(-iw / 2.0, -ih / 2.0));
            let paint = PixmapPaint {
                quality: FilterQuality::Bicubic,
                ..Default::default()
            };
            pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
        }
    }

    Ok(())
}

fn draw_badge_label(
    pixmap: &mut Pixmap,
    font: &FontArc,
    rect: egui::Rect,
    number: u32,
    color: Rgba,
    flip: Transform,
) {
    let label = number.to_string();
    let size = 0.6 * rect.width().min(rect.height());
    let width = text::measure(font, &label, size);
    let (ascent, descent) = text::vertical_metrics(font, size);
    let center = rect.center();
    let origin = (center.x - width / 2.0, center.y - (ascent + descent) / 2.0);

    let mut pb = PathBuilder::new();
    text::push_glyphs(&mut pb, font, &label, size, origin);
    if let Some(path) = pb.finish() {
        pixmap.fill_path(&path, &paint(color), FillRule::Winding, flip, None);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::Rect as UiRect;
    use image::{Rgba as Pixel, RgbaImage};

    use super::*;

    const RED: Rgba = [229, 62, 62, 255];

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Pixel([255, 255, 255, 255]))
    }

    fn unit_mapper(width: f32, height: f32) -> CoordinateMapper {
        CoordinateMapper::new(vec2(width, height), vec2(width, height), vec2(width, height))
    }

    fn is_reddish(pixel: &Pixel<u8>) -> bool {
        pixel[0] > 180 && pixel[1] < 140 && pixel[2] < 140
    }

    fn rect_object(rect: UiRect, rotation: f32) -> Annotation {
        Annotation {
            id: 1,
            color: RED,
            kind: AnnotationKind::Rect {
                rect,
                width: 4.0,
                rotation,
            },
        }
    }

    #[test]
    fn flatten_keeps_image_size() {
        let image = white(320, 200);
        let objects = vec![rect_object(
            UiRect::from_min_max(Pos2::new(8.0, 8.0), Pos2::new(120.0, 80.0)),
            0.0,
        )];
        let result = flatten(&image, &objects, &unit_mapper(320.0, 200.0), None)
            .expect("flatten should succeed");
        assert_eq!(result.dimensions(), (320, 200));
    }

    #[test]
    fn rect_lands_at_flipped_pixel_position() {
        let image = white(800, 600);
        let objects = vec![rect_object(
            UiRect::from_min_size(Pos2::new(100.0, 100.0), vec2(200.0, 100.0)),
            0.0,
        )];
        let result = flatten(&image, &objects, &unit_mapper(800.0, 600.0), None)
            .expect("flatten should succeed");

        assert!(is_reddish(result.get_pixel(200, 100)));
        assert!(is_reddish(result.get_pixel(200, 200)));
        assert!(is_reddish(result.get_pixel(100, 150)));
        assert_eq!(result.get_pixel(200, 150), &Pixel([255, 255, 255, 255]));
        assert_eq!(result.get_pixel(200, 450), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn retina_output_doubles_geometry() {
        let image = white(1600, 1200);
        let mapper = CoordinateMapper::new(vec2(800.0, 600.0), vec2(400.0, 300.0), vec2(1600.0, 1200.0));
        let objects = vec![rect_object(
            UiRect::from_min_size(Pos2::new(100.0, 100.0), vec2(200.0, 100.0)),
            0.0,
        )];
        let result = flatten(&image, &objects, &mapper, None).expect("flatten should succeed");
        assert!(is_reddish(result.get_pixel(400, 200)));
        // Width 4 author units is 8 pixels, so 3 px off the edge is still inked.
        assert!(is_reddish(result.get_pixel(400, 203)));
        assert_eq!(result.get_pixel(400, 300), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn rotated_rect_is_rotated_before_flipping() {
        let image = white(400, 400);
        let rect = UiRect::from_center_size(Pos2::new(200.0, 200.0), vec2(200.0, 40.0));
        let objects = vec![rect_object(rect, std::f32::consts::FRAC_PI_2)];
        let result = flatten(&image, &objects, &unit_mapper(400.0, 400.0), None)
            .expect("flatten should succeed");
        // After a quarter turn the long edges run vertically at x = 180 and 220.
        assert!(is_reddish(result.get_pixel(180, 200)));
        assert!(is_reddish(result.get_pixel(220, 150)));
        assert_eq!(result.get_pixel(120, 180), &Pixel([255, 255, 255, 255]));
    }

    fn pixel_at(image: &RgbaImage, point: Pos2) -> &Pixel<u8> {
        image.get_pixel(point.x.floor() as u32, point.y.floor() as u32)
    }

    fn toward(point: Pos2, center: Pos2, t: f32) -> Pos2 {
        point + (center - point) * t
    }

    #[test]
    fn rect_at_thirty_degrees_turns_clockwise() {
        let angle = std::f32::consts::FRAC_PI_6;
        let image = white(400, 300);
        let rect = UiRect::from_center_size(Pos2::new(200.0, 150.0), vec2(200.0, 40.0));
        let objects = vec![rect_object(rect, angle)];
        let result = flatten(&image, &objects, &unit_mapper(400.0, 300.0), None)
            .expect("flatten should succeed");

        for corner in rotated_corners(rect, angle) {
            assert!(is_reddish(pixel_at(&result, corner)), "corner {corner:?}");
        }
        // A sign slip would put the corners here instead.
        for corner in rotated_corners(rect, -angle) {
            assert_eq!(pixel_at(&result, corner), &Pixel([255, 255, 255, 255]));
        }
    }

    #[test]
    fn rotated_pasted_image_keeps_its_top_left_at_the_first_corner() {
        let angle = std::f32::consts::FRAC_PI_6;
        let image = white(400, 300);
        let source = RgbaImage::from_fn(20, 20, |x, y| {
            if x < 10 && y < 10 {
                Pixel([255, 0, 0, 255])
            } else {
                Pixel([0, 0, 255, 255])
            }
        });
        let rect = UiRect::from_center_size(Pos2::new(200.0, 150.0), vec2(100.0, 100.0));
        let objects = vec![Annotation {
            id: 7,
            color: [0, 0, 0, 255],
            kind: AnnotationKind::PastedImage {
                rect,
                bitmap: Arc::new(source),
                rotation: angle,
            },
        }];
        let result = flatten(&image, &objects, &unit_mapper(400.0, 300.0), None)
            .expect("flatten should succeed");

        let samples = rotated_corners(rect, angle).map(|c| toward(c, rect.center(), 0.2));
        let red = pixel_at(&result, samples[0]);
        assert!(red[0] > 180 && red[2] < 100, "first corner {red:?}");
        for sample in &samples[1..] {
            let blue = pixel_at(&result, *sample);
            assert!(blue[2] > 180 && blue[0] < 100, "at {sample:?}: {blue:?}");
        }
    }

    #[test]
    fn rotated_text_background_follows_the_box() {
        let angle = std::f32::consts::FRAC_PI_6;
        let green = Pixel([0, 200, 0, 255]);
        let image = white(400, 300);
        let rect = UiRect::from_center_size(Pos2::new(200.0, 150.0), vec2(80.0, 30.0));
        let objects = vec![Annotation {
            id: 8,
            color: [0, 0, 0, 255],
            kind: AnnotationKind::Text {
                rect,
                content: "Note".to_string(),
                font_size: 16.0,
                background: Some([0, 200, 0, 255]),
                rotation: angle,
            },
        }];
        let result = flatten(&image, &objects, &unit_mapper(400.0, 300.0), None)
            .expect("flatten should succeed");

        let padded = rect.expand(BACKGROUND_PADDING);
        for corner in rotated_corners(padded, angle) {
            let inside = toward(corner, rect.center(), 0.15);
            assert_eq!(pixel_at(&result, inside), &green, "at {inside:?}");
        }
        for corner in rotated_corners(padded, -angle) {
            let mirrored = toward(corner, rect.center(), 0.15);
            assert_eq!(pixel_at(&result, mirrored), &Pixel([255, 255, 255, 255]));
        }
    }

    #[test]
    fn arrow_head_is_filled_and_shaft_stops_at_base() {
        let image = white(400, 400);
        let objects = vec![Annotation {
            id: 2,
            color: RED,
            kind: AnnotationKind::Line {
                from: Pos2::new(100.0, 300.0),
                to: Pos2::new(300.0, 300.0),
                width: 4.0,
                arrow: true,
            },
        }];
        let result = flatten(&image, &objects, &unit_mapper(400.0, 400.0), None)
            .expect("flatten should succeed");
        assert!(is_reddish(result.get_pixel(150, 300)));
        assert!(is_reddish(result.get_pixel(285, 310)));
        assert!(is_reddish(result.get_pixel(285, 290)));
        assert_eq!(result.get_pixel(150, 310), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn highlight_and_badge_fill() {
        let image = white(200, 200);
        let objects = vec![
            Annotation {
                id: 3,
                color: [255, 230, 0, 255],
                kind: AnnotationKind::Highlight {
                    rect: UiRect::from_min_size(Pos2::new(10.0, 10.0), vec2(50.0, 20.0)),
                },
            },
            Annotation {
                id: 4,
                color: RED,
                kind: AnnotationKind::Badge {
                    rect: UiRect::from_min_size(Pos2::new(100.0, 100.0), vec2(40.0, 40.0)),
                    number: 1,
                    text_color: [255, 255, 255, 255],
                },
            },
        ];
        let font = text::load_font(None);
        let result = flatten(&image, &objects, &unit_mapper(200.0, 200.0), font.as_ref())
            .expect("flatten should succeed");
        assert_eq!(result.get_pixel(30, 20), &Pixel([255, 230, 0, 255]));
        assert!(is_reddish(result.get_pixel(106, 120)));
        assert_eq!(result.get_pixel(102, 102), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn text_background_is_padded_outward() {
        let image = white(200, 200);
        let objects = vec![Annotation {
            id: 5,
            color: [0, 0, 0, 255],
            kind: AnnotationKind::Text {
                rect: UiRect::from_min_size(Pos2::new(50.0, 50.0), vec2(80.0, 30.0)),
                content: "Hi".to_string(),
                font_size: 16.0,
                background: Some([0, 200, 0, 255]),
                rotation: 0.0,
            },
        }];
        let result = flatten(&image, &objects, &unit_mapper(200.0, 200.0), None)
            .expect("flatten should succeed");
        assert_eq!(result.get_pixel(46, 46), &Pixel([0, 200, 0, 255]));
        assert_eq!(result.get_pixel(40, 40), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn pasted_image_is_scaled_into_its_rect() {
        let image = white(100, 100);
        let source = RgbaImage::from_pixel(4, 2, Pixel([0, 0, 255, 255]));
        let objects = vec![Annotation {
            id: 6,
            color: [0, 0, 0, 255],
            kind: AnnotationKind::PastedImage {
                rect: UiRect::from_min_size(Pos2::new(10.0, 60.0), vec2(40.0, 20.0)),
                bitmap: Arc::new(source),
                rotation: 0.0,
            },
        }];
        let result = flatten(&image, &objects, &unit_mapper(100.0, 100.0), None)
            .expect("flatten should succeed");
        assert_eq!(result.get_pixel(30, 70), &Pixel([0, 0, 255, 255]));
        assert_eq!(result.get_pixel(30, 30), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn zero_sized_base_is_an_allocation_error() {
        let image = RgbaImage::new(0, 0);
        let err = flatten(&image, &[], &unit_mapper(1.0, 1.0), None).expect_err("no pixmap");
        assert_eq!(err, EditorError::PixmapAllocation { width: 0, height: 0 });
    }
}
