//! Live on-screen overlay in fitted coordinates.
//!
//! Vector parts are epaint [`Shape`]s. Text and bitmaps need the host's font
//! and texture machinery, so they are emitted as [`TextRun`] and [`ImageRun`]
//! placements, interleaved with the shapes in paint order.

use std::sync::Arc;

use egui::{vec2, Color32, Pos2, Rect, Shape, Stroke};
use image::RgbaImage;

use crate::annotation::{color32, rotate_handle_position, Annotation, AnnotationId, AnnotationKind};
use crate::geometry::{arrow_geometry, rotated_corners, CoordinateMapper};
use crate::gesture::DragMode;
use crate::state::EditorState;
use crate::text::{BACKGROUND_PADDING, TEXT_INSET};

const SELECTION_COLOR: Color32 = Color32::from_rgb(77, 141, 255);
const HANDLE_SIZE: f32 = 9.0;
const CROP_MASK: Color32 = Color32::from_rgba_premultiplied(0, 0, 0, 110);
const ELLIPSE_SEGMENTS: usize = 56;

#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub annotation_id: Option<AnnotationId>,
    /// Unrotated layout box.
    pub rect: Rect,
    pub text: String,
    pub font_size: f32,
    pub color: Color32,
    /// Clockwise, about the centre of `rect`.
    pub angle: f32,
    pub inset: f32,
    pub centered: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRun {
    pub annotation_id: AnnotationId,
    /// Top-left, top-right, bottom-right, bottom-left.
    pub corners: [Pos2; 4],
    pub bitmap: Arc<RgbaImage>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverlayItem {
    Shape(Shape),
    Text(TextRun),
    Image(ImageRun),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayFrame {
    pub items: Vec<OverlayItem>,
}

impl OverlayFrame {
    fn shape(&mut self, shape: Shape) {
        self.items.push(OverlayItem::Shape(shape));
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.items.iter().filter_map(|item| match item {
            OverlayItem::Shape(shape) => Some(shape),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextRun> {
        self.items.iter().filter_map(|item| match item {
            OverlayItem::Text(run) => Some(run),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRun> {
        self.items.iter().filter_map(|item| match item {
            OverlayItem::Image(run) => Some(run),
            _ => None,
        })
    }
}

impl EditorState {
    /// Everything drawn above the base image, in fitted coordinates with the
    /// canvas origin at (0, 0).
    pub fn overlay(&self) -> OverlayFrame {
        let mut frame = OverlayFrame::default();
        let (Some(mapper), Some(bounds)) = (self.mapper(), self.author_size()) else {
            return frame;
        };
        let editing = self.text_edit.as_ref().map(|edit| edit.annotation_id);

        for object in self.scene.objects() {
            // The host draws its own text field over the box being edited.
            let skip_text = editing == Some(object.id);
            draw_annotation(&mut frame, object, &mapper, false, skip_text);
        }

        if let Some(drag) = self.drag.as_ref().filter(|d| d.mode == DragMode::Draw) {
            if let Some(kind) = self.draft_kind(drag, bounds) {
                let draft = Annotation {
                    id: 0,
                    color: self.tool_color(drag.tool),
                    kind,
                };
                draw_annotation(&mut frame, &draft, &mapper, true, false);
            }
        }

        if let Some(object) = self.scene.selected_object() {
            draw_selection(&mut frame, object, &mapper);
        }

        if let Some(crop) = self.crop.rect {
            draw_crop(&mut frame, mapper.rect_to_fitted(crop), mapper.fitted);
        }

        frame
    }
}

fn draw_annotation(
    frame: &mut OverlayFrame,
    object: &Annotation,
    mapper: &CoordinateMapper,
    preview: bool,
    skip_text: bool,
) {
    let zoom = mapper.zoom();
    let mut color = object.color32();
    if preview {
        color = color.linear_multiply(0.7);
    }
    let fitted = |p: Pos2| mapper.to_fitted(p);
    let stroke = |width: f32| Stroke::new((width * zoom).max(1.0), color);

    match &object.kind {
        AnnotationKind::Line {
            from,
            to,
            width,
            arrow,
        } => {
            let (from, to) = (fitted(*from), fitted(*to));
            let head = if *arrow {
                arrow_geometry(from, to, *width * zoom, zoom)
            } else {
                None
            };
            match head {
                Some(head) => {
                    frame.shape(Shape::line_segment([from, head.shaft_end], stroke(*width)));
                    frame.shape(Shape::convex_polygon(
                        vec![head.tip, head.left, head.right],
                        color,
                        Stroke::NONE,
                    ));
                }
                None => frame.shape(Shape::line_segment([from, to], stroke(*width))),
            }
        }
        AnnotationKind::Rect {
            rect,
            width,
            rotation,
        } => {
            if *rotation == 0.0 {
                frame.shape(Shape::rect_stroke(
                    mapper.rect_to_fitted(*rect),
                    0.0,
                    stroke(*width),
                ));
            } else {
                let corners = rotated_corners(*rect, *rotation).map(fitted);
                frame.shape(Shape::closed_line(corners.to_vec(), stroke(*width)));
            }
        }
        AnnotationKind::Oval { rect, width } => {
            let points = ellipse_polyline(mapper.rect_to_fitted(*rect), ELLIPSE_SEGMENTS);
            frame.shape(Shape::closed_line(points, stroke(*width)));
        }
        AnnotationKind::Highlight { rect } => {
            frame.shape(Shape::rect_filled(mapper.rect_to_fitted(*rect), 0.0, color));
        }
        AnnotationKind::Badge {
            rect,
            number,
            text_color,
        } => {
            let rect = mapper.rect_to_fitted(*rect);
            let points = ellipse_polyline(rect, ELLIPSE_SEGMENTS);
            frame.shape(Shape::convex_polygon(points, color, Stroke::NONE));
            frame.items.push(OverlayItem::Text(TextRun {
                annotation_id: Some(object.id),
                rect,
                text: number.to_string(),
                font_size: 0.6 * rect.width().min(rect.height()),
                color: color32(*text_color),
                angle: 0.0,
                inset: 0.0,
                centered: true,
            }));
        }
        AnnotationKind::Text {
            rect,
            content,
            font_size,
            background,
            rotation,
        } => {
            if let Some(background) = background {
                let padded = rect.expand(BACKGROUND_PADDING);
                let fill = color32(*background);
                if *rotation == 0.0 {
                    frame.shape(Shape::rect_filled(mapper.rect_to_fitted(padded), 0.0, fill));
                } else {
                    let corners = rotated_corners(padded, *rotation).map(fitted);
                    frame.shape(Shape::convex_polygon(corners.to_vec(), fill, Stroke::NONE));
                }
            }
            if !skip_text && !content.is_empty() {
                frame.items.push(OverlayItem::Text(TextRun {
                    annotation_id: Some(object.id),
                    rect: mapper.rect_to_fitted(*rect),
                    text: content.clone(),
                    font_size: font_size * zoom,
                    color,
                    angle: *rotation,
                    inset: TEXT_INSET * zoom,
                    centered: false,
                }));
            }
            if preview {
                frame.shape(Shape::rect_stroke(
                    mapper.rect_to_fitted(*rect),
                    0.0,
                    Stroke::new(1.0, color),
                ));
            }
        }
        AnnotationKind::PastedImage {
            rect,
            bitmap,
            rotation,
        } => {
            frame.items.push(OverlayItem::Image(ImageRun {
                annotation_id: object.id,
                corners: rotated_corners(*rect, *rotation).map(fitted),
                bitmap: Arc::clone(bitmap),
            }));
        }
    }
}

fn draw_selection(frame: &mut OverlayFrame, object: &Annotation, mapper: &CoordinateMapper) {
    let outline = Stroke::new(1.8, SELECTION_COLOR);
    let fitted = |p: Pos2| mapper.to_fitted(p);

    match (&object.kind, object.rect()) {
        (AnnotationKind::Line { .. }, _) | (_, None) => {
            frame.shape(Shape::rect_stroke(
                mapper.rect_to_fitted(object.bounds()),
                0.0,
                Stroke::new(1.0, SELECTION_COLOR),
            ));
        }
        (_, Some(rect)) => {
            let corners = rotated_corners(rect, object.rotation()).map(fitted);
            frame.shape(Shape::closed_line(corners.to_vec(), outline));
            if object.is_rotatable() {
                let knob = fitted(rotate_handle_position(rect, object.rotation()));
                frame.shape(Shape::line_segment(
                    [corners[1], knob],
                    Stroke::new(1.0, SELECTION_COLOR),
                ));
            }
        }
    }

    for (_, point) in object.handles() {
        let center = fitted(point);
        frame.shape(Shape::rect_filled(
            Rect::from_center_size(center, vec2(HANDLE_SIZE, HANDLE_SIZE)),
            4.0,
            SELECTION_COLOR,
        ));
        frame.shape(Shape::rect_stroke(
            Rect::from_center_size(center, vec2(HANDLE_SIZE, HANDLE_SIZE)),
            4.0,
            Stroke::new(1.0, Color32::from_rgba_unmultiplied(255, 255, 255, 200)),
        ));
    }
}

/// Dims everything outside `crop` and outlines it with corner handles.
fn draw_crop(frame: &mut OverlayFrame, crop: Rect, canvas: egui::Vec2) {
    let canvas = Rect::from_min_size(Pos2::ZERO, canvas);
    let bands = [
        Rect::from_min_max(canvas.min, Pos2::new(canvas.max.x, crop.min.y)),
        Rect::from_min_max(Pos2::new(canvas.min.x, crop.max.y), canvas.max),
        Rect::from_min_max(Pos2::new(canvas.min.x, crop.min.y), Pos2::new(crop.min.x, crop.max.y)),
        Rect::from_min_max(Pos2::new(crop.max.x, crop.min.y), Pos2::new(canvas.max.x, crop.max.y)),
    ];
    for band in bands.into_iter().filter(|band| band.is_positive()) {
        frame.shape(Shape::rect_filled(band, 0.0, CROP_MASK));
    }
    frame.shape(Shape::rect_stroke(crop, 0.0, Stroke::new(1.5, Color32::WHITE)));
    for corner in [crop.left_top(), crop.right_top(), crop.right_bottom(), crop.left_bottom()] {
        frame.shape(Shape::rect_filled(
            Rect::from_center_size(corner, vec2(HANDLE_SIZE, HANDLE_SIZE)),
            2.0,
            Color32::WHITE,
        ));
    }
}

fn ellipse_polyline(rect: Rect, segments: usize) -> Vec<Pos2> {
    let center = rect.center();
    let rx = rect.width() * 0.5;
    let ry = rect.height() * 0.5;
    (0..segments)
        .map(|i| {
            let t = (i as f32 / segments as f32) * std::f32::consts::TAU;
            Pos2::new(center.x + rx * t.cos(), center.y + ry * t.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use egui::Modifiers;
    use image::RgbaImage;

    use super::*;
    use crate::annotation::Tool;
    use crate::gesture::PointerEvent;
    use crate::settings::EditorSettings;

    fn editor() -> EditorState {
        let mut state = EditorState::with_settings(EditorSettings::default());
        state.load_image(RgbaImage::new(800, 600), 1.0);
        state
    }

    #[test]
    fn empty_editor_draws_nothing() {
        let state = EditorState::with_settings(EditorSettings::default());
        assert!(state.overlay().items.is_empty());
    }

    #[test]
    fn draft_preview_follows_the_drag() {
        let mut state = editor();
        state.set_tool(Tool::Rect);
        state.drag_started(PointerEvent::new(Pos2::new(100.0, 100.0), 0.0));
        state.drag_changed(PointerEvent::new(Pos2::new(300.0, 200.0), 0.1));

        let frame = state.overlay();
        let drawn = frame.shapes().any(|shape| {
            matches!(shape, Shape::Rect(r)
                if r.rect == Rect::from_min_max(Pos2::new(100.0, 100.0), Pos2::new(300.0, 200.0)))
        });
        assert!(drawn);
        assert!(state.scene.is_empty());
    }

    #[test]
    fn shapes_scale_with_zoom() {
        let mut state = editor();
        state.set_zoom(0.5);
        state.set_tool(Tool::Highlight);
        // Pointer positions are fitted, so this covers author (100,100)-(300,200).
        state.drag_started(PointerEvent::new(Pos2::new(50.0, 50.0), 0.0));
        state.drag_ended(
            PointerEvent::new(Pos2::new(150.0, 100.0), 0.1).with_modifiers(Modifiers::NONE),
        );
        state.scene.select(None);

        let frame = state.overlay();
        let first = frame.shapes().next();
        assert!(matches!(first, Some(Shape::Rect(r))
            if r.rect == Rect::from_min_max(Pos2::new(50.0, 50.0), Pos2::new(150.0, 100.0))));
    }

    #[test]
    fn selected_rect_shows_four_corners_and_rotate_knob() {
        let mut state = editor();
        state.set_tool(Tool::Rect);
        state.drag_started(PointerEvent::new(Pos2::new(100.0, 100.0), 0.0));
        state.drag_ended(PointerEvent::new(Pos2::new(300.0, 200.0), 0.1));

        let frame = state.overlay();
        let handles = frame
            .shapes()
            .filter(|shape| {
                matches!(shape, Shape::Rect(r)
                    if r.rect.width() == HANDLE_SIZE && r.fill == SELECTION_COLOR)
            })
            .count();
        assert_eq!(handles, 5);
    }

    #[test]
    fn selected_line_is_framed_by_its_bounds() {
        let mut state = editor();
        state.set_tool(Tool::Line);
        state.drag_started(PointerEvent::new(Pos2::new(100.0, 100.0), 0.0));
        state.drag_ended(PointerEvent::new(Pos2::new(300.0, 200.0), 0.1));

        let object = state.scene.selected_object().expect("selected line");
        let bounds = object.bounds();
        assert!(bounds.contains(Pos2::new(100.0, 100.0)));
        assert!(bounds.contains(Pos2::new(300.0, 200.0)));

        let frame = state.overlay();
        let framed = frame.shapes().any(|shape| {
            matches!(shape, Shape::Rect(r)
                if r.rect == bounds && r.stroke.color == SELECTION_COLOR)
        });
        assert!(framed);
    }

    #[test]
    fn badge_label_is_a_centred_text_run() {
        let mut state = editor();
        state.set_tool(Tool::Badge);
        state.drag_started(PointerEvent::new(Pos2::new(100.0, 100.0), 0.0));
        state.drag_ended(PointerEvent::new(Pos2::new(100.0, 100.0), 0.1));

        let frame = state.overlay();
        let run = frame.texts().next().expect("badge label");
        assert_eq!(run.text, "1");
        assert!(run.centered);
        assert!((run.font_size - 24.0).abs() < 1e-4);
    }

    #[test]
    fn crop_mask_surrounds_the_crop_rect() {
        let mut state = editor();
        state.set_tool(Tool::Crop);
        state.set_crop_rect(Some(Rect::from_min_max(
            Pos2::new(100.0, 100.0),
            Pos2::new(300.0, 200.0),
        )));
        let frame = state.overlay();
        let masks = frame
            .shapes()
            .filter(|shape| matches!(shape, Shape::Rect(r) if r.fill == CROP_MASK))
            .count();
        assert_eq!(masks, 4);
    }
}
