use std::sync::Arc;

use egui::{vec2, Color32, Pos2, Rect, Vec2};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::geometry::{
    clamp_point, clamp_rect, distance_to_segment, rotate_point, rotated_corners,
};

pub type AnnotationId = u64;
pub type Rgba = [u8; 4];

/// Corner hot-zone radius in author units.
pub const HANDLE_RADIUS: f32 = 8.0;
/// Distance of the rotate handle from the top-right corner, along each axis.
pub const ROTATE_HANDLE_OFFSET: f32 = 20.0;
/// Smallest width/height (or line length) a resize may produce.
pub const MIN_SIZE: f32 = 2.0;
const LINE_HIT_TOLERANCE: f32 = 6.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tool {
    Pointer,
    Line,
    Rect,
    Oval,
    Text,
    Badge,
    Highlight,
    Crop,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrokeWidth {
    Thin,
    Medium,
    Thick,
}

impl StrokeWidth {
    pub fn px(self) -> f32 {
        match self {
            Self::Thin => 2.0,
            Self::Medium => 4.0,
            Self::Thick => 8.0,
        }
    }
}

/// Font size in points, clamped to the range the editor offers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct TextSize(f32);

impl TextSize {
    pub const MIN: f32 = 8.0;
    pub const MAX: f32 = 96.0;
    pub const DEFAULT: Self = Self(18.0);

    pub fn from_points(points: f32) -> Self {
        if points.is_finite() {
            Self(points.clamp(Self::MIN, Self::MAX))
        } else {
            Self::DEFAULT
        }
    }

    pub fn points(self) -> f32 {
        self.0
    }
}

impl From<f32> for TextSize {
    fn from(value: f32) -> Self {
        Self::from_points(value)
    }
}

impl From<TextSize> for f32 {
    fn from(value: TextSize) -> Self {
        value.0
    }
}

/// Manipulation affordance under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Handle {
    #[default]
    None,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Rotate,
    LineStart,
    LineEnd,
}

impl Handle {
    pub fn is_none(self) -> bool {
        self == Handle::None
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Stroke color, text color, or fill for badges and highlights.
    pub color: Rgba,
    pub kind: AnnotationKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationKind {
    Line {
        from: Pos2,
        to: Pos2,
        width: f32,
        arrow: bool,
    },
    Rect {
        rect: Rect,
        width: f32,
        rotation: f32,
    },
    Oval {
        rect: Rect,
        width: f32,
    },
    Text {
        rect: Rect,
        content: String,
        font_size: f32,
        background: Option<Rgba>,
        rotation: f32,
    },
    Badge {
        rect: Rect,
        number: u32,
        text_color: Rgba,
    },
    Highlight {
        rect: Rect,
    },
    PastedImage {
        rect: Rect,
        bitmap: Arc<RgbaImage>,
        rotation: f32,
    },
}

pub fn color32(rgba: Rgba) -> Color32 {
    Color32::from_rgba_unmultiplied(rgba[0], rgba[1], rgba[2], rgba[3])
}

impl Annotation {
    pub fn color32(&self) -> Color32 {
        color32(self.color)
    }

    /// The stored rect for every variant except Line.
    pub fn rect(&self) -> Option<Rect> {
        match &self.kind {
            AnnotationKind::Line { .. } => None,
            AnnotationKind::Rect { rect, .. }
            | AnnotationKind::Oval { rect, .. }
            | AnnotationKind::Text { rect, .. }
            | AnnotationKind::Badge { rect, .. }
            | AnnotationKind::Highlight { rect }
            | AnnotationKind::PastedImage { rect, .. } => Some(*rect),
        }
    }

    fn rect_mut(&mut self) -> Option<&mut Rect> {
        match &mut self.kind {
            AnnotationKind::Line { .. } => None,
            AnnotationKind::Rect { rect, .. }
            | AnnotationKind::Oval { rect, .. }
            | AnnotationKind::Text { rect, .. }
            | AnnotationKind::Badge { rect, .. }
            | AnnotationKind::Highlight { rect }
            | AnnotationKind::PastedImage { rect, .. } => Some(rect),
        }
    }

    pub fn rotation(&self) -> f32 {
        match &self.kind {
            AnnotationKind::Rect { rotation, .. }
            | AnnotationKind::Text { rotation, .. }
            | AnnotationKind::PastedImage { rotation, .. } => *rotation,
            AnnotationKind::Line { .. }
            | AnnotationKind::Oval { .. }
            | AnnotationKind::Badge { .. }
            | AnnotationKind::Highlight { .. } => 0.0,
        }
    }

    pub fn is_rotatable(&self) -> bool {
        matches!(
            self.kind,
            AnnotationKind::Rect { .. }
                | AnnotationKind::Text { .. }
                | AnnotationKind::PastedImage { .. }
        )
    }

    /// Whether this object belongs to the given creation tool.
    pub fn matches_tool(&self, tool: Tool) -> bool {
        match tool {
            Tool::Pointer => true,
            Tool::Crop => false,
            Tool::Line => matches!(self.kind, AnnotationKind::Line { .. }),
            Tool::Rect => matches!(self.kind, AnnotationKind::Rect { .. }),
            Tool::Oval => matches!(self.kind, AnnotationKind::Oval { .. }),
            Tool::Text => matches!(self.kind, AnnotationKind::Text { .. }),
            Tool::Badge => matches!(self.kind, AnnotationKind::Badge { .. }),
            Tool::Highlight => matches!(self.kind, AnnotationKind::Highlight { .. }),
        }
    }

    /// Axis-aligned bounds in author space, rotation included.
    pub fn bounds(&self) -> Rect {
        match &self.kind {
            AnnotationKind::Line { from, to, width, .. } => {
                Rect::from_two_pos(*from, *to).expand(width * 0.5)
            }
            _ => {
                let rect = self.rect().unwrap_or(Rect::NOTHING);
                let rotation = self.rotation();
                if rotation == 0.0 {
                    return rect;
                }
                let corners = rotated_corners(rect, rotation);
                Rect::from_points(&corners)
            }
        }
    }

    /// Point-in-shape test in author space.
    pub fn hit_test(&self, point: Pos2) -> bool {
        match &self.kind {
            AnnotationKind::Line { from, to, width, .. } => {
                distance_to_segment(point, *from, *to) <= width * 0.5 + LINE_HIT_TOLERANCE
            }
            AnnotationKind::Oval { rect, .. } => {
                let radii = rect.size() * 0.5;
                if radii.x <= f32::EPSILON || radii.y <= f32::EPSILON {
                    return false;
                }
                let d = point - rect.center();
                let nx = d.x / radii.x;
                let ny = d.y / radii.y;
                nx * nx + ny * ny <= 1.0
            }
            AnnotationKind::Rect { rect, rotation, .. }
            | AnnotationKind::Text { rect, rotation, .. }
            | AnnotationKind::PastedImage { rect, rotation, .. } => {
                rect.contains(rotate_point(point, rect.center(), -rotation))
            }
            AnnotationKind::Badge { rect, .. } | AnnotationKind::Highlight { rect } => {
                rect.contains(point)
            }
        }
    }

    /// Every handle this object exposes with its author-space position.
    pub fn handles(&self) -> Vec<(Handle, Pos2)> {
        match &self.kind {
            AnnotationKind::Line { from, to, .. } => {
                vec![(Handle::LineStart, *from), (Handle::LineEnd, *to)]
            }
            _ => {
                let Some(rect) = self.rect() else {
                    return Vec::new();
                };
                let rotation = self.rotation();
                let [tl, tr, br, bl] = rotated_corners(rect, rotation);
                let mut handles = vec![
                    (Handle::TopLeft, tl),
                    (Handle::TopRight, tr),
                    (Handle::BottomRight, br),
                    (Handle::BottomLeft, bl),
                ];
                if self.is_rotatable() {
                    handles.push((Handle::Rotate, rotate_handle_position(rect, rotation)));
                }
                handles
            }
        }
    }

    /// Returns the handle under `point`, or [`Handle::None`].
    pub fn handle_hit_test(&self, point: Pos2) -> Handle {
        let within = |p: Pos2| (p - point).length() <= HANDLE_RADIUS;
        match &self.kind {
            AnnotationKind::Line { from, to, .. } => {
                if within(*to) {
                    Handle::LineEnd
                } else if within(*from) {
                    Handle::LineStart
                } else {
                    Handle::None
                }
            }
            _ => {
                // Rotate first: its hot zone sits outside the corner zones.
                let handles = self.handles();
                handles
                    .iter()
                    .find(|(handle, p)| *handle == Handle::Rotate && within(*p))
                    .or_else(|| handles.iter().find(|(_, p)| within(*p)))
                    .map(|(handle, _)| *handle)
                    .unwrap_or(Handle::None)
            }
        }
    }

    pub fn moved(&self, delta: Vec2) -> Self {
        let mut next = self.clone();
        match &mut next.kind {
            AnnotationKind::Line { from, to, .. } => {
                *from += delta;
                *to += delta;
            }
            _ => {
                if let Some(rect) = next.rect_mut() {
                    *rect = rect.translate(delta);
                }
            }
        }
        next
    }

    /// Moves by `delta`, shortening the step so the object stays on-canvas.
    pub fn moved_within(&self, delta: Vec2, bounds: Vec2) -> Self {
        match &self.kind {
            AnnotationKind::Line { from, to, .. } => {
                let extent = Rect::from_two_pos(*from, *to);
                let clamped = vec2(
                    clamp_step(delta.x, -extent.min.x, bounds.x - extent.max.x),
                    clamp_step(delta.y, -extent.min.y, bounds.y - extent.max.y),
                );
                self.moved(clamped)
            }
            _ => self.moved(delta).clamped(bounds),
        }
    }

    /// Keeps the object inside the canvas. Rotated objects are left alone.
    pub fn clamped(&self, bounds: Vec2) -> Self {
        let mut next = self.clone();
        match &mut next.kind {
            AnnotationKind::Line { from, to, .. } => {
                *from = clamp_point(*from, bounds);
                *to = clamp_point(*to, bounds);
            }
            _ => {
                if self.rotation() == 0.0 {
                    if let Some(rect) = next.rect_mut() {
                        *rect = clamp_rect(*rect, bounds);
                    }
                }
            }
        }
        next
    }

    /// Drags `handle` to `to`, keeping the opposite corner or endpoint fixed.
    pub fn resizing(&self, handle: Handle, to: Pos2) -> Self {
        let mut next = self.clone();
        match &mut next.kind {
            AnnotationKind::Line { from, to: end, .. } => match handle {
                Handle::LineStart => *from = min_length_point(*end, to),
                Handle::LineEnd => *end = min_length_point(*from, to),
                _ => {}
            },
            _ => {
                let rotation = self.rotation();
                if let Some(rect) = next.rect_mut() {
                    *rect = resize_rect(*rect, rotation, handle, to);
                }
            }
        }
        next
    }

    /// Sets an absolute rotation. Non-rotatable variants are returned as is.
    pub fn with_rotation(&self, angle: f32) -> Self {
        let mut next = self.clone();
        match &mut next.kind {
            AnnotationKind::Rect { rotation, .. }
            | AnnotationKind::Text { rotation, .. }
            | AnnotationKind::PastedImage { rotation, .. } => *rotation = angle,
            AnnotationKind::Line { .. }
            | AnnotationKind::Oval { .. }
            | AnnotationKind::Badge { .. }
            | AnnotationKind::Highlight { .. } => {}
        }
        next
    }

    pub fn rotation_center(&self) -> Pos2 {
        match &self.kind {
            AnnotationKind::Line { from, to, .. } => Rect::from_two_pos(*from, *to).center(),
            _ => self.rect().map(|r| r.center()).unwrap_or(Pos2::ZERO),
        }
    }
}

pub fn rotate_handle_position(rect: Rect, rotation: f32) -> Pos2 {
    let local = Pos2::new(
        rect.max.x + ROTATE_HANDLE_OFFSET,
        rect.min.y - ROTATE_HANDLE_OFFSET,
    );
    rotate_point(local, rect.center(), rotation)
}

/// Objects already larger than the canvas do not move on that axis.
fn clamp_step(step: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        0.0
    } else {
        step.clamp(lo, hi)
    }
}

fn min_length_point(anchor: Pos2, target: Pos2) -> Pos2 {
    let d = target - anchor;
    let len = d.length();
    if len >= MIN_SIZE {
        target
    } else if len <= f32::EPSILON {
        anchor + vec2(MIN_SIZE, 0.0)
    } else {
        anchor + d / len * MIN_SIZE
    }
}

fn resize_rect(rect: Rect, rotation: f32, handle: Handle, to: Pos2) -> Rect {
    let (anchor, outward) = match handle {
        Handle::TopLeft => (rect.right_bottom(), vec2(-1.0, -1.0)),
        Handle::TopRight => (rect.left_bottom(), vec2(1.0, -1.0)),
        Handle::BottomLeft => (rect.right_top(), vec2(-1.0, 1.0)),
        Handle::BottomRight => (rect.left_top(), vec2(1.0, 1.0)),
        Handle::None | Handle::Rotate | Handle::LineStart | Handle::LineEnd => return rect,
    };

    let center = rect.center();
    let local = rotate_point(to, center, -rotation);
    let span = |d: f32, fallback: f32| {
        if d.abs() >= MIN_SIZE {
            d
        } else if d == 0.0 {
            MIN_SIZE * fallback
        } else {
            MIN_SIZE * d.signum()
        }
    };
    let far = Pos2::new(
        anchor.x + span(local.x - anchor.x, outward.x),
        anchor.y + span(local.y - anchor.y, outward.y),
    );
    let resized = Rect::from_two_pos(anchor, far);
    if rotation == 0.0 {
        return resized;
    }
    // The anchor is fixed on screen, so move the centre through the rotation.
    let world_center = rotate_point(resized.center(), center, rotation);
    Rect::from_center_size(world_center, resized.size())
}
