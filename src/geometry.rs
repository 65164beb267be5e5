//! Coordinate algebra shared by the gestures, the live overlay and the
//! rasterizer.
//!
//! Three spaces coexist for an open image:
//!
//! * **author space** – where annotation geometry is stored, top-left origin;
//! * **fitted space** – author space scaled by the current zoom or fit factor,
//!   top-left origin, display only;
//! * **image-pixel space** – the bitmap's pixel grid, bottom-left origin.

use egui::{vec2, Modifiers, Pos2, Rect, Vec2};

/// Converts a fitted-space point into author space.
pub fn to_author(point: Pos2, fitted: Vec2, author: Vec2) -> Pos2 {
    Pos2::new(
        point.x * author.x / fitted.x,
        point.y * author.y / fitted.y,
    )
}

/// Converts an author-space point into fitted space.
pub fn to_fitted(point: Pos2, fitted: Vec2, author: Vec2) -> Pos2 {
    Pos2::new(
        point.x * fitted.x / author.x,
        point.y * fitted.y / author.y,
    )
}

/// Converts a fitted-space point into image pixels, flipping Y.
pub fn to_image_pixel(point: Pos2, fitted: Vec2, pixel: Vec2) -> Pos2 {
    let scale = pixel_scale(fitted, pixel);
    Pos2::new(point.x * scale.x, (fitted.y - point.y) * scale.y)
}

/// Converts a fitted-space rect into image pixels. The returned rect's `min`
/// is the bottom-left corner in pixel space.
pub fn rect_to_image_pixel(rect: Rect, fitted: Vec2, pixel: Vec2) -> Rect {
    let scale = pixel_scale(fitted, pixel);
    let flipped_y = fitted.y - (rect.min.y + rect.height());
    Rect::from_min_size(
        Pos2::new(rect.min.x * scale.x, flipped_y * scale.y),
        vec2(rect.width() * scale.x, rect.height() * scale.y),
    )
}

/// Switches a rect between bottom-left and top-left origin conventions.
pub fn flip_rect_y(rect: Rect, height: f32) -> Rect {
    Rect::from_min_size(
        Pos2::new(rect.min.x, height - (rect.min.y + rect.height())),
        rect.size(),
    )
}

/// Per-axis fitted → pixel scale factors.
pub fn pixel_scale(fitted: Vec2, pixel: Vec2) -> Vec2 {
    vec2(pixel.x / fitted.x, pixel.y / fitted.y)
}

pub fn clamp_point(point: Pos2, bounds: Vec2) -> Pos2 {
    Pos2::new(point.x.clamp(0.0, bounds.x), point.y.clamp(0.0, bounds.y))
}

/// Keeps a rect inside `[0, bounds]`. Oversized rects shrink to the bounds,
/// everything else is shifted back on-canvas with its size kept.
///
/// This does not clamp the origin first and then trim width/height to the far
/// edge: a rect moved past an edge slides back whole instead of losing size.
/// Both forms keep the far edge within the bound and are idempotent.
pub fn clamp_rect(rect: Rect, bounds: Vec2) -> Rect {
    let width = rect.width().clamp(0.0, bounds.x);
    let height = rect.height().clamp(0.0, bounds.y);
    let x = rect.min.x.clamp(0.0, bounds.x - width);
    let y = rect.min.y.clamp(0.0, bounds.y - height);
    Rect::from_min_size(Pos2::new(x, y), vec2(width, height))
}

/// Largest size with `content`'s aspect ratio that fits inside `viewport`.
pub fn fit_within(content: Vec2, viewport: Vec2) -> Vec2 {
    if content.x <= 0.0 || content.y <= 0.0 {
        return viewport;
    }
    let scale = (viewport.x / content.x).min(viewport.y / content.y);
    content * scale.max(f32::EPSILON)
}

/// Rotation snapping granularity chosen by the held modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapIncrement {
    Degrees1,
    Degrees5,
    Degrees15,
}

impl SnapIncrement {
    /// Shift snaps to 15°, Option/Alt to 5°, Command/Ctrl to 1°.
    pub fn from_modifiers(modifiers: &Modifiers) -> Option<Self> {
        if modifiers.shift {
            Some(Self::Degrees15)
        } else if modifiers.alt {
            Some(Self::Degrees5)
        } else if modifiers.command || modifiers.ctrl {
            Some(Self::Degrees1)
        } else {
            None
        }
    }

    pub fn radians(self) -> f32 {
        match self {
            Self::Degrees1 => 1.0_f32.to_radians(),
            Self::Degrees5 => 5.0_f32.to_radians(),
            Self::Degrees15 => 15.0_f32.to_radians(),
        }
    }
}

pub fn snap_angle(angle: f32, increment: Option<SnapIncrement>) -> f32 {
    match increment {
        Some(step) => {
            let step = step.radians();
            (angle / step).round() * step
        }
        None => angle,
    }
}

/// Signed angle from `from` to `to`, wrapped into `[-π, π]`.
pub fn normalized_angle_delta(from: f32, to: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut delta = (to - from) % TAU;
    if delta > PI {
        delta -= TAU;
    } else if delta < -PI {
        delta += TAU;
    }
    delta
}

/// Angle of `point` around `center`, measured in the Y-down author frame.
pub fn pointer_angle(center: Pos2, point: Pos2) -> f32 {
    (point.y - center.y).atan2(point.x - center.x)
}

/// Rotates `point` about `center`. Positive angles turn clockwise on screen.
pub fn rotate_point(point: Pos2, center: Pos2, angle: f32) -> Pos2 {
    if angle == 0.0 {
        return point;
    }
    let (sin, cos) = angle.sin_cos();
    let d = point - center;
    Pos2::new(
        center.x + d.x * cos - d.y * sin,
        center.y + d.x * sin + d.y * cos,
    )
}

/// Corners of `rect` rotated about its centre: top-left, top-right,
/// bottom-right, bottom-left.
pub fn rotated_corners(rect: Rect, angle: f32) -> [Pos2; 4] {
    let center = rect.center();
    [
        rect.left_top(),
        rect.right_top(),
        rect.right_bottom(),
        rect.left_bottom(),
    ]
    .map(|corner| rotate_point(corner, center, angle))
}

/// Snaps a line end to horizontal, vertical or 45° relative to `start`.
pub fn constrain_line_end(start: Pos2, end: Pos2) -> Pos2 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let (adx, ady) = (dx.abs(), dy.abs());
    if ady <= adx * 22.5_f32.to_radians().tan() {
        Pos2::new(end.x, start.y)
    } else if ady >= adx * 67.5_f32.to_radians().tan() {
        Pos2::new(start.x, end.y)
    } else {
        let side = (adx + ady) * 0.5;
        Pos2::new(start.x + side * dx.signum(), start.y + side * dy.signum())
    }
}

pub fn distance_to_segment(point: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = point - a;
    let ab_len_sq = ab.length_sq();
    if ab_len_sq <= f32::EPSILON {
        return ap.length();
    }
    let t = (ap.dot(ab) / ab_len_sq).clamp(0.0, 1.0);
    let projection = a + ab * t;
    (point - projection).length()
}

pub const ARROW_MIN_HEAD: f32 = 16.0;
pub const ARROW_MAX_HEAD: f32 = 280.0;

/// Arrowhead triangle plus the shortened shaft end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArrowGeometry {
    pub shaft_end: Pos2,
    pub tip: Pos2,
    pub left: Pos2,
    pub right: Pos2,
    pub head_length: f32,
}

/// Computes the arrowhead for a segment in whatever space the inputs live in.
///
/// `unit` is the size of one author unit in that space, so the fixed minimum
/// and maximum head lengths scale along with the geometry. Returns `None` for
/// zero-length segments.
pub fn arrow_geometry(from: Pos2, to: Pos2, stroke_width: f32, unit: f32) -> Option<ArrowGeometry> {
    let direction = to - from;
    let length = direction.length();
    if length <= f32::EPSILON {
        return None;
    }
    let unit_dir = direction / length;
    let upper = (length * 0.35).min(ARROW_MAX_HEAD * unit);
    let head_length = (ARROW_MIN_HEAD * unit).max(stroke_width * 6.0).min(upper);
    let half_width = head_length * 0.9;
    let base = to - unit_dir * head_length;
    let normal = vec2(-unit_dir.y, unit_dir.x);
    Some(ArrowGeometry {
        shaft_end: base,
        tip: to,
        left: base + normal * half_width,
        right: base - normal * half_width,
        head_length,
    })
}

/// A fully resolved mapping for one image at one layout pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    pub author: Vec2,
    pub fitted: Vec2,
    pub pixel: Vec2,
}

impl CoordinateMapper {
    pub fn new(author: Vec2, fitted: Vec2, pixel: Vec2) -> Self {
        Self {
            author,
            fitted,
            pixel,
        }
    }

    pub fn to_author(&self, fitted_point: Pos2) -> Pos2 {
        to_author(fitted_point, self.fitted, self.author)
    }

    pub fn to_fitted(&self, author_point: Pos2) -> Pos2 {
        to_fitted(author_point, self.fitted, self.author)
    }

    pub fn rect_to_fitted(&self, rect: Rect) -> Rect {
        Rect::from_min_max(self.to_fitted(rect.min), self.to_fitted(rect.max))
    }

    /// Author point → image pixel (bottom-left origin).
    pub fn to_pixel(&self, author_point: Pos2) -> Pos2 {
        to_image_pixel(self.to_fitted(author_point), self.fitted, self.pixel)
    }

    /// Author rect → image pixel rect (bottom-left origin).
    pub fn rect_to_pixel(&self, rect: Rect) -> Rect {
        rect_to_image_pixel(self.rect_to_fitted(rect), self.fitted, self.pixel)
    }

    /// Average author → fitted factor.
    pub fn zoom(&self) -> f32 {
        (self.fitted.x / self.author.x + self.fitted.y / self.author.y) * 0.5
    }

    /// Average fitted → pixel factor, used for stroke widths and font sizes.
    pub fn stroke_scale(&self) -> f32 {
        let scale = pixel_scale(self.fitted, self.pixel);
        (scale.x + scale.y) * 0.5
    }

    /// Length of one author unit in image pixels.
    pub fn author_unit_in_pixels(&self) -> f32 {
        self.zoom() * self.stroke_scale()
    }
}
