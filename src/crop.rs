use egui::{Pos2, Rect};
use image::imageops;
use log::{debug, info};

use crate::annotation::{HANDLE_RADIUS, MIN_SIZE};
use crate::error::{EditorError, EditorResult};
use crate::flatten;
use crate::geometry::{clamp_point, flip_rect_y, rect_to_image_pixel};
use crate::state::EditorState;

/// The crop rectangle and the drag shaping it, in author space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropState {
    pub rect: Option<Rect>,
    drag: Option<CropDrag>,
}

/// The fixed corner a crop drag stretches from.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CropDrag {
    anchor: Pos2,
    last_tick: f64,
}

impl CropState {
    /// Corner of the current rect within the handle radius of `point`, as
    /// the opposite corner to anchor on.
    fn opposite_corner(&self, point: Pos2) -> Option<Pos2> {
        let rect = self.rect?;
        [
            (rect.left_top(), rect.right_bottom()),
            (rect.right_top(), rect.left_bottom()),
            (rect.right_bottom(), rect.left_top()),
            (rect.left_bottom(), rect.right_top()),
        ]
        .into_iter()
        .find(|(corner, _)| (*corner - point).length() <= HANDLE_RADIUS)
        .map(|(_, opposite)| opposite)
    }
}

impl EditorState {
    pub fn crop_rect(&self) -> Option<Rect> {
        self.crop.rect
    }

    /// Grabs a corner of the existing crop rect, or starts a new one.
    pub(crate) fn crop_drag_started(&mut self, point: Pos2, time: f64) {
        let anchor = self.crop.opposite_corner(point).unwrap_or(point);
        self.crop.drag = Some(CropDrag {
            anchor,
            last_tick: time,
        });
    }

    /// Throttled like every other drag tick.
    pub(crate) fn crop_drag_changed(&mut self, point: Pos2, time: f64) {
        let interval = self.settings.drag_interval();
        let Some(drag) = self.crop.drag.as_mut() else {
            return;
        };
        if time - drag.last_tick < interval {
            return;
        }
        drag.last_tick = time;
        self.stretch_crop(point);
    }

    fn stretch_crop(&mut self, point: Pos2) {
        let Some(drag) = self.crop.drag else {
            return;
        };
        self.crop.rect = Some(Rect::from_two_pos(drag.anchor, point));
    }

    pub(crate) fn crop_drag_ended(&mut self, point: Pos2) {
        self.stretch_crop(point);
        self.crop.drag = None;
        if let Some(rect) = self.crop.rect {
            if rect.width() < MIN_SIZE || rect.height() < MIN_SIZE {
                debug!("discarding degenerate crop rect {rect:?}");
                self.crop.rect = None;
            }
        }
    }

    /// Replaces the crop rect directly, clamped to the canvas.
    pub fn set_crop_rect(&mut self, rect: Option<Rect>) {
        let Some(bounds) = self.author_size() else {
            return;
        };
        self.crop.rect = rect.map(|rect| {
            Rect::from_two_pos(clamp_point(rect.min, bounds), clamp_point(rect.max, bounds))
        });
    }

    pub fn cancel_crop(&mut self) {
        self.crop = Default::default();
    }

    /// Flattens the objects, cuts the crop rect out of the result and makes
    /// it the new base image. Returns `Ok(false)` when there is no crop rect.
    pub fn confirm_crop(&mut self) -> EditorResult<bool> {
        let image = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let mapper = self.mapper().ok_or(EditorError::NoImage)?;
        let Some(crop) = self.crop.rect else {
            return Ok(false);
        };

        let composed = flatten::flatten(&image.bitmap, self.scene.objects(), &mapper, self.font())?;
        let (width, height) = composed.dimensions();

        let fitted = mapper.rect_to_fitted(crop);
        let bottom_left = rect_to_image_pixel(fitted, mapper.fitted, mapper.pixel);
        let pixels = flip_rect_y(bottom_left, height as f32);

        let x0 = pixels.min.x.round().clamp(0.0, width as f32) as u32;
        let y0 = pixels.min.y.round().clamp(0.0, height as f32) as u32;
        let x1 = pixels.max.x.round().clamp(0.0, width as f32) as u32;
        let y1 = pixels.max.y.round().clamp(0.0, height as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return Err(EditorError::EmptyCrop);
        }

        let cropped = imageops::crop_imm(&composed, x0, y0, x1 - x0, y1 - y0).to_image();
        info!(
            "cropped {width}x{height} to {}x{} at ({x0}, {y0})",
            cropped.width(),
            cropped.height()
        );
        self.commit_base_image(cropped);
        Ok(true)
    }
}
