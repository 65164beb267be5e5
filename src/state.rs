use std::sync::Arc;

use ab_glyph::FontArc;
use egui::{vec2, Rect, Vec2};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, info, warn};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, Rgba, StrokeWidth, TextSize, Tool,
};
use crate::crop::CropState;
use crate::error::{EditorError, EditorResult};
use crate::flatten;
use crate::geometry::{clamp_rect, fit_within, CoordinateMapper};
use crate::gesture::DragState;
use crate::history::{Snapshot, UndoHistory};
use crate::scene::Scene;
use crate::settings::EditorSettings;
use crate::text;

pub const ZOOM_STEPS: &[f32] = &[0.25, 0.33, 0.5, 0.67, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0];

/// Largest pasted image width, in author units.
const PASTE_MAX_WIDTH: f32 = 480.0;
/// Share of the canvas a pasted image may cover on each axis.
const PASTE_MAX_FRACTION: f32 = 0.6;

/// The bitmap currently being annotated.
#[derive(Clone, Debug)]
pub struct BaseImage {
    pub id: u64,
    pub bitmap: Arc<RgbaImage>,
    /// Pixels per point, 2.0 on Retina captures.
    pub scale_factor: f32,
}

impl PartialEq for BaseImage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.bitmap, &other.bitmap)
    }
}

impl BaseImage {
    pub fn pixel_size(&self) -> Vec2 {
        vec2(self.bitmap.width() as f32, self.bitmap.height() as f32)
    }

    /// Author space is the image measured in points.
    pub fn author_size(&self) -> Vec2 {
        self.pixel_size() / self.scale_factor
    }
}

/// Display transform: explicit zoom or fit-to-viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub zoom: f32,
    pub fit_to_window: bool,
    pub viewport: Vec2,
}

impl Default for View {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            fit_to_window: true,
            viewport: Vec2::ZERO,
        }
    }
}

impl View {
    pub fn fitted_size(&self, author: Vec2) -> Vec2 {
        if self.fit_to_window && self.viewport.x > 0.0 && self.viewport.y > 0.0 {
            fit_within(author, self.viewport)
        } else {
            author * self.zoom
        }
    }
}

/// Style applied to newly created objects.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolStyle {
    pub color: Rgba,
    pub stroke: StrokeWidth,
    pub text_size: TextSize,
    pub arrow: bool,
    pub text_background: Option<Rgba>,
    pub badge_fill: Rgba,
    pub badge_text: Rgba,
    pub highlight_color: Rgba,
}

impl ToolStyle {
    fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            color: settings.last_color,
            stroke: settings.last_stroke,
            text_size: settings.last_text_size,
            arrow: settings.arrow_heads,
            text_background: settings.text_background,
            badge_fill: settings.badge_fill,
            badge_text: settings.badge_text,
            highlight_color: settings.highlight_color,
        }
    }
}

/// An open text editing session bound to one Text object.
#[derive(Clone, Debug, PartialEq)]
pub struct TextEditState {
    pub annotation_id: AnnotationId,
    pub buffer: String,
    /// State before a freshly created box was added. Pushed to history
    /// when the box is first committed with content.
    pub creation: Option<Snapshot>,
}

impl TextEditState {
    pub fn is_new(&self) -> bool {
        self.creation.is_some()
    }
}

pub struct EditorState {
    pub image: Option<BaseImage>,
    pub scene: Scene,
    pub history: UndoHistory<Snapshot>,
    pub active_tool: Tool,
    pub style: ToolStyle,
    pub view: View,
    pub drag: Option<DragState>,
    pub crop: CropState,
    pub text_edit: Option<TextEditState>,
    /// Event time at which the last text editing session ended.
    pub text_edit_closed_at: Option<f64>,
    pub has_edited: bool,
    pub next_id: AnnotationId,
    pub next_badge: u32,
    next_image_id: u64,
    pub settings: EditorSettings,
    persist_settings: bool,
    font: Option<FontArc>,
}

impl Default for EditorState {
    fn default() -> Self {
        let settings = EditorSettings::load().unwrap_or_else(|err| {
            debug!("using default settings: {err:#}");
            EditorSettings::default()
        });
        let mut state = Self::with_settings(settings);
        state.persist_settings = true;
        state
    }
}

impl EditorState {
    /// Builds an editor that never writes its settings back to disk.
    pub fn with_settings(settings: EditorSettings) -> Self {
        let settings = settings.sanitized();
        let font = text::load_font(settings.font_path.as_deref());
        Self {
            image: None,
            scene: Scene::new(),
            history: UndoHistory::with_depth(settings.history_depth),
            active_tool: Tool::Pointer,
            style: ToolStyle::from_settings(&settings),
            view: View::default(),
            drag: None,
            crop: CropState::default(),
            text_edit: None,
            text_edit_closed_at: None,
            has_edited: false,
            next_id: 1,
            next_badge: 1,
            next_image_id: 1,
            settings,
            persist_settings: false,
            font,
        }
    }

    pub fn font(&self) -> Option<&FontArc> {
        self.font.as_ref()
    }

    /// Installs a freshly captured or opened bitmap and resets all overlay
    /// state, history included.
    pub fn load_image(&mut self, bitmap: RgbaImage, scale_factor: f32) {
        let image = self.make_base_image(bitmap, scale_factor);
        info!(
            "loaded image #{} ({}x{} px @{}x)",
            image.id,
            image.bitmap.width(),
            image.bitmap.height(),
            image.scale_factor
        );
        self.image = Some(image);
        self.reset_overlay();
        self.history.clear();
        self.has_edited = false;
        self.view.zoom = 1.0;
        self.view.fit_to_window = true;
    }

    /// Drops the image, as when its backing file disappears.
    pub fn unload_image(&mut self) {
        self.image = None;
        self.reset_overlay();
        self.history.clear();
    }

    fn make_base_image(&mut self, bitmap: RgbaImage, scale_factor: f32) -> BaseImage {
        let id = self.next_image_id;
        self.next_image_id += 1;
        let scale_factor = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor
        } else {
            1.0
        };
        BaseImage {
            id,
            bitmap: Arc::new(bitmap),
            scale_factor,
        }
    }

    /// Replaces the base bitmap with a derived one (crop, flatten). Like a
    /// new image, this starts a fresh scene and history.
    pub(crate) fn commit_base_image(&mut self, bitmap: RgbaImage) {
        let scale_factor = self.image.as_ref().map_or(1.0, |image| image.scale_factor);
        let image = self.make_base_image(bitmap, scale_factor);
        self.image = Some(image);
        self.reset_overlay();
        self.history.clear();
        self.mark_changed();
    }

    fn reset_overlay(&mut self) {
        self.scene.clear();
        self.drag = None;
        self.crop = CropState::default();
        self.text_edit = None;
    }

    pub fn author_size(&self) -> Option<Vec2> {
        self.image.as_ref().map(BaseImage::author_size)
    }

    pub fn fitted_size(&self) -> Option<Vec2> {
        self.author_size().map(|author| self.view.fitted_size(author))
    }

    pub fn mapper(&self) -> Option<CoordinateMapper> {
        let image = self.image.as_ref()?;
        let author = image.author_size();
        Some(CoordinateMapper::new(
            author,
            self.view.fitted_size(author),
            image.pixel_size(),
        ))
    }

    pub fn set_viewport(&mut self, size: Vec2) {
        self.view.viewport = size;
    }

    pub fn set_fit_to_window(&mut self, fit: bool) {
        if !fit {
            if let (Some(author), Some(fitted)) = (self.author_size(), self.fitted_size()) {
                self.view.zoom = fitted.x / author.x;
            }
        }
        self.view.fit_to_window = fit;
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.view.zoom = zoom.clamp(ZOOM_STEPS[0], ZOOM_STEPS[ZOOM_STEPS.len() - 1]);
        self.view.fit_to_window = false;
    }

    pub fn nearest_zoom_step(&self) -> usize {
        let mut best_idx = 0usize;
        let mut best_diff = f32::MAX;
        for (idx, step) in ZOOM_STEPS.iter().enumerate() {
            let diff = (self.view.zoom - step).abs();
            if diff < best_diff {
                best_diff = diff;
                best_idx = idx;
            }
        }
        best_idx
    }

    pub fn zoom_in(&mut self) {
        self.set_fit_to_window(false);
        let idx = self.nearest_zoom_step();
        if idx + 1 < ZOOM_STEPS.len() {
            self.view.zoom = ZOOM_STEPS[idx + 1];
        }
    }

    pub fn zoom_out(&mut self) {
        self.set_fit_to_window(false);
        let idx = self.nearest_zoom_step();
        if idx > 0 {
            self.view.zoom = ZOOM_STEPS[idx - 1];
        }
    }

    pub fn mark_changed(&mut self) {
        self.has_edited = true;
    }

    pub fn current_snapshot(&self) -> Snapshot {
        Snapshot {
            image: self.image.clone(),
            objects: self.scene.objects().to_vec(),
        }
    }

    pub fn push_history_snapshot(&mut self) {
        let snapshot = self.current_snapshot();
        self.history.push_snapshot(snapshot);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let current = self.current_snapshot();
        match self.history.undo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => {
                debug!("nothing to undo");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.current_snapshot();
        match self.history.redo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => {
                debug!("nothing to redo");
                false
            }
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.image = snapshot.image;
        self.scene.replace_all(snapshot.objects);
        self.drag = None;
        self.crop = CropState::default();
        self.text_edit = None;
        self.mark_changed();
    }

    pub fn next_annotation_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Badge labels only ever count up, even after badges are deleted.
    pub fn next_badge_number(&mut self) -> u32 {
        let number = self.next_badge;
        self.next_badge = self.next_badge.saturating_add(1);
        number
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.active_tool == tool {
            return;
        }
        self.active_tool = tool;
        self.drag = None;
        if tool != Tool::Crop {
            self.crop = CropState::default();
        }
    }

    /// Snapshots, appends and selects a new object.
    pub fn add_annotation(&mut self, annotation: Annotation) -> AnnotationId {
        let id = annotation.id;
        self.push_history_snapshot();
        self.scene.append(annotation);
        self.scene.select(Some(id));
        self.mark_changed();
        id
    }

    pub fn delete_selected(&mut self) -> bool {
        let Some(selected) = self.scene.selected() else {
            return false;
        };
        if self.text_edit.as_ref().map(|edit| edit.annotation_id) == Some(selected) {
            self.text_edit = None;
        }
        self.push_history_snapshot();
        self.scene.remove(selected);
        self.mark_changed();
        true
    }

    /// Moves the selection by `delta` author units, kept on-canvas.
    pub fn nudge_selected(&mut self, delta: Vec2) -> bool {
        let (Some(id), Some(bounds)) = (self.scene.selected(), self.author_size()) else {
            return false;
        };
        self.push_history_snapshot();
        self.scene
            .mutate(id, |object| object.moved_within(delta, bounds));
        self.mark_changed();
        true
    }

    /// Applies `update` to the selected object if it reports a change.
    fn restyle_selection(&mut self, update: impl Fn(&mut Annotation) -> bool) {
        let Some(id) = self.scene.selected() else {
            return;
        };
        let Some(mut candidate) = self.scene.get(id).cloned() else {
            return;
        };
        if update(&mut candidate) {
            self.push_history_snapshot();
            self.scene.mutate(id, |_| candidate);
            self.mark_changed();
        }
    }

    fn save_settings(&self) {
        if !self.persist_settings {
            return;
        }
        if let Err(err) = self.settings.save() {
            warn!("cannot save settings: {err:#}");
        }
    }

    pub fn set_color(&mut self, rgba: Rgba) {
        self.style.color = rgba;
        self.settings.last_color = rgba;
        self.save_settings();
        self.restyle_selection(|object| {
            let changed = object.color != rgba;
            object.color = rgba;
            changed
        });
    }

    pub fn set_stroke(&mut self, stroke: StrokeWidth) {
        self.style.stroke = stroke;
        self.settings.last_stroke = stroke;
        self.save_settings();
        let px = stroke.px();
        self.restyle_selection(|object| match &mut object.kind {
            AnnotationKind::Line { width, .. }
            | AnnotationKind::Rect { width, .. }
            | AnnotationKind::Oval { width, .. } => {
                let changed = *width != px;
                *width = px;
                changed
            }
            _ => false,
        });
    }

    pub fn set_text_size(&mut self, size: TextSize) {
        self.style.text_size = size;
        self.settings.last_text_size = size;
        self.save_settings();
        self.restyle_selection(|object| match &mut object.kind {
            AnnotationKind::Text { font_size, .. } => {
                let changed = *font_size != size.points();
                *font_size = size.points();
                changed
            }
            _ => false,
        });
    }

    pub fn set_arrow(&mut self, arrow: bool) {
        self.style.arrow = arrow;
        self.settings.arrow_heads = arrow;
        self.save_settings();
        self.restyle_selection(|object| match &mut object.kind {
            AnnotationKind::Line { arrow: current, .. } => {
                let changed = *current != arrow;
                *current = arrow;
                changed
            }
            _ => false,
        });
    }

    pub fn set_text_background(&mut self, background: Option<Rgba>) {
        self.style.text_background = background;
        self.settings.text_background = background;
        self.save_settings();
        self.restyle_selection(|object| match &mut object.kind {
            AnnotationKind::Text {
                background: current,
                ..
            } => {
                let changed = *current != background;
                *current = background;
                changed
            }
            _ => false,
        });
    }

    /// Wraps a bitmap from the paste-in collaborator as a PastedImage
    /// centred on the canvas.
    pub fn paste_image(&mut self, bitmap: RgbaImage) -> Option<AnnotationId> {
        let author = self.author_size()?;
        if bitmap.width() == 0 || bitmap.height() == 0 {
            debug!("ignoring empty pasted bitmap");
            return None;
        }
        let size = pasted_size(
            vec2(bitmap.width() as f32, bitmap.height() as f32),
            author,
        );
        let rect = clamp_rect(Rect::from_center_size((author / 2.0).to_pos2(), size), author);
        let id = self.next_annotation_id();
        self.add_annotation(Annotation {
            id,
            color: self.style.color,
            kind: AnnotationKind::PastedImage {
                rect,
                bitmap: Arc::new(bitmap),
                rotation: 0.0,
            },
        });
        Some(id)
    }

    /// Opens an editing session on a Text object.
    pub fn begin_text_edit(&mut self, id: AnnotationId) -> bool {
        let Some(AnnotationKind::Text { content, .. }) = self.scene.get(id).map(|o| &o.kind)
        else {
            return false;
        };
        let buffer = content.clone();
        self.scene.select(Some(id));
        self.text_edit = Some(TextEditState {
            annotation_id: id,
            buffer,
            creation: None,
        });
        true
    }

    pub fn text_buffer_mut(&mut self) -> Option<&mut String> {
        self.text_edit.as_mut().map(|edit| &mut edit.buffer)
    }

    /// Writes the buffer back. Fresh boxes left empty are removed.
    pub fn commit_text_edit(&mut self, time: f64) {
        let Some(edit) = self.text_edit.take() else {
            return;
        };
        self.text_edit_closed_at = Some(time);
        let content = edit.buffer.trim_end().to_string();

        if content.is_empty() && edit.is_new() {
            self.scene.remove(edit.annotation_id);
            return;
        }

        let unchanged = matches!(
            self.scene.get(edit.annotation_id).map(|o| &o.kind),
            Some(AnnotationKind::Text { content: current, .. }) if *current == content
        );
        if unchanged || self.scene.get(edit.annotation_id).is_none() {
            return;
        }

        match edit.creation {
            Some(before) => self.history.push_snapshot(before),
            None => self.push_history_snapshot(),
        }
        self.scene.mutate(edit.annotation_id, |object| {
            let mut next = object.clone();
            if let AnnotationKind::Text { content: current, .. } = &mut next.kind {
                *current = content.clone();
            }
            next
        });
        self.mark_changed();
    }

    pub fn cancel_text_edit(&mut self, time: f64) {
        let Some(edit) = self.text_edit.take() else {
            return;
        };
        self.text_edit_closed_at = Some(time);
        let empty = matches!(
            self.scene.get(edit.annotation_id).map(|o| &o.kind),
            Some(AnnotationKind::Text { content, .. }) if content.is_empty()
        );
        if edit.is_new() && empty {
            self.scene.remove(edit.annotation_id);
        }
    }

    /// Composes the base image with every object without touching state.
    pub fn render_flattened(&self) -> EditorResult<RgbaImage> {
        let image = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let mapper = self.mapper().ok_or(EditorError::NoImage)?;
        flatten::flatten(&image.bitmap, self.scene.objects(), &mapper, self.font())
    }

    /// Bitmap for the persistence or clipboard collaborators. With
    /// `downsample`, Retina output is reduced to 1x.
    pub fn export_bitmap(&self, downsample: bool) -> EditorResult<RgbaImage> {
        let composed = self.render_flattened()?;
        let scale = self.image.as_ref().map_or(1.0, |image| image.scale_factor);
        if !downsample || scale <= 1.0 {
            return Ok(composed);
        }
        let width = ((composed.width() as f32 / scale).round() as u32).max(1);
        let height = ((composed.height() as f32 / scale).round() as u32).max(1);
        Ok(imageops::resize(&composed, width, height, FilterType::Triangle))
    }

    /// Burns every object into the base image and clears the overlay.
    pub fn flatten_in_place(&mut self) -> EditorResult<()> {
        let composed = self.render_flattened()?;
        let count = self.scene.len();
        self.commit_base_image(composed);
        info!("flattened {count} objects into the base image");
        Ok(())
    }
}

/// Natural size capped to `min(480, 60% of width)`, then to 60% of height.
fn pasted_size(natural: Vec2, author: Vec2) -> Vec2 {
    let aspect = natural.y / natural.x;
    let width = natural
        .x
        .min(PASTE_MAX_WIDTH)
        .min(author.x * PASTE_MAX_FRACTION);
    let mut size = vec2(width, width * aspect);
    let max_height = author.y * PASTE_MAX_FRACTION;
    if size.y > max_height {
        size = vec2(max_height / aspect, max_height);
    }
    size
}

#[cfg(test)]
mod tests {
    use egui::Pos2;
    use image::Rgba as Pixel;

    use super::*;

    fn editor(width: u32, height: u32) -> EditorState {
        let mut state = EditorState::with_settings(EditorSettings::default());
        state.load_image(
            RgbaImage::from_pixel(width, height, Pixel([255, 255, 255, 255])),
            1.0,
        );
        state
    }

    fn highlight(state: &mut EditorState, x: f32) -> AnnotationId {
        let id = state.next_annotation_id();
        state.add_annotation(Annotation {
            id,
            color: [255, 230, 0, 96],
            kind: AnnotationKind::Highlight {
                rect: Rect::from_min_size(Pos2::new(x, 10.0), vec2(20.0, 20.0)),
            },
        })
    }

    #[test]
    fn snapshot_mutate_undo_restores_sequence() {
        let mut state = editor(200, 200);
        let id = highlight(&mut state, 10.0);
        let before = state.scene.objects().to_vec();

        state.scene.select(Some(id));
        assert!(state.nudge_selected(vec2(15.0, 0.0)));
        assert_ne!(state.scene.objects(), before.as_slice());

        assert!(state.undo());
        assert_eq!(state.scene.objects(), before.as_slice());
        assert!(state.redo());
        assert_eq!(
            state.scene.get(id).and_then(|o| o.rect()).map(|r| r.min.x),
            Some(25.0)
        );
    }

    #[test]
    fn undo_is_bounded_to_three_steps() {
        let mut state = editor(400, 200);
        for i in 0..5 {
            highlight(&mut state, 10.0 + i as f32 * 30.0);
        }
        let mut steps = 0;
        while state.undo() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(state.scene.len(), 2);
    }

    #[test]
    fn new_image_resets_scene_and_history() {
        let mut state = editor(200, 200);
        highlight(&mut state, 10.0);
        state.load_image(RgbaImage::new(50, 50), 2.0);
        assert!(state.scene.is_empty());
        assert!(!state.can_undo());
        assert_eq!(state.author_size(), Some(vec2(25.0, 25.0)));
    }

    #[test]
    fn style_change_applies_to_selection_with_history() {
        let mut state = editor(200, 200);
        let id = highlight(&mut state, 10.0);
        state.history.clear();
        state.scene.select(Some(id));

        state.set_color([0, 0, 255, 255]);
        assert_eq!(state.scene.get(id).map(|o| o.color), Some([0, 0, 255, 255]));
        assert!(state.can_undo());

        // Highlights have no stroke, so nothing changes and nothing is recorded.
        state.history.clear();
        state.set_stroke(StrokeWidth::Thick);
        assert!(!state.can_undo());
        assert_eq!(state.style.stroke, StrokeWidth::Thick);
    }

    #[test]
    fn delete_selected_is_undoable() {
        let mut state = editor(200, 200);
        let id = highlight(&mut state, 10.0);
        state.scene.select(Some(id));
        assert!(state.delete_selected());
        assert!(state.scene.is_empty());
        assert!(!state.delete_selected());
        assert!(state.undo());
        assert!(state.scene.get(id).is_some());
    }

    #[test]
    fn paste_is_centred_and_capped() {
        let mut state = editor(1000, 500);
        let id = state
            .paste_image(RgbaImage::new(800, 400))
            .expect("image is loaded");
        let rect = state.scene.get(id).and_then(|o| o.rect()).expect("rect");
        assert_eq!(rect.size(), vec2(480.0, 240.0));
        assert_eq!(rect.center(), Pos2::new(500.0, 250.0));

        let tall = pasted_size(vec2(100.0, 1000.0), vec2(1000.0, 500.0));
        assert!((tall.y - 300.0).abs() < 1e-3);
        assert!((tall.x - 30.0).abs() < 1e-3);
    }

    #[test]
    fn export_without_image_is_refused() {
        let state = EditorState::with_settings(EditorSettings::default());
        assert_eq!(state.export_bitmap(false), Err(EditorError::NoImage));
    }

    #[test]
    fn export_downsamples_retina_output() {
        let mut state = EditorState::with_settings(EditorSettings::default());
        state.load_image(RgbaImage::new(400, 300), 2.0);
        let full = state.export_bitmap(false).expect("export");
        assert_eq!(full.dimensions(), (400, 300));
        let reduced = state.export_bitmap(true).expect("export");
        assert_eq!(reduced.dimensions(), (200, 150));
    }

    #[test]
    fn flatten_in_place_burns_objects_and_resets_history() {
        let mut state = editor(100, 100);
        highlight(&mut state, 10.0);
        let original = state.image.clone();

        state.flatten_in_place().expect("flatten");
        assert!(state.scene.is_empty());
        assert!(!state.can_undo());
        assert_ne!(state.image, original);
        let burned = state.image.as_ref().map(|i| *i.bitmap.get_pixel(20, 20));
        assert_ne!(burned, Some(Pixel([255, 255, 255, 255])));
    }

    #[test]
    fn undo_restores_image_reference_from_snapshot() {
        let mut state = editor(100, 100);
        let original = state.image.clone();
        state.push_history_snapshot();
        state.image = Some(BaseImage {
            id: 99,
            bitmap: Arc::new(RgbaImage::new(10, 10)),
            scale_factor: 1.0,
        });
        assert!(state.undo());
        assert_eq!(state.image, original);
    }

    #[test]
    fn text_edit_commit_records_one_step() {
        let mut state = editor(200, 200);
        let id = state.next_annotation_id();
        state.add_annotation(Annotation {
            id,
            color: [0, 0, 0, 255],
            kind: AnnotationKind::Text {
                rect: Rect::from_min_size(Pos2::new(10.0, 10.0), vec2(80.0, 30.0)),
                content: "old".to_string(),
                font_size: 18.0,
                background: None,
                rotation: 0.0,
            },
        });
        state.history.clear();

        assert!(state.begin_text_edit(id));
        if let Some(buffer) = state.text_buffer_mut() {
            buffer.push_str(" text");
        }
        state.commit_text_edit(1.0);
        assert_eq!(state.text_edit_closed_at, Some(1.0));
        assert!(matches!(
            state.scene.get(id).map(|o| &o.kind),
            Some(AnnotationKind::Text { content, .. }) if content == "old text"
        ));
        assert!(state.undo());
        assert!(!state.can_undo());
    }

    #[test]
    fn invalid_drag_rate_falls_back_to_default() {
        let settings = EditorSettings {
            drag_rate_hz: 0.0,
            history_depth: 0,
            ..Default::default()
        };
        let state = EditorState::with_settings(settings);
        assert_eq!(state.settings.drag_rate_hz, 90.0);
        assert!(state.settings.drag_interval().is_finite());
        assert_eq!(state.settings.history_depth, 1);
    }

    #[test]
    fn fit_mode_uses_viewport() {
        let mut state = editor(800, 600);
        state.set_viewport(vec2(400.0, 400.0));
        assert_eq!(state.fitted_size(), Some(vec2(400.0, 300.0)));
        state.set_fit_to_window(false);
        assert!((state.view.zoom - 0.5).abs() < 1e-6);
        state.zoom_in();
        assert_eq!(state.view.zoom, 0.67);
        state.zoom_out();
        state.zoom_out();
        assert_eq!(state.view.zoom, 0.33);
    }
}
