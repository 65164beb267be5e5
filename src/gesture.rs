//! Pointer gestures: drag start, drag change and drag end for every tool.

use egui::{vec2, Modifiers, Pos2, Rect, Vec2};
use log::debug;

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, Handle, Rgba, Tool, MIN_SIZE,
};
use crate::geometry::{
    clamp_point, clamp_rect, constrain_line_end, normalized_angle_delta, pointer_angle,
    snap_angle, SnapIncrement,
};
use crate::state::{EditorState, TextEditState};

/// Movement needed before a drag on an existing object mutates it.
pub const MOVE_THRESHOLD: f32 = 0.5;
/// Larger threshold for objects where a click means something else.
pub const CLICK_THRESHOLD: f32 = 5.0;
/// Side of shapes created by a plain click.
pub const DEFAULT_OBJECT_SIZE: f32 = 40.0;
/// Seconds after leaving text edit mode during which double-clicks are ignored.
pub const DOUBLE_CLICK_SUPPRESSION: f64 = 0.3;

/// A pointer sample in fitted (on-screen) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pos: Pos2,
    pub modifiers: Modifiers,
    /// Seconds on any monotonic clock.
    pub time: f64,
    pub click_count: u32,
}

impl PointerEvent {
    pub fn new(pos: Pos2, time: f64) -> Self {
        Self {
            pos,
            modifiers: Modifiers::NONE,
            time,
            click_count: 1,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_click_count(mut self, click_count: u32) -> Self {
        self.click_count = click_count;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragMode {
    Draw,
    Move,
    Resize,
    Rotate,
}

/// Pointer angle and object rotation captured once when a rotation starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationAnchor {
    pub center: Pos2,
    pub pointer_angle: f32,
    pub rotation: f32,
}

/// Transient state of the drag in progress. Dropped at drag end.
#[derive(Clone, Debug, PartialEq)]
pub struct DragState {
    pub mode: DragMode,
    pub tool: Tool,
    /// Author-space pointer position at drag start.
    pub start: Pos2,
    /// Latest author-space pointer position, constrained for drafts.
    pub current: Pos2,
    pub selection_id: Option<AnnotationId>,
    pub handle: Handle,
    /// Last position at which a manipulation was applied.
    pub anchor: Pos2,
    pub threshold: f32,
    pub snapshot_taken: bool,
    pub rotation: Option<RotationAnchor>,
    pub last_tick: f64,
}

impl DragState {
    /// Whether the drag went far enough to be more than a click.
    pub fn has_draft(&self) -> bool {
        (self.current - self.start).length() > MOVE_THRESHOLD
    }
}

impl EditorState {
    pub fn drag_started(&mut self, event: PointerEvent) {
        let Some(mapper) = self.mapper() else {
            return;
        };
        let Some(bounds) = self.author_size() else {
            return;
        };
        let point = clamp_point(mapper.to_author(event.pos), bounds);

        if self.active_tool == Tool::Crop {
            self.crop_drag_started(point, event.time);
            return;
        }

        let editing = self.text_edit.as_ref().map(|edit| edit.annotation_id);
        let tool = self.active_tool;
        let hit = self.scene.object_at(point, |object| object.matches_tool(tool));

        if editing.is_some() && editing != hit.map(|(id, _)| id) {
            self.commit_text_edit(event.time);
        }

        let drag = match hit {
            Some((id, handle)) => {
                self.scene.select(Some(id));
                self.scene.set_active_handle(handle);
                let object = self.scene.get(id);
                let threshold = match object.map(|o| &o.kind) {
                    Some(AnnotationKind::Text { .. } | AnnotationKind::Badge { .. }) => {
                        CLICK_THRESHOLD
                    }
                    _ => MOVE_THRESHOLD,
                };
                let (mode, rotation) = match handle {
                    Handle::None => (DragMode::Move, None),
                    Handle::Rotate => {
                        let anchor = object.map(|object| {
                            let center = object.rotation_center();
                            RotationAnchor {
                                center,
                                pointer_angle: pointer_angle(center, point),
                                rotation: object.rotation(),
                            }
                        });
                        (DragMode::Rotate, anchor)
                    }
                    _ => (DragMode::Resize, None),
                };
                DragState {
                    mode,
                    tool,
                    start: point,
                    current: point,
                    selection_id: Some(id),
                    handle,
                    anchor: point,
                    threshold,
                    snapshot_taken: false,
                    rotation,
                    last_tick: event.time,
                }
            }
            None => {
                self.scene.select(None);
                if tool == Tool::Pointer {
                    return;
                }
                DragState {
                    mode: DragMode::Draw,
                    tool,
                    start: point,
                    current: point,
                    selection_id: None,
                    handle: Handle::None,
                    anchor: point,
                    threshold: MOVE_THRESHOLD,
                    snapshot_taken: false,
                    rotation: None,
                    last_tick: event.time,
                }
            }
        };
        self.drag = Some(drag);
    }

    /// Rate-limited drag update. Ticks closer together than the configured
    /// interval are skipped; the drag end always applies the final position.
    pub fn drag_changed(&mut self, event: PointerEvent) {
        if self.active_tool == Tool::Crop {
            if let Some(point) = self.author_point(event.pos) {
                self.crop_drag_changed(point, event.time);
            }
            return;
        }
        let interval = self.settings.drag_interval();
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if event.time - drag.last_tick < interval {
            return;
        }
        drag.last_tick = event.time;
        self.apply_drag(event);
    }

    pub fn drag_ended(&mut self, event: PointerEvent) {
        if self.active_tool == Tool::Crop {
            if let Some(point) = self.author_point(event.pos) {
                self.crop_drag_ended(point);
            }
            return;
        }
        if self.drag.is_none() {
            return;
        }
        self.apply_drag(event);
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.scene.set_active_handle(Handle::None);

        match drag.mode {
            DragMode::Draw => self.commit_draft(&drag, event.time),
            DragMode::Move | DragMode::Resize | DragMode::Rotate => {
                if drag.snapshot_taken {
                    return;
                }
                if let Some(id) = drag.selection_id {
                    self.object_clicked(id, event);
                }
            }
        }
    }

    fn author_point(&self, fitted: Pos2) -> Option<Pos2> {
        let mapper = self.mapper()?;
        let bounds = self.author_size()?;
        Some(clamp_point(mapper.to_author(fitted), bounds))
    }

    fn apply_drag(&mut self, event: PointerEvent) {
        let Some(bounds) = self.author_size() else {
            return;
        };
        let Some(mapper) = self.mapper() else {
            return;
        };
        let point = clamp_point(mapper.to_author(event.pos), bounds);
        let shift = event.modifiers.shift;
        let Some(drag) = self.drag.as_mut() else {
            return;
        };

        if drag.mode == DragMode::Draw {
            drag.current = if drag.tool == Tool::Line && shift {
                clamp_point(constrain_line_end(drag.start, point), bounds)
            } else {
                point
            };
            return;
        }

        let Some(id) = drag.selection_id else {
            return;
        };
        if (point - drag.anchor).length() < drag.threshold {
            return;
        }
        let anchor = drag.anchor;
        drag.anchor = point;
        drag.current = point;
        let first_change = !drag.snapshot_taken;
        drag.snapshot_taken = true;
        // Once a drag is under way every tick counts.
        drag.threshold = 0.0;
        let mode = drag.mode;
        let handle = drag.handle;
        let rotation = drag.rotation;

        if first_change {
            self.push_history_snapshot();
            self.mark_changed();
        }

        match mode {
            DragMode::Move => {
                self.scene
                    .mutate(id, |object| object.moved_within(point - anchor, bounds));
            }
            DragMode::Resize => {
                self.scene.mutate(id, |object| {
                    let target = match (&object.kind, handle) {
                        (AnnotationKind::Line { from, .. }, Handle::LineEnd) if shift => {
                            constrain_line_end(*from, point)
                        }
                        (AnnotationKind::Line { to, .. }, Handle::LineStart) if shift => {
                            constrain_line_end(*to, point)
                        }
                        _ => point,
                    };
                    object
                        .resizing(handle, clamp_point(target, bounds))
                        .clamped(bounds)
                });
            }
            DragMode::Rotate => {
                let Some(anchor) = rotation else {
                    return;
                };
                let delta = normalized_angle_delta(
                    anchor.pointer_angle,
                    pointer_angle(anchor.center, point),
                );
                let target = snap_angle(
                    anchor.rotation + delta,
                    SnapIncrement::from_modifiers(&event.modifiers),
                );
                self.scene.mutate(id, |object| object.with_rotation(target));
            }
            DragMode::Draw => {}
        }
    }

    /// A press and release on an object that never moved it.
    fn object_clicked(&mut self, id: AnnotationId, event: PointerEvent) {
        let is_text = matches!(
            self.scene.get(id).map(|o| &o.kind),
            Some(AnnotationKind::Text { .. })
        );
        if !is_text || event.click_count < 2 {
            return;
        }
        if self.text_edit.as_ref().map(|edit| edit.annotation_id) == Some(id) {
            return;
        }
        let suppressed = self
            .text_edit_closed_at
            .is_some_and(|closed| event.time - closed < DOUBLE_CLICK_SUPPRESSION);
        if suppressed {
            debug!("ignoring double-click right after leaving text edit");
            return;
        }
        self.begin_text_edit(id);
    }

    fn commit_draft(&mut self, drag: &DragState, time: f64) {
        let Some(bounds) = self.author_size() else {
            return;
        };
        let Some(kind) = self.draft_kind(drag, bounds) else {
            return;
        };
        let color = self.tool_color(drag.tool);
        let kind = match kind {
            AnnotationKind::Badge { rect, text_color, .. } => AnnotationKind::Badge {
                rect,
                number: self.next_badge_number(),
                text_color,
            },
            other => other,
        };
        let id = self.next_annotation_id();
        if !matches!(kind, AnnotationKind::Text { .. }) {
            self.add_annotation(Annotation { id, color, kind });
            return;
        }

        if self.text_edit.is_some() {
            self.commit_text_edit(time);
        }
        // A new text box enters history only once it gets content.
        let before = self.current_snapshot();
        self.scene.append(Annotation { id, color, kind });
        self.scene.select(Some(id));
        self.text_edit = Some(TextEditState {
            annotation_id: id,
            buffer: String::new(),
            creation: Some(before),
        });
    }

    pub(crate) fn tool_color(&self, tool: Tool) -> Rgba {
        match tool {
            Tool::Highlight => self.style.highlight_color,
            Tool::Badge => self.style.badge_fill,
            _ => self.style.color,
        }
    }

    /// Geometry the current draft would commit to. Badge numbers are
    /// assigned on commit.
    pub(crate) fn draft_kind(&self, drag: &DragState, bounds: Vec2) -> Option<AnnotationKind> {
        let dragged = drag.has_draft();
        let drawn = Rect::from_two_pos(drag.start, drag.current);
        let style = &self.style;
        let click_box = |size: Vec2| {
            clamp_rect(Rect::from_center_size(drag.start, size), bounds)
        };
        let shape_rect = || {
            if dragged {
                let size = drawn.size().max(vec2(MIN_SIZE, MIN_SIZE));
                clamp_rect(Rect::from_min_size(drawn.min, size), bounds)
            } else {
                click_box(vec2(DEFAULT_OBJECT_SIZE, DEFAULT_OBJECT_SIZE))
            }
        };

        match drag.tool {
            Tool::Line => {
                if (drag.current - drag.start).length() < MIN_SIZE {
                    return None;
                }
                Some(AnnotationKind::Line {
                    from: drag.start,
                    to: drag.current,
                    width: style.stroke.px(),
                    arrow: style.arrow,
                })
            }
            Tool::Rect => Some(AnnotationKind::Rect {
                rect: shape_rect(),
                width: style.stroke.px(),
                rotation: 0.0,
            }),
            Tool::Oval => Some(AnnotationKind::Oval {
                rect: shape_rect(),
                width: style.stroke.px(),
            }),
            Tool::Highlight => Some(AnnotationKind::Highlight { rect: shape_rect() }),
            Tool::Badge => {
                let rect = if dragged {
                    let side = drawn.width().max(drawn.height()).max(MIN_SIZE);
                    clamp_rect(Rect::from_min_size(drawn.min, vec2(side, side)), bounds)
                } else {
                    click_box(vec2(DEFAULT_OBJECT_SIZE, DEFAULT_OBJECT_SIZE))
                };
                Some(AnnotationKind::Badge {
                    rect,
                    number: self.next_badge,
                    text_color: style.badge_text,
                })
            }
            Tool::Text => {
                let font_size = style.text_size.points();
                let rect = if dragged {
                    let size = drawn.size().max(vec2(MIN_SIZE, MIN_SIZE));
                    clamp_rect(Rect::from_min_size(drawn.min, size), bounds)
                } else {
                    click_box(vec2(font_size * 4.0, font_size * 1.5))
                };
                Some(AnnotationKind::Text {
                    rect,
                    content: String::new(),
                    font_size,
                    background: style.text_background,
                    rotation: 0.0,
                })
            }
            Tool::Pointer | Tool::Crop => None,
        }
    }
}
