use egui::Pos2;

use crate::annotation::{Annotation, AnnotationId, Handle};

/// Ordered annotation list plus transient selection state.
///
/// Paint order is sequence order: later objects draw on top and win
/// hit-test ties.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    objects: Vec<Annotation>,
    selected: Option<AnnotationId>,
    active_handle: Handle,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &[Annotation] {
        &self.objects
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.objects.iter().find(|object| object.id == id)
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn selected_object(&self) -> Option<&Annotation> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn active_handle(&self) -> Handle {
        self.active_handle
    }

    /// Selects `id` if it exists; `None` clears the selection.
    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.selected = id.filter(|id| self.get(*id).is_some());
        self.active_handle = Handle::None;
    }

    pub fn set_active_handle(&mut self, handle: Handle) {
        self.active_handle = handle;
    }

    /// Topmost object whose handle or body is under `point`, filtered by
    /// `accept`.
    pub fn object_at(
        &self,
        point: Pos2,
        accept: impl Fn(&Annotation) -> bool,
    ) -> Option<(AnnotationId, Handle)> {
        self.objects
            .iter()
            .rev()
            .filter(|object| accept(object))
            .find_map(|object| {
                let handle = object.handle_hit_test(point);
                if !handle.is_none() || object.hit_test(point) {
                    Some((object.id, handle))
                } else {
                    None
                }
            })
    }

    /// Hit-tests from the top of the z-order and selects the winner, or
    /// clears the selection when nothing is hit.
    pub fn select_object_at(&mut self, point: Pos2) -> Option<AnnotationId> {
        match self.object_at(point, |_| true) {
            Some((id, handle)) => {
                self.selected = Some(id);
                self.active_handle = handle;
                Some(id)
            }
            None => {
                self.selected = None;
                self.active_handle = Handle::None;
                None
            }
        }
    }

    /// Replaces one object in place with `transform(object)`. Returns false
    /// when `id` is unknown.
    pub fn mutate(
        &mut self,
        id: AnnotationId,
        transform: impl FnOnce(&Annotation) -> Annotation,
    ) -> bool {
        let Some(slot) = self.objects.iter_mut().find(|object| object.id == id) else {
            return false;
        };
        let mut next = transform(slot);
        next.id = id;
        *slot = next;
        true
    }

    pub fn append(&mut self, object: Annotation) {
        self.objects.push(object);
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.objects.iter().position(|object| object.id == id)?;
        if self.selected == Some(id) {
            self.selected = None;
            self.active_handle = Handle::None;
        }
        Some(self.objects.remove(index))
    }

    /// Swaps in a whole sequence, as undo/redo does. Selection is dropped.
    pub fn replace_all(&mut self, objects: Vec<Annotation>) {
        self.objects = objects;
        self.selected = None;
        self.active_handle = Handle::None;
    }

    pub fn clear(&mut self) {
        self.replace_all(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use egui::{vec2, Rect};

    use super::*;
    use crate::annotation::AnnotationKind;

    fn highlight(id: AnnotationId, min: Pos2) -> Annotation {
        Annotation {
            id,
            color: [255, 230, 0, 110],
            kind: AnnotationKind::Highlight {
                rect: Rect::from_min_size(min, vec2(100.0, 100.0)),
            },
        }
    }

    #[test]
    fn topmost_object_wins_ties() {
        let mut scene = Scene::new();
        scene.append(highlight(1, Pos2::new(0.0, 0.0)));
        scene.append(highlight(2, Pos2::new(50.0, 50.0)));
        assert_eq!(scene.select_object_at(Pos2::new(75.0, 75.0)), Some(2));
        assert_eq!(scene.select_object_at(Pos2::new(25.0, 25.0)), Some(1));
        assert_eq!(scene.selected(), Some(1));
        assert_eq!(scene.select_object_at(Pos2::new(400.0, 400.0)), None);
        assert_eq!(scene.selected(), None);
    }

    #[test]
    fn handle_hit_selects_and_records_handle() {
        let mut scene = Scene::new();
        scene.append(highlight(1, Pos2::new(10.0, 10.0)));
        assert_eq!(scene.select_object_at(Pos2::new(113.0, 112.0)), Some(1));
        assert_eq!(scene.active_handle(), Handle::BottomRight);
    }

    #[test]
    fn mutate_replaces_in_place_without_reordering() {
        let mut scene = Scene::new();
        scene.append(highlight(1, Pos2::new(0.0, 0.0)));
        scene.append(highlight(2, Pos2::new(0.0, 0.0)));
        assert!(scene.mutate(1, |object| object.moved(vec2(10.0, 0.0))));
        assert!(!scene.mutate(99, |object| object.clone()));
        let ids: Vec<_> = scene.objects().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(scene.get(1).and_then(|o| o.rect()).map(|r| r.min.x), Some(10.0));
    }

    #[test]
    fn remove_clears_selection() {
        let mut scene = Scene::new();
        scene.append(highlight(1, Pos2::new(0.0, 0.0)));
        scene.select(Some(1));
        assert!(scene.remove(1).is_some());
        assert_eq!(scene.selected(), None);
        assert!(scene.remove(1).is_none());
    }

    #[test]
    fn select_ignores_unknown_ids() {
        let mut scene = Scene::new();
        scene.select(Some(3));
        assert_eq!(scene.selected(), None);
    }
}
