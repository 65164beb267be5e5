use std::collections::VecDeque;

use crate::annotation::Annotation;
use crate::state::BaseImage;

/// Default number of undo steps kept.
pub const DEFAULT_DEPTH: usize = 3;

/// Image reference plus the full object sequence at one moment.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub image: Option<BaseImage>,
    pub objects: Vec<Annotation>,
}

/// Bounded undo/redo stacks. Oldest entries fall off once `depth` is
/// exceeded.
#[derive(Clone, Debug)]
pub struct UndoHistory<T: Clone> {
    undo: VecDeque<T>,
    redo: Vec<T>,
    depth: usize,
}

impl<T: Clone> Default for UndoHistory<T> {
    fn default() -> Self {
        Self::with_depth(DEFAULT_DEPTH)
    }
}

impl<T: Clone> UndoHistory<T> {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            undo: VecDeque::with_capacity(depth + 1),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Records the state before a mutation and invalidates the redo branch.
    pub fn push_snapshot(&mut self, value: T) {
        self.redo.clear();
        self.undo.push_back(value);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Pops the latest snapshot, parking `current` on the redo stack.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Pops the latest redo entry, parking `current` on the undo stack.
    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::UndoHistory;

    #[test]
    fn undo_redo_flow() {
        let mut history = UndoHistory::with_depth(3);
        let mut state = vec![1];

        history.push_snapshot(state.clone());
        state.push(2);
        history.push_snapshot(state.clone());
        state.push(3);

        state = history.undo(state).expect("first undo");
        assert_eq!(state, vec![1, 2]);
        state = history.undo(state).expect("second undo");
        assert_eq!(state, vec![1]);
        assert!(history.undo(state.clone()).is_none());

        state = history.redo(state).expect("redo");
        assert_eq!(state, vec![1, 2]);

        history.push_snapshot(state.clone());
        assert!(!history.can_redo());
        assert!(history.redo(vec![9]).is_none());
    }

    #[test]
    fn depth_bounds_undo_steps() {
        let mut history = UndoHistory::with_depth(3);
        let mut state = 0;
        for _ in 0..5 {
            history.push_snapshot(state);
            state += 1;
        }
        assert_eq!(state, 5);

        let mut steps = 0;
        while let Some(previous) = history.undo(state) {
            state = previous;
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(state, 2);
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn clear_drops_both_stacks() {
        let mut history = UndoHistory::default();
        history.push_snapshot("a");
        let _ = history.undo("b");
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
