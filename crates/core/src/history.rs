//! Undo/redo history for annotation edits

use crate::annotation::Annotation;
use std::collections::VecDeque;

/// Default number of undo entries kept
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One reversible edit of a single annotation
#[derive(Debug, Clone, PartialEq)]
pub enum UndoEntry {
    /// Annotation was added; undo removes it
    Add { annotation: Annotation },

    /// Annotation was removed from `index` in its page list; undo reinserts it
    Remove { annotation: Annotation, index: usize },

    /// Annotation changed in place; undo restores `before`
    Modify { before: Annotation, after: Annotation },
}

impl UndoEntry {
    /// Id of the annotation this entry touches
    pub fn annotation_id(&self) -> &str {
        match self {
            UndoEntry::Add { annotation } | UndoEntry::Remove { annotation, .. } => annotation.id(),
            UndoEntry::Modify { after, .. } => after.id(),
        }
    }
}

/// Bounded undo stack with a redo stack
///
/// Most recent entries are at the back. Pushing a new entry clears redo.
#[derive(Debug, Clone)]
pub struct UndoStack {
    undo: VecDeque<UndoEntry>,
    redo: Vec<UndoEntry>,
    limit: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl UndoStack {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a completed edit
    pub fn push(&mut self, entry: UndoEntry) {
        self.redo.clear();
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Move the newest entry to the redo stack and return it for reversal
    pub fn undo(&mut self) -> Option<UndoEntry> {
        let entry = self.undo.pop_back()?;
        self.redo.push(entry.clone());
        Some(entry)
    }

    /// Move the newest undone entry back and return it for replay
    pub fn redo(&mut self) -> Option<UndoEntry> {
        let entry = self.redo.pop()?;
        self.undo.push_back(entry.clone());
        Some(entry)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
