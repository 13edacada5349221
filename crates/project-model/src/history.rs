//! Snapshot-based undo/redo.
//!
//! Each entry is a whole [`Project`] behind an `Arc`; undoing swaps the
//! current snapshot with the top of the past stack. Entries carry monotonic
//! sequence numbers so a persistence collaborator can key them.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::project::Project;

/// Default number of entries kept per direction.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// One recorded snapshot.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Monotonic per-log sequence number.
    pub seq: u64,
    /// What produced the state after this snapshot (e.g. "move clip").
    pub label: String,
    pub snapshot: Arc<Project>,
}

/// Bounded undo/redo stacks.
#[derive(Debug)]
pub struct HistoryLog {
    past: VecDeque<HistoryEntry>,
    future: VecDeque<HistoryEntry>,
    capacity: usize,
    next_seq: u64,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Record the state before an edit. Clears the redo stack.
    ///
    /// Returns the new entry and any entry pruned to stay within capacity.
    pub fn record(
        &mut self,
        label: impl Into<String>,
        previous: Arc<Project>,
    ) -> (&HistoryEntry, Option<HistoryEntry>) {
        self.future.clear();
        let entry = HistoryEntry {
            seq: self.bump(),
            label: label.into(),
            snapshot: previous,
        };
        self.past.push_back(entry);
        let pruned = if self.past.len() > self.capacity {
            self.past.pop_front()
        } else {
            None
        };
        // Just pushed, so the back is present.
        let newest = &self.past[self.past.len() - 1];
        (newest, pruned)
    }

    /// Step back. `current` goes on the redo stack.
    pub fn undo(&mut self, current: Arc<Project>) -> Option<Arc<Project>> {
        let entry = self.past.pop_back()?;
        let seq = self.bump();
        self.future.push_back(HistoryEntry {
            seq,
            label: entry.label.clone(),
            snapshot: current,
        });
        if self.future.len() > self.capacity {
            self.future.pop_front();
        }
        Some(entry.snapshot)
    }

    /// Step forward. `current` goes back on the undo stack.
    pub fn redo(&mut self, current: Arc<Project>) -> Option<Arc<Project>> {
        let entry = self.future.pop_back()?;
        let seq = self.bump();
        self.past.push_back(HistoryEntry {
            seq,
            label: entry.label.clone(),
            snapshot: current,
        });
        if self.past.len() > self.capacity {
            self.past.pop_front();
        }
        Some(entry.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Label of the edit `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.past.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.future.back().map(|e| e.label.as_str())
    }

    /// Newest entry on the undo stack.
    pub fn last_past(&self) -> Option<&HistoryEntry> {
        self.past.back()
    }

    /// Newest entry on the redo stack.
    pub fn last_future(&self) -> Option<&HistoryEntry> {
        self.future.back()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Arc<Project> {
        let mut p = Project::new(name);
        p.id = "fixed".to_string();
        Arc::new(p)
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut log = HistoryLog::new(8);
        let v0 = named("v0");
        let v1 = named("v1");
        log.record("rename", v0.clone());

        let back = log.undo(v1.clone()).unwrap();
        assert_eq!(back.name, "v0");
        assert!(log.can_redo());
        let forward = log.redo(back).unwrap();
        assert_eq!(forward.name, "v1");
        assert!(log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn test_record_clears_redo() {
        let mut log = HistoryLog::new(8);
        log.record("a", named("v0"));
        log.undo(named("v1"));
        assert!(log.can_redo());
        log.record("b", named("v0"));
        assert!(!log.can_redo());
    }

    #[test]
    fn test_capacity_prunes_oldest() {
        let mut log = HistoryLog::new(3);
        for i in 0..5 {
            let (_, pruned) = log.record(format!("edit {i}"), named(&format!("v{i}")));
            if i >= 3 {
                assert_eq!(pruned.unwrap().label, format!("edit {}", i - 3));
            }
        }
        assert_eq!(log.past_len(), 3);
        assert_eq!(log.undo_label(), Some("edit 4"));

        // Oldest surviving snapshot is v2.
        let mut current = named("v5");
        let mut last = None;
        while let Some(prev) = log.undo(current.clone()) {
            current = prev.clone();
            last = Some(prev);
        }
        assert_eq!(last.unwrap().name, "v2");
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let mut log = HistoryLog::new(4);
        let first = log.record("a", named("v0")).0.seq;
        let second = log.record("b", named("v1")).0.seq;
        assert!(second > first);
        log.undo(named("v2"));
        assert!(log.last_future().unwrap().seq > second);
    }
}
