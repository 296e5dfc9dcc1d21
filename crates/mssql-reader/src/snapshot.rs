//! Suspension snapshots.
//!
//! Before a step that may run out of buffered bytes, the reader captures its
//! [`ReadState`] and the buffer pins its position. If the step has to wait,
//! the next attempt replays from the capture instead of trying to resume a
//! half-done parse. Snapshots are pooled per connection: a released snapshot
//! is donated back to a one-slot [`SnapshotCache`] and reused by the next
//! operation.

use mssql_value::RowBuffer;
use parking_lot::Mutex;

use crate::cursor::ReadState;

/// Captured reader state of one suspension point.
#[derive(Debug, Default)]
pub struct Snapshot {
    captured: Option<ReadState>,
}

impl Snapshot {
    /// Returns whether a state is captured.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.captured.is_some()
    }

    /// Record `state` as the replay point, reusing the previous allocation.
    pub(crate) fn capture(&mut self, state: &ReadState) {
        match &mut self.captured {
            Some(captured) => captured.clone_from(state),
            None => self.captured = Some(state.clone()),
        }
    }

    /// Restore the captured state.
    ///
    /// Cells at or beyond the restored data cursor were decoded after the
    /// capture and are cleared so the replay can write them again.
    pub(crate) fn replay(&self, state: &mut ReadState, row: &mut RowBuffer) {
        if let Some(captured) = &self.captured {
            state.clone_from(captured);
            row.clear_from(state.cursor.next_data);
        }
    }

    /// Forget the captured state.
    pub fn release(&mut self) {
        self.captured = None;
    }
}

/// One-slot pool of released snapshots, shared by the readers of a
/// connection.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    slot: Mutex<Option<Box<Snapshot>>>,
}

impl SnapshotCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the cached snapshot, if any.
    pub fn take(&self) -> Option<Box<Snapshot>> {
        self.slot.lock().take()
    }

    /// Offer a snapshot back to the cache.
    ///
    /// The snapshot is released first. Returns `false`, dropping it, when the
    /// slot is already occupied.
    pub fn donate(&self, mut snapshot: Box<Snapshot>) -> bool {
        snapshot.release();
        let mut slot = self.slot.lock();
        if slot.is_some() {
            tracing::debug!("snapshot cache occupied, dropping snapshot");
            return false;
        }
        *slot = Some(snapshot);
        true
    }

    /// Returns whether a snapshot is cached.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tds_wire::{ColMetaData, ColumnData, TypeId, TypeInfo};

    use super::*;

    fn read_state() -> ReadState {
        let metadata = ColMetaData {
            columns: vec![
                ColumnData::new("a", TypeId::Int4, TypeInfo::default()),
                ColumnData::new("b", TypeId::Int4, TypeInfo::default()),
                ColumnData::new("c", TypeId::Int4, TypeInfo::default()),
            ],
        };
        ReadState::new(Arc::new(metadata))
    }

    #[test]
    fn test_replay_restores_cursor_and_metadata() {
        let mut state = read_state();
        state.cursor.data_ready = true;
        state.cursor.next_header = 1;
        state.cursor.next_data = 1;
        state.table_names = Arc::from(vec!["t".to_string()]);
        Arc::make_mut(&mut state.alt_metadata).insert(1, ColMetaData::default());
        let metadata = Arc::clone(&state.metadata);
        let table_names = Arc::clone(&state.table_names);
        let alt_metadata = Arc::clone(&state.alt_metadata);

        let mut snapshot = Snapshot::default();
        snapshot.capture(&state);

        state.cursor.next_header = 3;
        state.cursor.next_data = 3;
        state.flags.has_rows = true;
        state.metadata = Arc::new(ColMetaData::default());
        state.table_names = Arc::from(Vec::new());
        state.alt_metadata = Arc::default();

        let mut row = RowBuffer::new(3);
        snapshot.replay(&mut state, &mut row);
        assert_eq!(state.cursor.next_header, 1);
        assert_eq!(state.cursor.next_data, 1);
        assert!(!state.flags.has_rows);
        assert_eq!(state.column_count(), 3);
        assert!(Arc::ptr_eq(&state.metadata, &metadata));
        assert!(Arc::ptr_eq(&state.table_names, &table_names));
        assert!(Arc::ptr_eq(&state.alt_metadata, &alt_metadata));
        assert!(state.alt_metadata.get(1).is_some());
    }

    #[test]
    fn test_replay_clears_cells_decoded_after_capture() {
        let mut state = read_state();
        state.cursor.next_header = 1;
        state.cursor.next_data = 1;

        let mut snapshot = Snapshot::default();
        snapshot.capture(&state);

        let mut row = RowBuffer::new(3);
        row[0].set_i32(1);
        row[1].set_i32(2);
        row[2].set_i32(3);

        snapshot.replay(&mut state, &mut row);
        assert_eq!(row[0].as_i32().unwrap(), 1);
        assert!(row[1].is_empty());
        assert!(row[2].is_empty());
    }

    #[test]
    fn test_released_snapshot_replays_nothing() {
        let mut state = read_state();
        let mut snapshot = Snapshot::default();
        snapshot.capture(&state);
        assert!(snapshot.is_captured());
        snapshot.release();
        assert!(!snapshot.is_captured());

        state.cursor.next_header = 2;
        let mut row = RowBuffer::new(3);
        snapshot.replay(&mut state, &mut row);
        assert_eq!(state.cursor.next_header, 2);
    }

    #[test]
    fn test_cache_holds_one_snapshot() {
        let cache = SnapshotCache::new();
        assert!(cache.take().is_none());

        let mut first = Box::<Snapshot>::default();
        first.capture(&read_state());
        assert!(cache.donate(first));
        assert!(!cache.donate(Box::default()));
        assert!(cache.is_occupied());

        let reused = cache.take().unwrap();
        assert!(!reused.is_captured());
        assert!(!cache.is_occupied());
    }
}
