use std::collections::VecDeque;
use std::sync::Arc;

use whalewatch_types::MarketEvent;

pub type RowId = u64;

/// One displayed line. A large event may occupy several rows.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: RowId,
    pub event: Arc<MarketEvent>,
    /// Position of the event's tier in the tier table.
    pub tier: usize,
}

/// Bounded FIFO of rows. Pushing past capacity evicts the oldest rows and
/// hands their ids back so per-row state elsewhere can be pruned.
#[derive(Debug)]
pub struct RenderBuffer {
    rows: VecDeque<Row>,
    capacity: usize,
    next_id: RowId,
    events: u64,
}

impl RenderBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
            events: 0,
        }
    }

    /// Appends `repeat` rows for `event` and returns the ids evicted to
    /// make room, oldest first, plus the ids of the new rows.
    pub fn push(
        &mut self,
        event: &Arc<MarketEvent>,
        tier: usize,
        repeat: u8,
    ) -> (Vec<RowId>, Vec<RowId>) {
        self.events += 1;
        let mut added = Vec::with_capacity(usize::from(repeat));
        for _ in 0..repeat.max(1) {
            let id = self.next_id;
            self.next_id += 1;
            self.rows.push_back(Row {
                id,
                event: Arc::clone(event),
                tier,
            });
            added.push(id);
        }
        let evicted = self.evict_overflow();
        // A burst larger than the buffer evicts some of its own rows.
        added.retain(|id| !evicted.contains(id));
        (evicted, added)
    }

    /// Changes capacity, evicting the oldest rows if it shrank.
    pub fn resize(&mut self, capacity: usize) -> Vec<RowId> {
        self.capacity = capacity.max(1);
        self.evict_overflow()
    }

    fn evict_overflow(&mut self) -> Vec<RowId> {
        let overflow = self.rows.len().saturating_sub(self.capacity);
        self.rows.drain(..overflow).map(|row| row.id).collect()
    }

    /// Rows from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events pushed since creation, counting repeated rows once.
    pub fn events_seen(&self) -> u64 {
        self.events
    }
}
