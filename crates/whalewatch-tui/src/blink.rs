use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::buffer::RowId;

/// Per-row blink phase, advanced by wall-clock time.
///
/// Every registered row flips between normal and inverted together each
/// time `interval` elapses, however often [`BlinkState::tick`] is called.
#[derive(Debug)]
pub struct BlinkState {
    interval: Duration,
    last_flip: Instant,
    rows: HashMap<RowId, bool>,
}

impl BlinkState {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            last_flip: now,
            rows: HashMap::new(),
        }
    }

    /// Starts blinking `id` in the normal phase.
    pub fn register(&mut self, id: RowId) {
        self.rows.insert(id, false);
    }

    pub fn prune<'a>(&mut self, ids: impl IntoIterator<Item = &'a RowId>) {
        for id in ids {
            self.rows.remove(id);
        }
    }

    /// Advances to `now`. Returns `true` if the phase flipped.
    pub fn tick(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_flip);
        let periods = elapsed.as_nanos() / self.interval.as_nanos();
        if periods == 0 {
            return false;
        }
        let whole = u32::try_from(periods).unwrap_or(u32::MAX);
        self.last_flip += self.interval.saturating_mul(whole);
        if periods % 2 == 0 {
            return false;
        }
        for inverted in self.rows.values_mut() {
            *inverted = !*inverted;
        }
        true
    }

    /// Whether `id` should currently be drawn inverted.
    pub fn is_inverted(&self, id: RowId) -> bool {
        self.rows.get(&id).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(500);

    #[test]
    fn test_flips_only_after_interval() {
        let start = Instant::now();
        let mut blink = BlinkState::new(INTERVAL, start);
        blink.register(1);

        assert!(!blink.tick(start + Duration::from_millis(100)));
        assert!(!blink.tick(start + Duration::from_millis(499)));
        assert!(!blink.is_inverted(1));

        assert!(blink.tick(start + Duration::from_millis(500)));
        assert!(blink.is_inverted(1));

        // Repeated ticks within the same period change nothing.
        assert!(!blink.tick(start + Duration::from_millis(700)));
        assert!(blink.is_inverted(1));

        assert!(blink.tick(start + Duration::from_millis(1_000)));
        assert!(!blink.is_inverted(1));
    }

    #[test]
    fn test_phase_follows_wall_clock_not_tick_count() {
        let start = Instant::now();
        let mut blink = BlinkState::new(INTERVAL, start);
        blink.register(1);

        // Two whole intervals skipped in one tick: back to normal.
        assert!(!blink.tick(start + Duration::from_millis(1_100)));
        assert!(!blink.is_inverted(1));
        // The next flip is at 1_500, not 1_100 + 500.
        assert!(blink.tick(start + Duration::from_millis(1_500)));
        assert!(blink.is_inverted(1));
    }

    #[test]
    fn test_prune_and_unregistered_rows() {
        let start = Instant::now();
        let mut blink = BlinkState::new(INTERVAL, start);
        blink.register(1);
        blink.register(2);
        blink.prune(&[1]);
        assert_eq!(blink.len(), 1);

        blink.tick(start + INTERVAL);
        assert!(!blink.is_inverted(1));
        assert!(blink.is_inverted(2));
        assert!(!blink.is_inverted(99));
    }
}
