//! Frame selection: which buffered snapshot to show on this display tick.
//!
//! The front of the queue is the playback cursor. It is either the frame
//! delivered last or, before the first delivery, the oldest snapshot held
//! back as a jitter cushion. A tick delivers the latest due snapshot behind
//! the cursor and drops everything in between:
//!
//! ```text
//!            due (estimated_time + offset <= now)      not yet due
//!   queue:  [cursor] [s1] [s2] [s3]  |  [s4] [s5]
//!   tick:    dropped  dropped dropped ▲ delivered, becomes the new cursor
//! ```

use crate::snapshot_buffer::{Snapshot, SnapshotBuffer};

/// Counters describing playback smoothness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    /// Frames handed to the compositor
    pub delivered: u64,
    
    /// Snapshots dropped without ever being shown
    pub skipped: u64,
    
    /// Ticks that had nothing new to show
    pub idle_ticks: u64,
    
    /// Sequence number of the last delivered frame
    pub last_delivered: Option<u64>,
}

/// Selects at most one snapshot per display tick.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    stats: PlaybackStats,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }
    
    /// Returns the snapshot to render at `now_ms`, if any.
    ///
    /// Nothing is returned, and the queue is left alone, unless at least two
    /// snapshots are due; the front one is never returned. Repeated calls
    /// without new due snapshots therefore return `None`, and no snapshot is
    /// ever returned twice. Cost is linear in the number of due snapshots.
    pub fn next_frame<'b>(
        &mut self,
        buffer: &'b mut SnapshotBuffer,
        now_ms: f64,
    ) -> Option<&'b Snapshot> {
        let due = buffer.due_count(now_ms);
        if due < 2 {
            self.stats.idle_ticks += 1;
            return None;
        }
        
        let front_was_shown = match (buffer.front(), self.stats.last_delivered) {
            (Some(front), Some(last)) => front.num_steps_taken() == last,
            _ => false,
        };
        let dropped = (due - 1) as u64 - u64::from(front_was_shown);
        buffer.discard_front(due - 1);
        
        let selected = buffer.front()?;
        self.stats.delivered += 1;
        self.stats.skipped += dropped;
        self.stats.last_delivered = Some(selected.num_steps_taken());
        Some(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_buffer::{Batch, BufferConfig};
    use crate::test_support::step;
    use proptest::prelude::*;
    
    /// Ingests `seqs` in one batch, then pins the offset so due instants
    /// are exact (`ingest` would otherwise smooth it).
    fn buffer_with(seqs: &[u64], retrieved_at_ms: f64, offset_ms: f64) -> SnapshotBuffer {
        let mut buffer = SnapshotBuffer::default();
        buffer.ingest(Batch {
            steps: seqs.iter().map(|&n| step(n)).collect(),
            retrieved_at_ms,
        });
        buffer.set_offset_ms(offset_ms);
        buffer
    }
    
    fn seq(frame: Option<&Snapshot>) -> Option<u64> {
        frame.map(Snapshot::num_steps_taken)
    }
    
    #[test]
    fn test_empty_queue_renders_nothing() {
        let mut buffer = SnapshotBuffer::default();
        let mut clock = PlaybackClock::new();
        assert!(clock.next_frame(&mut buffer, 1e9).is_none());
        assert_eq!(clock.stats().idle_ticks, 1);
    }
    
    #[test]
    fn test_fixture_offset_survives_ingest() {
        let buffer = buffer_with(&[10, 11, 12, 13, 14], 1000.0, 1000.0);
        assert_eq!(buffer.offset_ms(), 1000.0);
        let stamps: Vec<f64> = buffer.iter().map(|s| s.estimated_time_ms).collect();
        assert_eq!(stamps, vec![936.0, 952.0, 968.0, 984.0, 1000.0]);
    }
    
    #[test]
    fn test_future_snapshots_are_left_untouched() {
        // Stamped 936..1000, offset 1000: earliest due at 1936.
        let mut buffer = buffer_with(&[10, 11, 12, 13, 14], 1000.0, 1000.0);
        let mut clock = PlaybackClock::new();
        
        assert!(clock.next_frame(&mut buffer, 1935.0).is_none());
        assert_eq!(buffer.len(), 5);
    }
    
    #[test]
    fn test_single_due_snapshot_is_held_as_cushion() {
        let mut buffer = buffer_with(&[10, 11, 12, 13, 14], 1000.0, 1000.0);
        let mut clock = PlaybackClock::new();
        
        assert!(clock.next_frame(&mut buffer, 1936.0).is_none());
        assert_eq!(buffer.len(), 5);
        
        assert_eq!(seq(clock.next_frame(&mut buffer, 1952.0)), Some(11));
        assert_eq!(buffer.len(), 4);
    }
    
    #[test]
    fn test_latest_due_snapshot_wins_and_older_are_dropped() {
        let mut buffer = buffer_with(&[10, 11, 12, 13, 14], 1000.0, 1000.0);
        let mut clock = PlaybackClock::new();
        
        // 10, 11, 12, 13 are due.
        assert_eq!(seq(clock.next_frame(&mut buffer, 1990.0)), Some(13));
        let remaining: Vec<u64> = buffer.iter().map(Snapshot::num_steps_taken).collect();
        assert_eq!(remaining, vec![13, 14]);
        assert_eq!(clock.stats().skipped, 3);
        assert_eq!(clock.stats().delivered, 1);
    }
    
    #[test]
    fn test_idempotent_between_arrivals() {
        let mut buffer = buffer_with(&[10, 11, 12, 13, 14], 1000.0, 1000.0);
        let mut clock = PlaybackClock::new();
        
        assert_eq!(seq(clock.next_frame(&mut buffer, 1990.0)), Some(13));
        for _ in 0..5 {
            assert!(clock.next_frame(&mut buffer, 1990.0).is_none());
        }
        assert_eq!(seq(clock.next_frame(&mut buffer, 2000.0)), Some(14));
        assert_eq!(clock.stats().skipped, 3);
        assert!(clock.next_frame(&mut buffer, 5000.0).is_none());
    }
    
    #[test]
    fn test_offset_delays_delivery() {
        let mut late = buffer_with(&[1, 2, 3], 0.0, 500.0);
        let mut early = buffer_with(&[1, 2, 3], 0.0, 16.0);
        let mut clock = PlaybackClock::new();
        
        assert!(clock.next_frame(&mut late, 100.0).is_none());
        assert_eq!(seq(PlaybackClock::new().next_frame(&mut early, 100.0)), Some(3));
    }
    
    proptest! {
        #[test]
        fn prop_delivery_is_monotonic_and_at_most_once(
            batches in prop::collection::vec(0usize..12, 1..20),
            ticks_per_fetch in 1usize..40,
        ) {
            let mut buffer = SnapshotBuffer::new(BufferConfig {
                initial_offset_ms: 50.0,
                ..Default::default()
            });
            let mut clock = PlaybackClock::new();
            let mut next_seq = 1u64;
            let mut now = 0.0;
            let mut delivered: Vec<u64> = Vec::new();
            
            for size in batches {
                let steps = (0..size).map(|_| { next_seq += 1; step(next_seq) }).collect();
                buffer.ingest(Batch { steps, retrieved_at_ms: now });
                prop_assert!(buffer.offset_ms() >= 16.0 * size as f64 - 1e-6);
                
                for _ in 0..ticks_per_fetch {
                    now += 16.0;
                    if let Some(frame) = clock.next_frame(&mut buffer, now) {
                        delivered.push(frame.num_steps_taken());
                    }
                    let before = buffer.len();
                    prop_assert!(clock.next_frame(&mut buffer, now).is_none());
                    prop_assert_eq!(buffer.len(), before);
                }
            }
            
            for pair in delivered.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
        
        #[test]
        fn prop_batch_stamps_strictly_increase(size in 1usize..64, at in 0.0f64..1e6) {
            let buffer = SnapshotBuffer::default();
            let stamped = buffer.stamp(Batch {
                steps: (0..size as u64).map(step).collect(),
                retrieved_at_ms: at,
            });
            prop_assert_eq!(stamped.last().unwrap().estimated_time_ms, at);
            for pair in stamped.windows(2) {
                prop_assert!((pair[1].estimated_time_ms - pair[0].estimated_time_ms - 16.0).abs() < 1e-6);
            }
        }
    }
}
