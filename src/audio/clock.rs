//! Playback position tracking for streamed music
//!
//! Position is measured in samples handed to the buffer ring, not samples
//! the hardware has audibly played, so it runs ahead of the speaker by
//! whatever is queued.

/// Consumed/total sample counters for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    total_samples: u64,
    remaining_samples: u64,
    sample_rate: u32,
    channels: u16,
    loops_completed: u64,
}

impl PlaybackClock {
    pub fn new(total_samples: u64, sample_rate: u32, channels: u16) -> Self {
        Self {
            total_samples,
            remaining_samples: total_samples,
            sample_rate,
            channels,
            loops_completed: 0,
        }
    }

    /// Record `samples` handed to a buffer. Never goes below zero.
    pub fn consume(&mut self, samples: u64) {
        self.remaining_samples = self.remaining_samples.saturating_sub(samples);
    }

    /// Reset to the start of the stream for the next loop cycle
    pub fn restart(&mut self) {
        self.remaining_samples = self.total_samples;
        self.loops_completed += 1;
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn remaining_samples(&self) -> u64 {
        self.remaining_samples
    }

    pub fn consumed_samples(&self) -> u64 {
        self.total_samples - self.remaining_samples
    }

    /// Number of times the stream wrapped back to its start
    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }

    fn samples_per_second(&self) -> f32 {
        self.sample_rate as f32 * self.channels as f32
    }

    pub fn elapsed_seconds(&self) -> f32 {
        let rate = self.samples_per_second();
        if rate == 0.0 {
            return 0.0;
        }
        self.consumed_samples() as f32 / rate
    }

    pub fn total_seconds(&self) -> f32 {
        let rate = self.samples_per_second();
        if rate == 0.0 {
            return 0.0;
        }
        self.total_samples as f32 / rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_elapsed_and_total() {
        let mut clock = PlaybackClock::new(441_000, 44100, 2);
        assert_eq!(clock.total_seconds(), 5.0);
        assert_eq!(clock.elapsed_seconds(), 0.0);

        clock.consume(88_200);
        assert_eq!(clock.elapsed_seconds(), 1.0);
    }

    #[test]
    fn test_consume_clamps_at_zero() {
        let mut clock = PlaybackClock::new(100, 10, 1);
        clock.consume(80);
        clock.consume(80);
        assert_eq!(clock.remaining_samples(), 0);
        assert_eq!(clock.elapsed_seconds(), 10.0);
    }

    #[test]
    fn test_restart_counts_loops() {
        let mut clock = PlaybackClock::new(100, 10, 1);
        clock.consume(100);
        clock.restart();
        assert_eq!(clock.remaining_samples(), 100);
        assert_eq!(clock.loops_completed(), 1);
        assert_eq!(clock.elapsed_seconds(), 0.0);
    }

    #[test]
    fn test_zero_rate_is_harmless() {
        let clock = PlaybackClock::new(100, 0, 0);
        assert_eq!(clock.elapsed_seconds(), 0.0);
        assert_eq!(clock.total_seconds(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_elapsed_is_monotonic_and_bounded(
            total in 1u64..1_000_000,
            chunks in prop::collection::vec(0u64..50_000, 1..64),
        ) {
            let mut clock = PlaybackClock::new(total, 44100, 2);
            let mut last = clock.elapsed_seconds();
            for chunk in chunks {
                clock.consume(chunk);
                let now = clock.elapsed_seconds();
                prop_assert!(now >= last);
                prop_assert!(clock.remaining_samples() <= total);
                prop_assert!(now <= clock.total_seconds());
                last = now;
            }
        }
    }
}
