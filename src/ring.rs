// Sounding Rocket Program
//
// The in-memory per-sensor append-only sample log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sensor::Reading;

/// One sensor readout: a 1-based monotonic serial, a wall-clock timestamp in
/// fractional seconds since the UNIX epoch, and the readout value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub serial: u64,
    pub timestamp: f64,
    pub reading: Reading,
}

/// Current wall-clock time as fractional seconds since the UNIX epoch, used
/// for the persisted `timestamp` column only (never for deadline math).
pub fn wall_clock_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the UNIX epoch")
        .as_secs_f64()
}

/// Append-only log with a `save_end` watermark marking the persisted prefix.
///
/// Single writer (the paired [`crate::sampler::SamplerTask`]), single reader
/// (the paired [`crate::autosave::AutosaveTask`]). The writer only ever grows
/// the backing vector; the reader only ever advances `save_end`. The `Mutex`
/// exists to make the handoff safe across the writer/reader thread boundary,
/// not to arbitrate contention between multiple writers or readers.
pub struct SampleRing {
    samples: Mutex<Vec<Sample>>,
    save_end: AtomicUsize,
}

impl SampleRing {
    pub fn new() -> SampleRing {
        SampleRing {
            samples: Mutex::new(Vec::new()),
            save_end: AtomicUsize::new(0),
        }
    }

    /// Append one sample, returning the serial assigned to it.
    pub fn append(&self, reading: Reading) -> u64 {
        let mut samples = self.samples.lock().expect("sample ring mutex poisoned");
        let serial = samples.len() as u64 + 1;
        samples.push(Sample {
            serial,
            timestamp: wall_clock_now(),
            reading,
        });
        serial
    }

    /// Total number of samples appended so far.
    pub fn len(&self) -> usize {
        self.samples.lock().expect("sample ring mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the half-open range `[save_end, length)` and advance `save_end`
    /// to `length`. Called only by the paired `AutosaveTask`.
    pub fn drain_tail(&self) -> Vec<Sample> {
        let samples = self.samples.lock().expect("sample ring mutex poisoned");
        let start = self.save_end.load(Ordering::Acquire);
        let end = samples.len();
        let tail = samples[start..end].to_vec();
        self.save_end.store(end, Ordering::Release);
        tail
    }

    /// Same as [`SampleRing::drain_tail`], used once at shutdown to flush
    /// whatever remains unpersisted.
    pub fn final_tail(&self) -> Vec<Sample> {
        self.drain_tail()
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        SampleRing::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_start_at_one_and_increase_by_one() {
        let ring = SampleRing::new();
        for _ in 0..5 {
            ring.append(Reading::Scalar(0));
        }
        let tail = ring.drain_tail();
        let serials: Vec<u64> = tail.iter().map(|s| s.serial).collect();
        assert_eq!(serials, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn drain_tail_only_returns_unpersisted_samples() {
        let ring = SampleRing::new();
        ring.append(Reading::Scalar(1));
        ring.append(Reading::Scalar(2));
        let first = ring.drain_tail();
        assert_eq!(first.len(), 2);

        ring.append(Reading::Scalar(3));
        let second = ring.drain_tail();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].serial, 3);

        // nothing new appended: drain returns empty, not a repeat
        let third = ring.drain_tail();
        assert!(third.is_empty());
    }

    #[test]
    fn final_tail_captures_everything_not_yet_saved() {
        let ring = SampleRing::new();
        for _ in 0..3 {
            ring.append(Reading::Scalar(7));
        }
        ring.drain_tail();
        ring.append(Reading::Scalar(8));
        ring.append(Reading::Scalar(9));
        let tail = ring.final_tail();
        assert_eq!(tail.len(), 2);
        assert_eq!(ring.len(), 5);
    }

    proptest::proptest! {
        #[test]
        fn serials_are_monotone_across_random_append_drain_interleavings(
            ops in proptest::collection::vec(proptest::bool::ANY, 0..200)
        ) {
            let ring = SampleRing::new();
            let mut collected: Vec<u64> = Vec::new();
            for do_drain in ops {
                ring.append(Reading::Scalar(0));
                if do_drain {
                    collected.extend(ring.drain_tail().iter().map(|s| s.serial));
                }
            }
            collected.extend(ring.final_tail().iter().map(|s| s.serial));

            for window in collected.windows(2) {
                assert!(window[1] == window[0] + 1);
            }
            if let Some(first) = collected.first() {
                assert_eq!(*first, 1);
            }
        }
    }
}
