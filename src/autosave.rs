// Sounding Rocket Program
//
// Periodic durable flush of one sensor's unpersisted tail to its CSV stream.
// Opens, writes and closes the file every window so a sudden power loss never
// loses more than one `AUTOSAVE_INTERVAL` of samples.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::csv_log::append_autosave_block;
use crate::error::Error;
use crate::ring::{wall_clock_now, SampleRing};

/// Fixed by specification, not configurable.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(1);

pub struct AutosaveTask {
    handle: JoinHandle<()>,
}

impl AutosaveTask {
    pub fn spawn(ring: Arc<SampleRing>, path: PathBuf, stop: Arc<AtomicBool>) -> AutosaveTask {
        let handle = thread::spawn(move || run(ring, path, stop));
        AutosaveTask { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }
}

fn run(ring: Arc<SampleRing>, path: PathBuf, stop: Arc<AtomicBool>) {
    let mut sequence: u64 = 0;
    let mut next_call = Instant::now() + AUTOSAVE_INTERVAL;
    thread::sleep(AUTOSAVE_INTERVAL);

    while !stop.load(Ordering::Acquire) {
        let window_start = Instant::now();
        sequence += 1;

        let tail = ring.drain_tail();
        let header = format!("#### {:.6} autosave nr {}", wall_clock_now(), sequence);
        let elapsed = window_start.elapsed().as_secs_f64();
        let trailer = format!("# autosave took {:.6}", elapsed);

        if let Err(e) = append_autosave_block(&path, &header, &tail, &trailer) {
            let fault = Error::PersistenceFailure(format!("{}: {}", path.display(), e));
            warn!("autosave write failed, will retry next window: {}", fault);
        }

        next_call += AUTOSAVE_INTERVAL;
        let now = Instant::now();
        if next_call > now {
            thread::sleep(next_call - now);
        }
    }
}

/// Flush whatever remains unpersisted, with a final trailer row, once at
/// shutdown after `stop` has been observed by every worker.
pub fn final_flush(ring: &SampleRing, path: &std::path::Path) -> Result<(), crate::error::Error> {
    let tail = ring.final_tail();
    let trailer = format!("# final save at {:.6}", wall_clock_now());
    append_autosave_block(path, &trailer, &tail, "# end of run")
}
