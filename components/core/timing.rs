/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Per-frame timing counters. spec.md §6 names the set; the original
//! accumulates them in `icetStateResetTiming` and per-operation
//! increments scattered through `draw.c`. `FrameTimer` centralizes the
//! accumulation so the frame driver can reset it in one call per spec.md
//! §4.6 step 1.

use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameTimer {
    pub render: Duration,
    pub buffer_read: Duration,
    pub buffer_write: Duration,
    pub compress: Duration,
    pub compare_blend: Duration,
    pub composite: Duration,
    pub total_draw: Duration,
    pub bytes_sent: u64,
}

impl FrameTimer {
    pub fn reset(&mut self) {
        *self = FrameTimer::default();
    }
}

/// A running clock for one counter; accumulates into `FrameTimer` on
/// drop via [`Stopwatch::stop_into`] rather than an RAII guard, since the
/// frame driver only ever wants a handful of explicit start/stop pairs
/// rather than scope-based timing.
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Stopwatch {
            start: Instant::now(),
        }
    }

    pub fn stop_into(self, accumulator: &mut Duration) {
        *accumulator += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let mut timer = FrameTimer {
            bytes_sent: 128,
            ..FrameTimer::default()
        };
        timer.render = Duration::from_millis(5);
        timer.reset();
        assert_eq!(timer, FrameTimer::default());
    }
}
