/*
  Corvid, a UCI-compatible chess engine.

  This program is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  This program is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.
*/
//! Time management: deciding how long to search, and polling the clock while
//! searching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Moves before which `calculate_search_time`'s quadratic divide front-loads
/// less time (fewer moves played means more game left to budget for).
const HALF: f64 = 35.0;
/// `(HALF * HALF) / 50`, the divide function's quadratic coefficient.
const COEFF: f64 = (HALF * HALF) / 50.0;
const SMALLEST_DIVIDE: f64 = 8.0;
/// Safety margin subtracted from a computed search time, to leave room for
/// UCI round-trip and the last iteration's overrun.
const SAFETY_BUFFER_MS: u64 = 100;

/// How many nodes the search counts between polls of the clock.
pub const NODES_PER_TIME_POLL: u64 = 2048;

#[derive(Clone, Copy)]
/// The UCI `go` time-control parameters relevant to one side.
pub struct TimeControl {
    pub moves_to_go: Option<u32>,
    pub time_left_ms: u64,
    pub increment_ms: u64,
    pub move_number: u32,
}

/// How much time, in milliseconds, to allot the upcoming search, following
/// the usual sudden-death/moves-to-go rules.
#[must_use]
pub fn calculate_search_time(tc: TimeControl) -> u64 {
    let inc_half = tc.increment_ms / 2;
    let raw_ms = match tc.moves_to_go {
        Some(moves) if moves > 0 => tc.time_left_ms / u64::from(moves) + inc_half,
        _ => {
            let n = f64::from(tc.move_number);
            let divide = if n <= HALF {
                (n - HALF).powi(2) / COEFF + SMALLEST_DIVIDE
            } else {
                2.0 * (n - HALF) / COEFF + SMALLEST_DIVIDE
            };
            (tc.time_left_ms as f64 / divide) as u64 + inc_half
        }
    };

    if raw_ms > SAFETY_BUFFER_MS {
        raw_ms - SAFETY_BUFFER_MS
    } else {
        raw_ms
    }
}

/// Tracks elapsed wall time for a single search and whether it has been
/// asked to stop, either by timeout or by an explicit UCI `stop`.
///
/// `stopped` is a shared flag rather than a plain `bool`: the search runs on
/// its own thread and the main UCI loop interrupts it by setting
/// `timer.stopped` from the outside, via a [`StopHandle`] cloned off this
/// timer before the search thread takes ownership of it.
pub struct Timer {
    search_time: Option<Duration>,
    infinite: bool,
    stopped: Arc<AtomicBool>,
    start_time: Instant,
}

impl Timer {
    #[must_use]
    /// A timer bounded to `search_time_ms` milliseconds.
    pub fn bounded(search_time_ms: u64) -> Timer {
        Timer {
            search_time: Some(Duration::from_millis(search_time_ms)),
            infinite: false,
            stopped: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    /// A timer with no time limit; only an explicit `stop()` ends the search.
    pub fn infinite() -> Timer {
        Timer {
            search_time: None,
            infinite: true,
            stopped: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    /// A handle the main thread can use to stop this timer's search from the
    /// outside, once this timer has been moved onto a search thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stopped))
    }

    /// Record the search's start time. Call once, immediately before the
    /// first iterative-deepening iteration.
    pub fn start(&mut self) {
        self.start_time = Instant::now();
        self.stopped.store(false, Ordering::Relaxed);
    }

    /// Force the search to stop at the next poll.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Poll the clock, latching `stopped` if the allotted time has passed.
    /// No-op for an infinite timer.
    pub fn update(&mut self) {
        if self.infinite || self.stopped.load(Ordering::Relaxed) {
            return;
        }
        if let Some(limit) = self.search_time {
            if self.start_time.elapsed() >= limit {
                self.stopped.store(true, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// A cloneable, `Send` handle onto a [`Timer`]'s stop flag, used to cancel a
/// search running on another thread: the main thread interrupts by setting
/// `timer.stopped`.
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Signal the timer this handle was cloned from to stop at its next poll.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_to_go_splits_remaining_time_evenly() {
        let ms = calculate_search_time(TimeControl {
            moves_to_go: Some(10),
            time_left_ms: 10_000,
            increment_ms: 0,
            move_number: 1,
        });
        // 10000 / 10 = 1000, minus the 100ms safety buffer.
        assert_eq!(ms, 900);
    }

    #[test]
    fn sudden_death_uses_more_of_the_clock_near_move_one() {
        let early = calculate_search_time(TimeControl {
            moves_to_go: None,
            time_left_ms: 60_000,
            increment_ms: 0,
            move_number: 1,
        });
        let mid = calculate_search_time(TimeControl {
            moves_to_go: None,
            time_left_ms: 60_000,
            increment_ms: 0,
            move_number: 35,
        });
        // move 35 is the divide function's minimum (divide==8), so it should
        // allot more time per move than move 1, where divide is much larger.
        assert!(mid > early);
    }

    #[test]
    fn infinite_timer_never_stops_itself() {
        let mut timer = Timer::infinite();
        timer.start();
        timer.update();
        assert!(!timer.is_stopped());
    }

    #[test]
    fn bounded_timer_stops_after_zero_ms() {
        let mut timer = Timer::bounded(0);
        timer.start();
        std::thread::sleep(Duration::from_millis(1));
        timer.update();
        assert!(timer.is_stopped());
    }

    #[test]
    fn explicit_stop_latches_immediately() {
        let mut timer = Timer::bounded(60_000);
        timer.start();
        timer.stop();
        assert!(timer.is_stopped());
    }

    #[test]
    fn stop_handle_reaches_across_threads() {
        let mut timer = Timer::infinite();
        let handle = timer.stop_handle();
        timer.start();
        let t = std::thread::spawn(move || {
            handle.stop();
        });
        t.join().unwrap();
        timer.update();
        assert!(timer.is_stopped());
    }
}
