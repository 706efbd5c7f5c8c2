//! Trailing-edge debounce for high-frequency events (wheel/scroll).
//!
//! Every offer adds into the class's running sums and pushes its deadline out
//! by the quiet period. A window is emitted once its deadline passes with no
//! new offer, and resets to zero at that instant. Classes never share a window.
//!
//! The coalescer is clocked by the caller, so it holds no timers itself; the
//! dispatcher arms a `tokio` sleep per offer and polls on wake-up.

use std::collections::HashMap;
use std::time::Duration;

use capture_core::types::EventClass;
use tokio::time::Instant;

/// Summed deltas of one emitted window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregatedDelta {
    pub delta_x: f64,
    pub delta_y: f64,
    /// Raw events folded into this aggregate.
    pub count: usize,
}

#[derive(Debug, Default)]
struct CoalesceWindow {
    delta_x: f64,
    delta_y: f64,
    count: usize,
    deadline: Option<Instant>,
}

impl CoalesceWindow {
    fn take(&mut self) -> AggregatedDelta {
        let out = AggregatedDelta {
            delta_x: self.delta_x,
            delta_y: self.delta_y,
            count: self.count,
        };
        *self = CoalesceWindow::default();
        out
    }

    fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug)]
pub struct Coalescer {
    quiet_period: Duration,
    windows: HashMap<EventClass, CoalesceWindow>,
}

impl Coalescer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            windows: HashMap::new(),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Fold `(delta_x, delta_y)` into the window of `class` and restart its
    /// quiet period.
    ///
    /// Returns the previous aggregate if that window had already gone quiet
    /// but was never polled; it belongs to an earlier burst and must be
    /// emitted before this one.
    pub fn offer(
        &mut self,
        class: EventClass,
        delta: (f64, f64),
        now: Instant,
    ) -> Option<AggregatedDelta> {
        let window = self.windows.entry(class).or_default();
        let stale = window.expired(now).then(|| window.take());

        window.delta_x += delta.0;
        window.delta_y += delta.1;
        window.count += 1;
        window.deadline = Some(now + self.quiet_period);
        stale
    }

    /// Emit and reset every window whose quiet period has elapsed.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<(EventClass, AggregatedDelta)> {
        let mut ready: Vec<_> = self
            .windows
            .iter_mut()
            .filter(|(_, window)| window.expired(now))
            .map(|(class, window)| (*class, window.take()))
            .collect();
        ready.sort_by_key(|(class, _)| *class);
        ready
    }

    /// Earliest pending deadline across all windows.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.windows.values().filter_map(|w| w.deadline).min()
    }

    pub fn pending(&self, class: EventClass) -> bool {
        self.windows
            .get(&class)
            .is_some_and(|w| w.deadline.is_some())
    }

    /// Emit every pending window regardless of its deadline (teardown).
    pub fn flush_all(&mut self) -> Vec<(EventClass, AggregatedDelta)> {
        let mut ready: Vec<_> = self
            .windows
            .iter_mut()
            .filter(|(_, window)| window.deadline.is_some())
            .map(|(class, window)| (*class, window.take()))
            .collect();
        ready.sort_by_key(|(class, _)| *class);
        ready
    }
}
