//! Fixed-rate tick scheduling
//!
//! The scheduler only decides *when* a tick is due. The owning loop awaits
//! [`TickScheduler::next_tick`] next to its network events inside
//! `tokio::select!` and runs the tick itself, so there is never more than one
//! tick in flight.

use log::debug;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Backlog after which `Accumulate` gives up catching up and resynchronizes
pub const MAX_CATCH_UP: u32 = 5;

/// What happens to time beyond one period when a tick fires late
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftPolicy {
    /// Reset the reference to the firing instant; late time is lost
    Discard,
    /// Advance the reference by exactly one period; late time counts toward
    /// the next tick
    Accumulate,
}

/// One fired tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Zero-based count of ticks fired so far
    pub index: u64,
    /// Simulation step in seconds, always the nominal period
    pub dt: f32,
    /// Wall time since the previous tick fired
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    policy: DriftPolicy,
    reference: Instant,
    last_fired: Instant,
    fired: u64,
}

impl TickScheduler {
    /// Creates a scheduler firing `tick_rate` times per second. A zero rate is
    /// treated as one tick per second.
    pub fn new(tick_rate: u32, policy: DriftPolicy) -> Self {
        Self::starting_at(tick_rate, policy, Instant::now())
    }

    pub fn starting_at(tick_rate: u32, policy: DriftPolicy, start: Instant) -> Self {
        let period = Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64);
        Self {
            period,
            policy,
            reference: start,
            last_fired: start,
            fired: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn policy(&self) -> DriftPolicy {
        self.policy
    }

    pub fn ticks_fired(&self) -> u64 {
        self.fired
    }

    /// Instant at which the next tick becomes due
    pub fn deadline(&self) -> Instant {
        self.reference + self.period
    }

    /// Fires a tick if one is due at `now`
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        if now < self.deadline() {
            return None;
        }

        match self.policy {
            DriftPolicy::Discard => self.reference = now,
            DriftPolicy::Accumulate => {
                self.reference += self.period;
                let behind = now.saturating_duration_since(self.reference);
                if behind > self.period * MAX_CATCH_UP {
                    debug!(
                        "Tick scheduler {:?} behind, skipping backlog",
                        behind
                    );
                    self.reference = now;
                }
            }
        }

        let elapsed = now.saturating_duration_since(self.last_fired);
        self.last_fired = now;

        let tick = Tick {
            index: self.fired,
            dt: self.period.as_secs_f32(),
            elapsed,
        };
        self.fired += 1;
        Some(tick)
    }

    /// Sleeps until the next tick is due and fires it
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// scheduler untouched.
    pub async fn next_tick(&mut self) -> Tick {
        loop {
            sleep_until(self.deadline()).await;
            if let Some(tick) = self.poll(Instant::now()) {
                return tick;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_period_from_tick_rate() {
        let scheduler = TickScheduler::new(50, DriftPolicy::Discard);
        assert_eq!(scheduler.period(), ms(20));
        assert_eq!(scheduler.policy(), DriftPolicy::Discard);

        let scheduler = TickScheduler::new(0, DriftPolicy::Discard);
        assert_eq!(scheduler.period(), Duration::from_secs(1));
    }

    #[test]
    fn test_no_tick_before_period() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(50, DriftPolicy::Discard, start);

        assert!(scheduler.poll(start).is_none());
        assert!(scheduler.poll(start + ms(19)).is_none());
        assert!(scheduler.poll(start + ms(20)).is_some());
        assert_eq!(scheduler.ticks_fired(), 1);
    }

    #[test]
    fn test_discard_drops_late_time() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(50, DriftPolicy::Discard, start);

        let tick = scheduler.poll(start + ms(35)).unwrap();
        assert_eq!(tick.index, 0);
        assert_eq!(tick.elapsed, ms(35));
        assert_approx_eq!(tick.dt, 0.02, 1e-6);

        // The 15ms of lateness is gone: the next tick is due 20ms after firing
        assert!(scheduler.poll(start + ms(54)).is_none());
        assert!(scheduler.poll(start + ms(55)).is_some());
    }

    #[test]
    fn test_accumulate_carries_late_time() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(50, DriftPolicy::Accumulate, start);

        assert!(scheduler.poll(start + ms(35)).is_some());
        // Reference advanced to 20ms, so the next deadline is 40ms
        assert_eq!(scheduler.deadline(), start + ms(40));
        assert!(scheduler.poll(start + ms(40)).is_some());
    }

    #[test]
    fn test_accumulate_resyncs_after_long_stall() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(50, DriftPolicy::Accumulate, start);

        let now = start + Duration::from_secs(2);
        assert!(scheduler.poll(now).is_some());
        assert_eq!(scheduler.deadline(), now + ms(20));
    }

    #[test]
    fn test_tick_indices_increase() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(100, DriftPolicy::Accumulate, start);

        let indices: Vec<u64> = (1..=5)
            .filter_map(|i| scheduler.poll(start + ms(10 * i)))
            .map(|tick| tick.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_next_tick_waits_for_deadline() {
        let mut scheduler = TickScheduler::new(100, DriftPolicy::Accumulate);
        let before = Instant::now();

        let first = scheduler.next_tick().await;
        let second = scheduler.next_tick().await;

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert!(before.elapsed() >= ms(20));
    }
}
