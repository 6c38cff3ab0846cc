//! Universe-global simulated-time source (§4.4).
//!
//! A [`Clock`] maps wall-clock reads onto a simulated timeline that can run
//! faster or slower than real time (`scale`) and can be paused without
//! losing its place. Actors never read [`std::time::Instant`]/[`chrono::Utc`]
//! directly; they go through the `Clock` handle their [`crate::universe::Universe`]
//! hands them, matching the teacher's pattern of threading shared,
//! lock-guarded runtime state through a cloneable handle rather than a
//! global singleton.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A simulated instant. Opaque on purpose: actors compare and subtract but
/// never construct one except via [`Clock::now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(DateTime<Utc>);

impl SimInstant {
    pub fn duration_since(&self, earlier: SimInstant) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Anchor {
    /// Simulated time at the last re-anchor (pause/resume/rescale boundary).
    sim_base: DateTime<Utc>,
    /// Wall time at the last re-anchor.
    wall_base: DateTime<Utc>,
    scale: f64,
    paused: bool,
}

/// Monotonic wall-time-to-simulated-time mapping, shared by every
/// time-dependent actor in a [`crate::universe::Universe`].
#[derive(Clone)]
pub struct Clock {
    inner: Arc<RwLock<Anchor>>,
}

impl Clock {
    /// `epoch` is the simulated instant that corresponds to "now" at
    /// construction time; `scale` is real seconds per simulated second.
    pub fn new(epoch: DateTime<Utc>, scale: f64) -> Self {
        Clock {
            inner: Arc::new(RwLock::new(Anchor {
                sim_base: epoch,
                wall_base: Utc::now(),
                scale,
                paused: false,
            })),
        }
    }

    pub fn real_time() -> Self {
        Self::new(Utc::now(), 1.0)
    }

    pub fn now(&self) -> SimInstant {
        let a = self.inner.read().unwrap();
        if a.paused {
            SimInstant(a.sim_base)
        } else {
            let wall_elapsed = Utc::now() - a.wall_base;
            let sim_elapsed = scale_duration(wall_elapsed, a.scale);
            SimInstant(a.sim_base + sim_elapsed)
        }
    }

    pub fn elapsed(&self, since: SimInstant) -> Duration {
        self.now().duration_since(since)
    }

    pub fn pause(&self) {
        let mut a = self.inner.write().unwrap();
        if !a.paused {
            let now = {
                let wall_elapsed = Utc::now() - a.wall_base;
                a.sim_base + scale_duration(wall_elapsed, a.scale)
            };
            a.sim_base = now;
            a.wall_base = Utc::now();
            a.paused = true;
        }
    }

    pub fn resume(&self) {
        let mut a = self.inner.write().unwrap();
        if a.paused {
            a.wall_base = Utc::now();
            a.paused = false;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().unwrap().paused
    }

    /// Changes scale at the next tick boundary (i.e. immediately, re-anchored
    /// so past elapsed sim time is preserved).
    pub fn rescale(&self, factor: f64) {
        let mut a = self.inner.write().unwrap();
        if !a.paused {
            let wall_elapsed = Utc::now() - a.wall_base;
            a.sim_base = a.sim_base + scale_duration(wall_elapsed, a.scale);
            a.wall_base = Utc::now();
        }
        a.scale = factor;
    }

    /// Converts a simulated-time duration (from `now()`) to a wall-time
    /// duration, accounting for the current scale. Used by the scheduler to
    /// translate `scheduleOnce`/`scheduleRecurring` sim durations into real
    /// `tokio::time::sleep` durations.
    pub fn to_wall_duration(&self, sim_duration: Duration) -> Duration {
        let a = self.inner.read().unwrap();
        if a.scale <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64(sim_duration.as_secs_f64() / a.scale)
    }

    /// Re-anchors simulated time to an arbitrary instant, used by
    /// continuous-time actors (e.g. replay actors) that seed sim time from
    /// the first archived record's timestamp.
    pub fn reset(&self, sim_time: DateTime<Utc>) {
        let mut a = self.inner.write().unwrap();
        a.sim_base = sim_time;
        a.wall_base = Utc::now();
    }
}

fn scale_duration(wall: chrono::Duration, scale: f64) -> chrono::Duration {
    let micros = wall.num_microseconds().unwrap_or(0) as f64 * scale;
    chrono::Duration::microseconds(micros as i64)
}

/// Trait implemented by actors that cache the last-seen simulated time
/// (§4.4 "Continuous-time actor"). The kernel does not require actors to use
/// this trait; it is offered as a reusable building block the way the
/// teacher offers `TimerFactory`/`Scheduler` as opt-in capabilities.
pub trait ContinuousTime {
    fn last_sim_time(&self) -> Option<SimInstant>;
    fn set_last_sim_time(&mut self, t: SimInstant);

    fn to_wall_time_millis(&self, clock: &Clock, sim_millis: i64) -> Duration {
        clock.to_wall_duration(Duration::from_millis(sim_millis.max(0) as u64))
    }
}
