//! Per-attempt sessions, throughput sampling, and the clock they read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Speed and remaining-time estimate derived from two progress samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    /// Bytes per second.
    pub speed: f64,
    /// Seconds remaining.
    pub eta: f64,
}

/// Sliding sampling window over progress reports.
#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    started_at: Instant,
    last_percent: f64,
    last_sample: Instant,
}

impl ThroughputSampler {
    /// Window opened at `now` with zero progress.
    pub fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            last_percent: 0.0,
            last_sample: now,
        }
    }

    /// When the attempt started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Fold in a progress report for a file of `total_bytes`.
    ///
    /// Returns an estimate only when time has passed and progress moved forward since the
    /// last accepted sample; the window then restarts at this sample. Otherwise the window is
    /// left untouched.
    pub fn observe(&mut self, percent: f64, now: Instant, total_bytes: u64) -> Option<Throughput> {
        let elapsed = now.saturating_duration_since(self.last_sample).as_secs_f64();
        let delta = percent - self.last_percent;
        if elapsed <= 0.0 || delta <= 0.0 || total_bytes == 0 {
            return None;
        }
        let total = total_bytes as f64;
        let speed = (delta / 100.0 * total) / elapsed;
        let eta = total * (1.0 - percent / 100.0) / speed;
        self.last_percent = percent;
        self.last_sample = now;
        Some(Throughput {
            speed,
            eta: eta.max(0.0),
        })
    }
}

/// Cancellation handle and sampling window bound to one attempt.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    token: CancellationToken,
    sampler: ThroughputSampler,
}

impl UploadSession {
    /// Open a session at `now`.
    pub fn start(now: Instant) -> Self {
        Self {
            id: SessionId::new(),
            token: CancellationToken::new(),
            sampler: ThroughputSampler::new(now),
        }
    }

    /// Session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Token handed to the transport.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Sampling window.
    pub fn sampler_mut(&mut self) -> &mut ThroughputSampler {
        &mut self.sampler
    }

    /// Signal the transport to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn half_of_ten_megabytes_in_two_seconds() {
        let clock = ManualClock::new();
        let mut sampler = ThroughputSampler::new(clock.now());
        clock.advance(Duration::from_secs(2));

        let sample = sampler.observe(50.0, clock.now(), 10 * MB).unwrap();
        let expected_speed = 2.5 * MB as f64;
        assert!((sample.speed - expected_speed).abs() < 1.0);
        assert!((sample.eta - 2.0).abs() < 1e-9);
    }

    #[test]
    fn skips_samples_without_elapsed_time_or_progress() {
        let clock = ManualClock::new();
        let mut sampler = ThroughputSampler::new(clock.now());
        assert!(sampler.observe(10.0, clock.now(), MB).is_none());

        clock.advance(Duration::from_secs(1));
        assert!(sampler.observe(10.0, clock.now(), MB).is_some());
        clock.advance(Duration::from_secs(1));
        assert!(sampler.observe(5.0, clock.now(), MB).is_none());
        assert!(sampler.observe(10.0, clock.now(), MB).is_none());
    }

    #[test]
    fn window_restarts_after_accepted_sample() {
        let clock = ManualClock::new();
        let mut sampler = ThroughputSampler::new(clock.now());
        clock.advance(Duration::from_secs(1));
        sampler.observe(10.0, clock.now(), 100).unwrap();

        clock.advance(Duration::from_secs(4));
        let sample = sampler.observe(30.0, clock.now(), 100).unwrap();
        assert!((sample.speed - 5.0).abs() < 1e-9);
        assert!((sample.eta - 14.0).abs() < 1e-9);
    }

    #[test]
    fn cancelling_session_fires_token() {
        let session = UploadSession::start(Instant::now());
        let token = session.token().clone();
        session.cancel();
        assert!(token.is_cancelled());
        assert_ne!(session.id(), UploadSession::start(Instant::now()).id());
    }
}
