//! Simulated progress for long backend calls.
//!
//! The percentage is cosmetic: it advances on a timer while the request is in
//! flight, stops at a cap below 100, and only reaches 100 once the call
//! resolves. The backend reports no real progress.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Timer-driven, never reaches 100.
    Indeterminate,
    /// The call resolved; the value is final.
    Determinate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedProgress {
    percent: u8,
    step: u8,
    cap: u8,
    phase: Phase,
}

impl SimulatedProgress {
    /// `cap` is clamped to 99 and `step` to at least 1.
    pub fn new(step: u8, cap: u8) -> Self {
        Self {
            percent: 0,
            step: step.max(1),
            cap: cap.min(99),
            phase: Phase::Indeterminate,
        }
    }

    pub fn from_config(cfg: &config::Progress) -> Self {
        Self::new(cfg.step, cfg.cap)
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance one step, saturating at the cap. No-op once determinate.
    pub fn tick(&mut self) -> u8 {
        if self.phase == Phase::Indeterminate {
            self.percent = self.percent.saturating_add(self.step).min(self.cap);
        }
        self.percent
    }

    pub fn complete(&mut self) -> u8 {
        self.phase = Phase::Determinate;
        self.percent = 100;
        self.percent
    }
}

/// Drive `progress` on `every` while `fut` runs; report each change through
/// `on_update`. The final update (100) is sent after `fut` resolves,
/// whatever its outcome. `every` is raised to at least 1ms.
pub async fn track<F, T, U>(
    fut: F,
    every: Duration,
    progress: &mut SimulatedProgress,
    mut on_update: U,
) -> T
where
    F: Future<Output = T>,
    U: FnMut(u8),
{
    tokio::pin!(fut);
    let every = every.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let out = loop {
        tokio::select! {
            out = &mut fut => break out,
            _ = ticker.tick() => {
                let before = progress.percent();
                let now = progress.tick();
                if now != before {
                    on_update(now);
                }
            }
        }
    };
    on_update(progress.complete());
    out
}
