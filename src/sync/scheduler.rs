//! Poll scheduler
//!
//! Owns the single repeating timer. `start` runs one cycle immediately,
//! then arms the timer; `stop` cancels the timer only, so cycles already
//! running finish on their own.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Work performed on every scheduler tick
#[async_trait]
pub trait PollCycle: Send + Sync + 'static {
    async fn poll_cycle(self: Arc<Self>);
}

#[derive(Default)]
struct PollingState {
    is_polling: bool,
    /// Bumped on every start so a stale start cannot arm a timer
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Returns the scheduler to idle if `start` is dropped before arming its timer
struct StartGuard<'a> {
    state: &'a Mutex<PollingState>,
    generation: u64,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_polling && state.generation == self.generation && state.timer.is_none() {
            state.is_polling = false;
            tracing::warn!("Polling start cancelled before the timer was armed");
        }
    }
}

/// Two-state (idle / polling) timer driver
pub struct Scheduler {
    interval: Duration,
    state: Mutex<PollingState>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(PollingState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_polling(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_polling
    }

    /// Idle → Polling
    ///
    /// Runs one cycle before arming the timer. Returns false (and does
    /// nothing) if already polling.
    pub async fn start<T: PollCycle>(&self, target: Arc<T>) -> bool {
        let generation = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_polling {
                tracing::debug!("Polling already active");
                return false;
            }
            state.is_polling = true;
            state.generation += 1;
            state.generation
        };

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting balance polling"
        );

        let mut guard = StartGuard {
            state: &self.state,
            generation,
            armed: false,
        };

        Arc::clone(&target).poll_cycle().await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_polling || state.generation != generation {
            // Stopped (or restarted) while the first cycle ran
            guard.armed = true;
            return true;
        }

        let interval = self.interval;
        state.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                tracing::debug!("Running scheduled balance poll");
                // Detached so cancelling the timer never cancels a running cycle
                tokio::spawn(Arc::clone(&target).poll_cycle());
            }
        }));
        guard.armed = true;

        true
    }

    /// Polling → Idle
    ///
    /// Returns false if already idle.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_polling {
            return false;
        }

        state.is_polling = false;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        tracing::info!("Stopped balance polling");
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}
