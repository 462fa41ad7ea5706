//! Screensaver mode manager and watchdog

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use strum::IntoEnumIterator;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::models;

mod cycle;
mod dim;
mod disco;
mod failure;
mod mode;
mod pulsate;
mod timers;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::CycleOrder;
pub use disco::DiscoPicker;
pub use failure::FailureTracker;
pub use mode::{Mode, ModeContext, ModeError, ModeKind};
pub use pulsate::{Phase, PulseState};
pub use timers::TimerRegistry;

/// What a watchdog check did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    NoAction,
    Restarted(ModeKind),
    Switched { from: ModeKind, to: ModeKind },
}

struct ActiveMode {
    kind: ModeKind,
    mode: Box<dyn Mode>,
    activated_at: Instant,
}

#[derive(Default)]
struct ManagerState {
    active: Option<ActiveMode>,
    start_errors: u32,
    stall_incidents: u32,
    /// Bumped on every activation
    generation: u64,
}

/// Owns the running screensaver mode, if any
///
/// Every lifecycle change happens under one lock, so at most one mode runs at a time.
#[derive(Clone)]
pub struct ModeManager {
    state: Arc<Mutex<ManagerState>>,
    ctx: ModeContext,
    config: Arc<models::Screensaver>,
    progress: watch::Receiver<Instant>,
}

impl ModeManager {
    pub fn new(ctx: ModeContext) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::default())),
            config: ctx.config.clone(),
            progress: ctx.progress(),
            ctx,
        }
    }

    /// Start a mode by name, unknown names start the default mode
    #[instrument(skip(self))]
    pub async fn start_mode(&self, name: &str) -> Result<ModeKind, ModeError> {
        let kind = ModeKind::from_name(name);
        let mut state = self.state.lock().await;
        state.stall_incidents = 0;
        self.activate(&mut state, kind).await
    }

    /// Stop the active mode, the manager is idle afterwards even if stopping failed
    #[instrument(skip(self))]
    pub async fn stop_mode(&self) {
        let mut state = self.state.lock().await;
        Self::stop_active(&mut state).await;
    }

    pub async fn active_mode(&self) -> Option<ModeKind> {
        self.state.lock().await.active.as_ref().map(|active| active.kind)
    }

    async fn stop_active(state: &mut ManagerState) {
        if let Some(mut active) = state.active.take() {
            if let Err(error) = active.mode.stop().await {
                warn!(mode = %active.kind, error = %error, "stopping mode failed");
            }
        }
    }

    fn activate<'a>(
        &'a self,
        state: &'a mut ManagerState,
        kind: ModeKind,
    ) -> BoxFuture<'a, Result<ModeKind, ModeError>> {
        async move {
            Self::stop_active(state).await;

            state.generation += 1;
            let generation = state.generation;
            let mut mode = kind.build(self.ctx.clone());
            let activated_at = Instant::now();

            match mode.start().await {
                Ok(()) => {
                    state.active = Some(ActiveMode {
                        kind,
                        mode,
                        activated_at,
                    });
                    state.start_errors = 0;
                    Ok(kind)
                }
                Err(error) => {
                    state.start_errors += 1;
                    error!(mode = %kind, error = %error, errors = state.start_errors, "starting mode failed");

                    // Release whatever the mode spawned before failing
                    mode.stop().await.ok();

                    if kind != ModeKind::default() && state.start_errors > self.config.max_start_errors
                    {
                        self.schedule_fallback(generation);
                    }

                    Err(error)
                }
            }
        }
        .boxed()
    }

    /// Start the default mode after a delay, unless another mode was started meanwhile
    fn schedule_fallback(&self, generation: u64) {
        let this = self.clone();
        let delay = self.config.fallback_delay();
        warn!(delay = ?delay, "too many start errors, falling back to {}", ModeKind::default());

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut state = this.state.lock().await;
            if state.generation == generation && state.active.is_none() {
                this.activate(&mut state, ModeKind::default()).await.ok();
            }
        });
    }

    /// Restart or replace the active mode if it made no progress for too long
    #[instrument(skip(self))]
    pub async fn check_watchdog(&self, now: Instant) -> WatchdogAction {
        let mut state = self.state.lock().await;

        let (kind, activated_at) = match &state.active {
            Some(active) => (active.kind, active.activated_at),
            None => return WatchdogAction::NoAction,
        };

        let last_progress = *self.progress.borrow();
        let since = now.saturating_duration_since(activated_at.max(last_progress));

        if since <= self.config.stale_after() {
            trace!(mode = %kind, since = ?since, "mode is healthy");
            return WatchdogAction::NoAction;
        }

        state.stall_incidents += 1;
        warn!(mode = %kind, since = ?since, incidents = state.stall_incidents, "mode appears stuck");

        let action = if state.stall_incidents > self.config.max_stall_incidents {
            let candidates: Vec<ModeKind> = ModeKind::iter().filter(|&other| other != kind).collect();
            let to = {
                let mut rng = rand::rng();
                candidates[rng.random_range(0..candidates.len())]
            };

            state.stall_incidents = 0;
            WatchdogAction::Switched { from: kind, to }
        } else {
            WatchdogAction::Restarted(kind)
        };

        let target = match action {
            WatchdogAction::Switched { to, .. } => to,
            _ => kind,
        };

        if let Err(error) = self.activate(&mut state, target).await {
            error!(mode = %target, error = %error, "watchdog could not start mode");
        }

        action
    }

    /// Run the watchdog on its configured interval
    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.config.watchdog_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let now = interval.tick().await;
                this.check_watchdog(now).await;
            }
        })
    }
}

impl std::fmt::Debug for ModeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeManager").finish()
    }
}
