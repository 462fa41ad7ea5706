//! Heartbeat-like oscillation of a base program

use std::time::Duration;

use async_trait::async_trait;
use tokio::select;

use super::mode::{Lifecycle, Mode, ModeContext, ModeError, ModeKind};
use crate::{
    models::{self, Mask},
    universe::scale,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Rise,
    Fall,
    Pause,
}

/// Pulse shape in percent of the screensaver power
#[derive(Debug, Clone)]
pub struct PulseState {
    min: f64,
    max: f64,
    rise: Duration,
    fall: Duration,
    pause: Duration,
    phase: Phase,
    elapsed: Duration,
}

impl PulseState {
    pub fn new(config: &models::Pulsate) -> Self {
        Self {
            min: config.min_percent as f64,
            max: config.max_percent as f64,
            rise: Duration::from_millis(config.rise_ms),
            fall: Duration::from_millis(config.fall_ms),
            pause: Duration::from_millis(config.pause_ms),
            phase: Phase::Pause,
            elapsed: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn progress(elapsed: Duration, length: Duration) -> f64 {
        if length.is_zero() {
            1.
        } else {
            (elapsed.as_secs_f64() / length.as_secs_f64()).min(1.)
        }
    }

    /// Advance by one tick and return the level in percent
    pub fn advance(&mut self, tick: Duration) -> f64 {
        self.elapsed += tick;

        match self.phase {
            Phase::Pause => {
                if self.elapsed >= self.pause {
                    self.phase = Phase::Rise;
                    self.elapsed = Duration::ZERO;
                }

                self.min
            }
            Phase::Rise => {
                let t = Self::progress(self.elapsed, self.rise);
                // Cubic ease-in
                let level = self.min + (self.max - self.min) * t * t * t;

                if t >= 1. {
                    self.phase = Phase::Fall;
                    self.elapsed = Duration::ZERO;
                }

                level
            }
            Phase::Fall => {
                let t = Self::progress(self.elapsed, self.fall);
                // Quadratic ease-out
                let level = self.max - (self.max - self.min) * t * (2. - t);

                if t >= 1. {
                    self.phase = Phase::Pause;
                    self.elapsed = Duration::ZERO;
                }

                level
            }
        }
    }
}

/// Base mask: the configured program, else the lit channels, else everything
async fn resolve_base(ctx: &ModeContext) -> Mask {
    let program = &ctx.config.pulsate.program;

    match ctx.programs.get(program) {
        Ok(mask) => return mask.clone(),
        Err(error) => debug!(error = %error, "pulsate base program unavailable"),
    }

    match ctx.controller.current().await {
        Ok(current) if !current.is_zero() => Mask::lit(&current),
        Ok(_) => Mask::all(),
        Err(error) => {
            warn!(error = %error, "cannot read current universe, pulsing every channel");
            Mask::all()
        }
    }
}

pub struct PulsateMode {
    ctx: ModeContext,
    lifecycle: Lifecycle,
}

impl PulsateMode {
    pub fn new(ctx: ModeContext) -> Self {
        Self {
            lifecycle: Lifecycle::new(&ctx),
            ctx,
        }
    }
}

#[async_trait]
impl Mode for PulsateMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Pulsate
    }

    async fn start(&mut self) -> Result<(), ModeError> {
        if self.lifecycle.running {
            return Ok(());
        }

        let ctx = self.ctx.clone();
        let mut base = Some(resolve_base(&ctx).await);

        self.lifecycle.timers.spawn(move |token| async move {
            let config = &ctx.config.pulsate;
            let tick = config.tick();
            let mut state = PulseState::new(config);
            let mut tracker = ctx.failure_tracker();
            let refetch_after = tracker.threshold() * 2;

            loop {
                select! {
                    _ = tokio::time::sleep(tracker.dwell(tick)) => {},
                    _ = token.cancelled() => return,
                }

                let level = state.advance(tick);

                let mask = match &base {
                    Some(mask) => mask.clone(),
                    None => {
                        let mask = resolve_base(&ctx).await;
                        base = Some(mask.clone());
                        mask
                    }
                };

                let power = ctx.screensaver_power().await as f64 * level / 100.;
                let frame = scale(&mask, power.round().clamp(0., 255.) as u8);

                tracker.throttle().await;

                match ctx.send(frame).await {
                    Ok(()) => tracker.record_success(),
                    Err(error) => {
                        warn!(error = %error, "pulse frame failed");
                        tracker.record_failure();

                        if tracker.consecutive() % refetch_after == 0 {
                            debug!("refetching pulsate base");
                            base = None;
                        }
                    }
                }
            }
        });

        self.lifecycle.started();
        info!(mode = %self.kind(), "screensaver mode started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ModeError> {
        if !self.lifecycle.running {
            return Ok(());
        }

        self.lifecycle.stop().await;
        info!(mode = %self.kind(), "screensaver mode stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.lifecycle.running
    }
}
