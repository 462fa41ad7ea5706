//! Fade every channel up to the screensaver power or down to black

use async_trait::async_trait;
use tokio::select;

use super::mode::{Lifecycle, Mode, ModeContext, ModeError, ModeKind};
use crate::{
    models::Universe,
    transition::{Easing, FadeOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    On,
    Off,
}

pub struct DimMode {
    target: Target,
    ctx: ModeContext,
    lifecycle: Lifecycle,
}

impl DimMode {
    pub fn on(ctx: ModeContext) -> Self {
        Self {
            target: Target::On,
            lifecycle: Lifecycle::new(&ctx),
            ctx,
        }
    }

    pub fn off(ctx: ModeContext) -> Self {
        Self {
            target: Target::Off,
            lifecycle: Lifecycle::new(&ctx),
            ctx,
        }
    }

    async fn final_frame(&self) -> Universe {
        match self.target {
            Target::On => Universe::filled(self.ctx.screensaver_power().await),
            Target::Off => Universe::zero(),
        }
    }
}

#[async_trait]
impl Mode for DimMode {
    fn kind(&self) -> ModeKind {
        match self.target {
            Target::On => ModeKind::DimToOn,
            Target::Off => ModeKind::DimToOff,
        }
    }

    async fn start(&mut self) -> Result<(), ModeError> {
        if self.lifecycle.running {
            return Ok(());
        }

        // Fails early when the controller is gone
        self.ctx.controller.current().await?;

        let target = self.final_frame().await;
        let duration = self.ctx.transition_speed().await;
        let ctx = self.ctx.clone();
        let kind = self.kind();

        self.lifecycle.timers.spawn(move |token| async move {
            let mut tracker = ctx.failure_tracker();

            select! {
                result = ctx.fade_to(target.clone(), duration, Easing::InOutCubic) => match result {
                    Ok(FadeOutcome::Completed) => {
                        debug!(mode = %kind, "dim transition complete");
                        tracker.record_success();
                    }
                    Ok(FadeOutcome::Cancelled) => {
                        debug!(mode = %kind, "dim transition superseded");
                    }
                    Err(error) => {
                        warn!(mode = %kind, error = %error, "dim transition failed");
                        tracker.record_failure();
                    }
                },
                _ = token.cancelled() => return,
            }

            let period = match ctx.config.heartbeat() {
                Some(period) => period,
                None => return,
            };

            loop {
                select! {
                    _ = tokio::time::sleep(tracker.dwell(period)) => {},
                    _ = token.cancelled() => return,
                }

                tracker.throttle().await;

                match ctx.send(target.clone()).await {
                    Ok(()) => {
                        trace!(mode = %kind, "heartbeat");
                        tracker.record_success();
                    }
                    Err(error) => {
                        warn!(mode = %kind, error = %error, "heartbeat failed");
                        tracker.record_failure();
                    }
                }
            }
        });

        self.lifecycle.started();
        info!(mode = %kind, "screensaver mode started");
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
