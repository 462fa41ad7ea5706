//! Step through programs with a fade between each

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::select;

use super::mode::{Lifecycle, Mode, ModeContext, ModeError, ModeKind};
use crate::{
    transition::{Easing, FadeOutcome},
    universe::scale,
};

/// Round-robin over program keys, skipping keys that failed
#[derive(Debug, Clone)]
pub struct CycleOrder {
    keys: Vec<String>,
    next: usize,
    failed: HashSet<String>,
}

impl CycleOrder {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            next: 0,
            failed: HashSet::new(),
        }
    }

    pub fn mark_failed(&mut self, key: &str) {
        self.failed.insert(key.to_owned());
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Next key to show, forgetting failures once every key has failed
    pub fn next_key(&mut self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }

        if self.keys.iter().all(|key| self.failed.contains(key)) {
            debug!("every program failed, clearing skip list");
            self.failed.clear();
        }

        for _ in 0..self.keys.len() {
            let index = self.next;
            self.next = (self.next + 1) % self.keys.len();

            if !self.failed.contains(&self.keys[index]) {
                return Some(self.keys[index].clone());
            }
        }

        None
    }
}

pub struct CycleMode {
    ctx: ModeContext,
    lifecycle: Lifecycle,
}

impl CycleMode {
    pub fn new(ctx: ModeContext) -> Self {
        Self {
            lifecycle: Lifecycle::new(&ctx),
            ctx,
        }
    }
}

#[async_trait]
impl Mode for CycleMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Cycle
    }

    async fn start(&mut self) -> Result<(), ModeError> {
        if self.lifecycle.running {
            return Ok(());
        }

        let keys = self.ctx.program_keys(&self.ctx.config.cycle.programs);
        if keys.is_empty() {
            return Err(ModeError::NoPrograms);
        }

        let ctx = self.ctx.clone();
        let mut order = CycleOrder::new(keys);

        self.lifecycle.timers.spawn(move |token| async move {
            let hold = ctx.config.cycle.hold();
            let mut tracker = ctx.failure_tracker();

            while let Some(key) = order.next_key() {
                match ctx.programs.get(&key) {
                    Ok(mask) => {
                        let target = scale(mask, ctx.screensaver_power().await);
                        let duration = ctx.transition_speed().await;

                        tracker.throttle().await;

                        select! {
                            result = ctx.fade_to(target, duration, Easing::Linear) => match result {
                                Ok(FadeOutcome::Completed) => {
                                    debug!(program = %key, "cycled to program");
                                    tracker.record_success();
                                }
                                Ok(FadeOutcome::Cancelled) => {
                                    debug!(program = %key, "cycle transition superseded");
                                }
                                Err(error) => {
                                    warn!(program = %key, error = %error, "cycle transition failed");
                                    tracker.record_failure();
                                }
                            },
                            _ = token.cancelled() => return,
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "skipping program");
                        order.mark_failed(&key);
                        tracker.record_failure();
                    }
                }

                select! {
                    _ = tokio::time::sleep(tracker.dwell(hold)) => {},
                    _ = token.cancelled() => return,
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
