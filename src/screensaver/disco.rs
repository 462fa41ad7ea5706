//! Random program changes at a fast pace, without fading

use std::collections::HashSet;

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::select;

use super::mode::{Lifecycle, Mode, ModeContext, ModeError, ModeKind};
use crate::universe::scale;

/// Below this many unused programs, the used set starts over
const MIN_AVAILABLE: usize = 3;

/// Random selection without replacement over a pool of keys
#[derive(Debug, Clone)]
pub struct DiscoPicker<R> {
    keys: Vec<String>,
    used: HashSet<usize>,
    current: Option<usize>,
    rng: R,
}

impl<R: Rng> DiscoPicker<R> {
    pub fn new(keys: Vec<String>, rng: R) -> Self {
        Self {
            keys,
            used: HashSet::new(),
            current: None,
            rng,
        }
    }

    fn available(&self) -> Vec<usize> {
        (0..self.keys.len())
            .filter(|index| !self.used.contains(index))
            .collect()
    }

    /// Pick the next key, never the current one while the pool has another
    pub fn pick(&mut self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let mut available = self.available();

        if available.len() < MIN_AVAILABLE {
            self.used.clear();

            if let Some(current) = self.current {
                self.used.insert(current);
            }

            available = self.available();
        }

        let choice = if available.is_empty() {
            // A single program is all there is
            self.current.unwrap_or(0)
        } else {
            available[self.rng.random_range(0..available.len())]
        };

        self.used.insert(choice);
        self.current = Some(choice);
        Some(&self.keys[choice])
    }
}

pub struct DiscoMode {
    ctx: ModeContext,
    lifecycle: Lifecycle,
}

impl DiscoMode {
    pub fn new(ctx: ModeContext) -> Self {
        Self {
            lifecycle: Lifecycle::new(&ctx),
            ctx,
        }
    }
}

#[async_trait]
impl Mode for DiscoMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Disco
    }

    async fn start(&mut self) -> Result<(), ModeError> {
        if self.lifecycle.running {
            return Ok(());
        }

        let keys = self.ctx.program_keys(&self.ctx.config.disco.programs);
        if keys.is_empty() {
            return Err(ModeError::NoPrograms);
        }

        let ctx = self.ctx.clone();
        let mut picker = DiscoPicker::new(keys, StdRng::from_os_rng());

        self.lifecycle.timers.spawn(move |token| async move {
            let interval = ctx.config.disco.interval();
            let mut tracker = ctx.failure_tracker();
            let mut changes: u64 = 0;

            loop {
                let key = match picker.pick() {
                    Some(key) => key.to_owned(),
                    None => return,
                };

                match ctx.programs.get(&key) {
                    Ok(mask) => {
                        let frame = scale(mask, ctx.screensaver_power().await);
                        tracker.throttle().await;

                        match ctx.send(frame).await {
                            Ok(()) => {
                                tracker.record_success();
                                changes += 1;

                                if changes % 5 == 0 {
                                    debug!(program = %key, changes, "disco change");
                                }
                            }
                            Err(error) => {
                                warn!(program = %key, error = %error, "disco change failed");
                                tracker.record_failure();
                            }
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "skipping program");
                        tracker.record_failure();
                    }
                }

                select! {
                    _ = tokio::time::sleep(tracker.dwell(interval)) => {},
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
