//! Timed interpolation between two universes

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{select, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    artnet::{Delivery, NetworkError},
    controller::ControllerHandle,
    models::Universe,
};

/// Target frame period of a fade
pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    InOutCubic,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        match self {
            Self::Linear => t,
            Self::InOutCubic => ease_in_out_cubic(t),
        }
    }
}

pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4. * t * t * t
    } else {
        1. - (-2. * t + 2.).powi(3) / 2.
    }
}

/// Number of steps of a fade, at least 2
pub fn step_count(duration: Duration) -> u32 {
    let frame = FRAME_INTERVAL.as_millis();
    let steps = (duration.as_millis() + frame - 1) / frame;
    steps.clamp(2, u32::MAX as u128) as u32
}

/// Per-channel linear blend of two universes
pub fn interpolate(from: &Universe, to: &Universe, progress: f64) -> Universe {
    let progress = progress.clamp(0., 1.);
    let mut frame = Universe::zero();

    for ((dst, a), b) in frame.as_mut_slice().iter_mut().zip(from.iter()).zip(to.iter()) {
        let a = a as f64;
        let b = b as f64;
        *dst = (a + (b - a) * progress).round().clamp(0., 255.) as u8;
    }

    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Default)]
struct Active {
    id: u64,
    token: Option<CancellationToken>,
}

#[derive(Debug)]
struct Inner {
    controller: ControllerHandle,
    active: Mutex<Active>,
    /// Held by the fade currently sending frames
    lane: tokio::sync::Mutex<()>,
}

/// Runs fades against the controller, at most one at a time
#[derive(Debug, Clone)]
pub struct Fader {
    inner: Arc<Inner>,
}

impl Fader {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                controller,
                active: Mutex::new(Active::default()),
                lane: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Register a new fade, cancelling the previous one
    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut active = match self.inner.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = active.token.replace(token.clone()) {
            previous.cancel();
        }

        active.id += 1;
        (active.id, token)
    }

    fn finish(&self, id: u64) {
        if let Ok(mut active) = self.inner.active.lock() {
            if active.id == id {
                active.token = None;
            }
        }
    }

    async fn run(
        &self,
        token: CancellationToken,
        from: Universe,
        to: Universe,
        duration: Duration,
        easing: Easing,
    ) -> Result<FadeOutcome, NetworkError> {
        let _lane = select! {
            lane = self.inner.lane.lock() => lane,
            _ = token.cancelled() => return Ok(FadeOutcome::Cancelled),
        };

        let steps = step_count(duration);
        let interval = duration / steps;
        debug!(steps, interval = ?interval, "starting fade");

        for step in 0..=steps {
            if token.is_cancelled() {
                debug!(step, "fade cancelled");
                return Ok(FadeOutcome::Cancelled);
            }

            let frame = if step == steps {
                to.clone()
            } else {
                interpolate(&from, &to, easing.apply(step as f64 / steps as f64))
            };

            self.inner.controller.send(frame, Delivery::Once).await?;

            if step < steps {
                select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = token.cancelled() => {
                        debug!(step, "fade cancelled");
                        return Ok(FadeOutcome::Cancelled);
                    }
                }
            }
        }

        Ok(FadeOutcome::Completed)
    }

    /// Fade from `from` to `to`, cancelling any fade in progress
    ///
    /// The last frame sent is exactly `to` unless the fade is cancelled.
    pub async fn fade(
        &self,
        from: Universe,
        to: Universe,
        duration: Duration,
        easing: Easing,
    ) -> Result<FadeOutcome, NetworkError> {
        let (id, token) = self.begin();
        let result = self.run(token, from, to, duration, easing).await;
        self.finish(id);
        result
    }

    /// Run a fade on a new task
    pub fn spawn(&self, from: Universe, to: Universe, duration: Duration, easing: Easing) -> FadeHandle {
        let (id, token) = self.begin();
        let this = self.clone();

        let join = tokio::spawn({
            let token = token.clone();

            async move {
                let result = this.run(token, from, to, duration, easing).await;
                this.finish(id);
                result
            }
        });

        FadeHandle { token, join }
    }

    /// Cancel the fade in progress and wait until it stopped sending frames
    pub async fn cancel(&self) {
        let token = self
            .inner
            .active
            .lock()
            .ok()
            .and_then(|mut active| active.token.take());

        if let Some(token) = token {
            token.cancel();
            let _released = self.inner.lane.lock().await;
        }
    }
}

#[derive(Debug)]
pub struct FadeHandle {
    token: CancellationToken,
    join: JoinHandle<Result<FadeOutcome, NetworkError>>,
}

impl FadeHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) -> Result<FadeOutcome, NetworkError> {
        match self.join.await {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "fade task failed");
                Ok(FadeOutcome::Cancelled)
            }
        }
    }
}
