use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tokio::{sync::watch, time::Instant};

use super::{failure::FailureTracker, timers::TimerRegistry};
use crate::{
    artnet::{Delivery, NetworkError},
    controller::ControllerHandle,
    models::{self, Universe},
    programs::{NotFound, ProgramRegistry},
    settings::SettingsStore,
    transition::{Easing, FadeOutcome, Fader},
};

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("no programs to animate")]
    NoPrograms,
    #[error("mode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Available screensaver animations
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ModeKind {
    DimToOn,
    DimToOff,
    #[serde(alias = "pulsating")]
    #[strum(to_string = "pulsate", serialize = "pulsating")]
    Pulsate,
    #[serde(alias = "cycling")]
    #[strum(to_string = "cycle", serialize = "cycling")]
    Cycle,
    Disco,
}

impl Default for ModeKind {
    fn default() -> Self {
        Self::DimToOn
    }
}

impl ModeKind {
    /// Parse a mode name, substituting the default mode for unknown names
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(mode = %name, "unknown screensaver mode, using {}", Self::default());
            Self::default()
        })
    }

    pub(super) fn build(self, ctx: ModeContext) -> Box<dyn Mode> {
        match self {
            Self::DimToOn => Box::new(super::dim::DimMode::on(ctx)),
            Self::DimToOff => Box::new(super::dim::DimMode::off(ctx)),
            Self::Pulsate => Box::new(super::pulsate::PulsateMode::new(ctx)),
            Self::Cycle => Box::new(super::cycle::CycleMode::new(ctx)),
            Self::Disco => Box::new(super::disco::DiscoMode::new(ctx)),
        }
    }
}

/// A screensaver animation
///
/// Implementations register every task they spawn in a [TimerRegistry] so `stop` returns only
/// once nothing is left running. `start` while running and `stop` while stopped do nothing.
#[async_trait]
pub trait Mode: Send + Sync {
    fn kind(&self) -> ModeKind;

    async fn start(&mut self) -> Result<(), ModeError>;

    async fn stop(&mut self) -> Result<(), ModeError>;

    fn is_running(&self) -> bool;
}

/// Capabilities handed to a mode when it is built
#[derive(Debug, Clone)]
pub struct ModeContext {
    pub controller: ControllerHandle,
    pub fader: Fader,
    pub programs: Arc<ProgramRegistry>,
    pub settings: Arc<SettingsStore>,
    pub config: Arc<models::Screensaver>,
    progress: Arc<watch::Sender<Instant>>,
    /// Modes built from this context that are currently running
    running: Arc<AtomicUsize>,
}

impl ModeContext {
    pub fn new(
        controller: ControllerHandle,
        fader: Fader,
        programs: Arc<ProgramRegistry>,
        settings: Arc<SettingsStore>,
        config: Arc<models::Screensaver>,
    ) -> Self {
        let (progress, _) = watch::channel(Instant::now());

        Self {
            controller,
            fader,
            programs,
            settings,
            config,
            progress: Arc::new(progress),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn running_modes(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for the time of the last successful network call of any mode
    pub fn progress(&self) -> watch::Receiver<Instant> {
        self.progress.subscribe()
    }

    fn signal_progress(&self) {
        self.progress.send_replace(Instant::now());
    }

    pub fn failure_tracker(&self) -> FailureTracker {
        FailureTracker::new(self.config.failure_threshold, self.config.recovery_spacing())
    }

    pub async fn screensaver_power(&self) -> u8 {
        self.settings.get().await.screensaver_power()
    }

    pub async fn transition_speed(&self) -> Duration {
        Duration::from_millis(self.settings.get().await.screensaver.transition_speed)
    }

    /// Program keys to animate: the configured list, or every loaded program
    pub fn program_keys(&self, configured: &[String]) -> Vec<String> {
        if configured.is_empty() {
            self.programs.keys().iter().map(ToString::to_string).collect()
        } else {
            configured.to_vec()
        }
    }

    /// Send a frame, reporting progress on success
    pub async fn send(&self, universe: Universe) -> Result<(), NetworkError> {
        self.controller.send(universe, Delivery::Once).await?;
        self.signal_progress();
        Ok(())
    }

    /// Fade from the current universe, reporting progress on completion
    pub async fn fade_to(
        &self,
        to: Universe,
        duration: Duration,
        easing: Easing,
    ) -> Result<FadeOutcome, NetworkError> {
        let from = self.controller.current().await?;
        let outcome = self.fader.fade(from, to, duration, easing).await?;

        if outcome == FadeOutcome::Completed {
            self.signal_progress();
        }

        Ok(outcome)
    }
}

/// Running state shared by every mode implementation
#[derive(Debug)]
pub(super) struct Lifecycle {
    pub timers: TimerRegistry,
    pub running: bool,
    gauge: Arc<AtomicUsize>,
}

impl Lifecycle {
    pub fn new(ctx: &ModeContext) -> Self {
        Self {
            timers: TimerRegistry::default(),
            running: false,
            gauge: ctx.running.clone(),
        }
    }

    pub fn started(&mut self) {
        if !self.running {
            self.running = true;
            self.gauge.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub async fn stop(&mut self) {
        self.timers.cancel_all().await;

        if self.running {
            self.running = false;
            self.gauge.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.running {
            self.gauge.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn mode_names() {
        assert_eq!("dimToOn".parse::<ModeKind>(), Ok(ModeKind::DimToOn));
        assert_eq!("dimToOff".parse::<ModeKind>(), Ok(ModeKind::DimToOff));
        assert_eq!("pulsating".parse::<ModeKind>(), Ok(ModeKind::Pulsate));
        assert_eq!("cycling".parse::<ModeKind>(), Ok(ModeKind::Cycle));
        assert_eq!(ModeKind::Pulsate.to_string(), "pulsate");
        assert_eq!(ModeKind::DimToOff.to_string(), "dimToOff");

        for kind in ModeKind::iter() {
            assert_eq!(kind.to_string().parse::<ModeKind>(), Ok(kind));
            assert_eq!(
                serde_json::to_value(kind).expect("serialize"),
                serde_json::Value::String(kind.to_string())
            );
        }
    }

    #[test]
    fn unknown_mode_falls_back() {
        assert_eq!(ModeKind::from_name("rainbow"), ModeKind::DimToOn);
        assert_eq!(ModeKind::from_name("disco"), ModeKind::Disco);
    }
}
