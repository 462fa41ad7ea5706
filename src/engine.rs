//! Lighting engine: the operations offered to callers

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    artnet::{Delivery, NetworkError},
    controller::ControllerHandle,
    models::{self, Mask, ProgramKey, Settings, Universe},
    programs::{NotFound, ProgramRegistry},
    screensaver::{ModeContext, ModeError, ModeKind, ModeManager},
    settings::{SettingsError, SettingsStore},
    transition::{Easing, FadeOutcome, Fader},
    universe::scale,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("screensaver error: {0}")]
    Mode(#[from] ModeError),
}

#[derive(Debug, Clone)]
pub struct Engine {
    controller: ControllerHandle,
    fader: Fader,
    programs: Arc<ProgramRegistry>,
    settings: Arc<SettingsStore>,
    modes: ModeManager,
}

impl Engine {
    pub fn new(
        controller: ControllerHandle,
        programs: Arc<ProgramRegistry>,
        settings: Arc<SettingsStore>,
        screensaver: Arc<models::Screensaver>,
    ) -> Self {
        let fader = Fader::new(controller.clone());
        let modes = ModeManager::new(ModeContext::new(
            controller.clone(),
            fader.clone(),
            programs.clone(),
            settings.clone(),
            screensaver,
        ));

        Self {
            controller,
            fader,
            programs,
            settings,
            modes,
        }
    }

    /// Show a program at the normal light power
    #[instrument(skip(self))]
    pub async fn set_program(&self, key: &str) -> Result<(), EngineError> {
        let mask = self.programs.get(key)?;
        let power = self.settings.get().await.normal_power();

        self.fader.cancel().await;
        self.controller
            .send(scale(mask, power), Delivery::Redundant)
            .await?;

        info!(program = %key, power, "program set");
        Ok(())
    }

    /// Fade linearly from the current universe to a program
    #[instrument(skip(self))]
    pub async fn fade_to_program(
        &self,
        key: &str,
        duration: Duration,
        use_screensaver_power: bool,
    ) -> Result<FadeOutcome, EngineError> {
        let mask = self.programs.get(key)?;
        let power = self.settings.get().await.power(use_screensaver_power);
        let target = scale(mask, power);

        let from = self.controller.current().await?;
        let outcome = self
            .fader
            .fade(from, target, duration, Easing::Linear)
            .await?;

        info!(program = %key, outcome = ?outcome, "fade finished");
        Ok(outcome)
    }

    /// Send raw channel values
    pub async fn set_direct(&self, universe: Universe) -> Result<(), EngineError> {
        self.fader.cancel().await;
        self.controller.send(universe, Delivery::Redundant).await?;
        debug!("channels set directly");
        Ok(())
    }

    /// Every channel off
    pub async fn blackout(&self) -> Result<(), EngineError> {
        self.set_direct(Universe::zero()).await
    }

    pub async fn get_state(&self) -> Result<Universe, EngineError> {
        Ok(self.controller.current().await?)
    }

    pub fn list_programs(&self) -> Vec<ProgramKey> {
        self.programs.keys()
    }

    pub fn get_program(&self, key: &str) -> Result<Mask, EngineError> {
        Ok(self.programs.get(key)?.clone())
    }

    pub async fn get_settings(&self) -> Settings {
        self.settings.get().await
    }

    pub async fn update_settings(&self, patch: serde_json::Value) -> Result<Settings, EngineError> {
        Ok(self.settings.update(patch).await?)
    }

    pub async fn reset_settings(&self) -> Result<Settings, EngineError> {
        Ok(self.settings.reset().await?)
    }

    /// Start a screensaver mode, the one from the settings when no name is given
    pub async fn start_screensaver(&self, mode: Option<&str>) -> Result<ModeKind, EngineError> {
        let name = match mode {
            Some(mode) => mode.to_owned(),
            None => self.settings.get().await.screensaver.mode,
        };

        Ok(self.modes.start_mode(&name).await?)
    }

    pub async fn stop_screensaver(&self) {
        self.modes.stop_mode().await
    }

    pub async fn active_screensaver_mode(&self) -> Option<ModeKind> {
        self.modes.active_mode().await
    }

    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        self.modes.spawn_watchdog()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::{
        artnet::{DummySink, Transmitter},
        controller::Controller,
        models::CHANNEL_COUNT,
    };

    pub struct Setup {
        pub engine: Engine,
        pub sink: DummySink,
        _dir: tempfile::TempDir,
    }

    /// Programs `a` (channel 0) and `q` (everything), normal power 200
    pub async fn setup() -> Setup {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Arc::new(SettingsStore::load(dir.path().join("settings.json")).await);
        settings
            .update(json!({ "lightPower": 200, "linkLightPowers": false }))
            .await
            .expect("settings");

        let mut a = vec![false; CHANNEL_COUNT];
        a[0] = true;
        let mut programs = BTreeMap::new();
        programs.insert(ProgramKey::new('a'), Mask::new(a));
        programs.insert(ProgramKey::new('q'), Mask::all());

        let sink = DummySink::new();
        let transmitter = Transmitter::new(Box::new(sink.clone()), &models::ArtNet::default());
        let (controller, _) = Controller::spawn(transmitter, None);

        Setup {
            engine: Engine::new(
                controller,
                Arc::new(ProgramRegistry::from_map(programs)),
                settings,
                Arc::new(models::Screensaver::default()),
            ),
            sink,
            _dir: dir,
        }
    }
}
