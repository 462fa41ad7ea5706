//! Shared setup for screensaver tests

use std::{collections::BTreeMap, sync::Arc};

use super::mode::ModeContext;
use crate::{
    artnet::{DummySink, Transmitter},
    controller::{Controller, ControllerHandle},
    models::{self, Mask, ProgramKey, CHANNEL_COUNT},
    programs::ProgramRegistry,
    settings::SettingsStore,
    transition::Fader,
};

pub struct Fixture {
    pub sink: DummySink,
    pub controller: ControllerHandle,
    pub settings: Arc<SettingsStore>,
    pub ctx: ModeContext,
    _dir: tempfile::TempDir,
}

/// `a` lights channel 0, `b` to `p` light channels 1 to 15, `q` lights everything
pub fn programs() -> BTreeMap<ProgramKey, Mask> {
    let mut programs = BTreeMap::new();

    for (channel, key) in ('a'..='p').enumerate() {
        let mut bits = vec![false; CHANNEL_COUNT];
        bits[channel] = true;
        programs.insert(ProgramKey::new(key), Mask::new(bits));
    }

    programs.insert(ProgramKey::new('q'), Mask::all());
    programs
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(programs(), models::Screensaver::default()).await
    }

    pub async fn with_programs(keys: &[char]) -> Self {
        let programs = programs()
            .into_iter()
            .filter(|(key, _)| keys.contains(&key.as_char()))
            .collect();

        Self::build(programs, models::Screensaver::default()).await
    }

    pub async fn with_pulsate_program(program: &str) -> Self {
        let mut config = models::Screensaver::default();
        config.pulsate.program = program.to_owned();
        Self::build(programs(), config).await
    }

    pub async fn with_cycle_programs(keys: &[&str]) -> Self {
        let mut config = models::Screensaver::default();
        config.cycle.programs = keys.iter().map(|k| k.to_string()).collect();
        Self::build(programs(), config).await
    }

    /// Screensaver power 200, transitions of one second, no controller heartbeat
    async fn build(programs: BTreeMap<ProgramKey, Mask>, config: models::Screensaver) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Arc::new(SettingsStore::load(dir.path().join("settings.json")).await);
        settings
            .update(serde_json::json!({
                "lightPower": 200,
                "linkLightPowers": true,
                "screensaver": { "transitionSpeed": 1000 }
            }))
            .await
            .expect("settings update");

        let sink = DummySink::new();
        let transmitter = Transmitter::new(Box::new(sink.clone()), &models::ArtNet::default());
        let (controller, _) = Controller::spawn(transmitter, None);

        let ctx = ModeContext::new(
            controller.clone(),
            Fader::new(controller.clone()),
            Arc::new(ProgramRegistry::from_map(programs)),
            settings.clone(),
            Arc::new(config),
        );

        Self {
            sink,
            controller,
            settings,
            ctx,
            _dir: dir,
        }
    }
}
