use serde_derive::{Deserialize, Serialize};

use crate::{
    models::{Mask, ProgramKey, Settings, Universe},
    screensaver::ModeKind,
};

fn default_fade_duration() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "command")]
pub enum ControlRequest {
    SetProgram {
        key: String,
    },
    #[serde(rename_all = "camelCase")]
    FadeToProgram {
        key: String,
        #[serde(default = "default_fade_duration")]
        duration: u64,
        #[serde(default)]
        use_screensaver_power: bool,
    },
    SetDirect {
        channels: Universe,
    },
    Blackout,
    GetState,
    ListPrograms,
    GetProgram {
        key: String,
    },
    GetSettings,
    UpdateSettings {
        settings: serde_json::Value,
    },
    ResetSettings,
    StartScreensaver {
        #[serde(default)]
        mode: Option<String>,
    },
    StopScreensaver,
    GetScreensaver,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Success {
        success: bool,
    },
    Fade {
        success: bool,
        completed: bool,
    },
    State {
        success: bool,
        channels: Universe,
    },
    Programs {
        success: bool,
        programs: Vec<ProgramKey>,
    },
    Program {
        success: bool,
        key: String,
        channels: Mask,
    },
    Settings {
        success: bool,
        settings: Settings,
    },
    Screensaver {
        success: bool,
        mode: Option<ModeKind>,
    },
    Error {
        success: bool,
        error: String,
    },
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self::Success { success: true }
    }

    pub fn error(error: impl ToString) -> Self {
        Self::Error {
            success: false,
            error: error.to_string(),
        }
    }
}
