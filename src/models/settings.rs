use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use validator::Validate;

fn default_true() -> bool {
    true
}

fn default_power() -> u32 {
    255
}

/// User-facing settings document, persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[validate(nested)]
    pub screensaver: ScreensaverSettings,
    #[serde(default)]
    pub system: SystemInfo,
    #[validate(range(max = 255))]
    #[serde(default = "default_power")]
    pub light_power: u32,
    #[serde(default = "default_true")]
    pub link_light_powers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screensaver: ScreensaverSettings::default(),
            system: SystemInfo::default(),
            light_power: 255,
            link_light_powers: true,
        }
    }
}

impl Settings {
    /// Power used for programs set by the user
    pub fn normal_power(&self) -> u8 {
        self.light_power.min(255) as u8
    }

    /// Power used by screensaver modes
    pub fn screensaver_power(&self) -> u8 {
        self.screensaver.light_power.min(255) as u8
    }

    pub fn power(&self, screensaver: bool) -> u8 {
        if screensaver {
            self.screensaver_power()
        } else {
            self.normal_power()
        }
    }

    /// Mirror the normal power into the screensaver power when both are linked
    pub fn apply_link(&mut self) {
        if self.link_light_powers {
            self.screensaver.light_power = self.light_power;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreensaverSettings {
    /// Idle time before the screensaver starts, in milliseconds
    pub time_delay: u64,
    pub mode: String,
    #[validate(range(max = 255))]
    pub light_power: u32,
    /// Fade duration used by screensaver modes, in milliseconds
    pub transition_speed: u64,
}

impl Default for ScreensaverSettings {
    fn default() -> Self {
        Self {
            time_delay: 120_000,
            mode: "dimToOn".to_owned(),
            light_power: 255,
            transition_speed: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemInfo {
    pub last_updated: DateTime<Utc>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
        }
    }
}
