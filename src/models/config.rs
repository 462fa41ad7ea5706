use std::{path::PathBuf, time::Duration};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

pub const ARTNET_PORT: u16 = 6454;

fn default_true() -> bool {
    true
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Zero disables the corresponding timer
fn optional_millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(millis(ms))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the program table
    pub programs: PathBuf,
    /// Path to the settings document
    pub settings: PathBuf,
    #[serde(default = "default_true")]
    pub blackout_on_start: bool,
    #[serde(default = "default_true")]
    pub blackout_on_exit: bool,
    #[validate(nested)]
    pub artnet: ArtNet,
    #[validate(nested)]
    pub control: ControlServer,
    #[validate(nested)]
    pub screensaver: Screensaver,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            programs: PathBuf::from("hcop_dmx-channel.csv"),
            settings: PathBuf::from("settings.json"),
            blackout_on_start: true,
            blackout_on_exit: true,
            artnet: ArtNet::default(),
            control: ControlServer::default(),
            screensaver: Screensaver::default(),
        }
    }
}

impl Config {
    pub async fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(path).await?;
        let mut full = String::new();
        file.read_to_string(&mut full).await?;

        let config: Self = toml::from_str(&full)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Output {
    Udp { host: String, port: u16 },
    Dummy,
}

impl Default for Output {
    fn default() -> Self {
        Self::Udp {
            host: "10.0.166.102".to_owned(),
            port: ARTNET_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ArtNet {
    pub output: Output,
    #[validate(range(max = 127))]
    pub net: u8,
    #[validate(range(max = 15))]
    pub subnet: u8,
    #[validate(range(max = 15))]
    pub universe: u8,
    /// Datagrams sent per transmission at most
    #[validate(range(min = 1, max = 20))]
    pub attempts: u32,
    pub attempt_spacing_ms: u64,
    pub heartbeat_ms: u64,
}

impl Default for ArtNet {
    fn default() -> Self {
        Self {
            output: Output::default(),
            net: 0,
            subnet: 0,
            universe: 1,
            attempts: 5,
            attempt_spacing_ms: 30,
            heartbeat_ms: 30_000,
        }
    }
}

impl ArtNet {
    pub fn attempt_spacing(&self) -> Duration {
        millis(self.attempt_spacing_ms)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        optional_millis(self.heartbeat_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ControlServer {
    pub enable: bool,
    pub bind: String,
    #[validate(range(min = 1024))]
    pub port: u16,
}

impl Default for ControlServer {
    fn default() -> Self {
        Self {
            enable: true,
            bind: "0.0.0.0".to_owned(),
            port: 19446,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Screensaver {
    #[validate(range(min = 1))]
    pub watchdog_interval_ms: u64,
    #[validate(range(min = 1))]
    pub stale_after_ms: u64,
    pub max_stall_incidents: u32,
    pub max_start_errors: u32,
    pub fallback_delay_ms: u64,
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    pub recovery_spacing_ms: u64,
    pub heartbeat_ms: u64,
    #[validate(nested)]
    pub pulsate: Pulsate,
    #[validate(nested)]
    pub cycle: Cycle,
    #[validate(nested)]
    pub disco: Disco,
}

impl Default for Screensaver {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: 30_000,
            stale_after_ms: 120_000,
            max_stall_incidents: 3,
            max_start_errors: 3,
            fallback_delay_ms: 1000,
            failure_threshold: 3,
            recovery_spacing_ms: 5000,
            heartbeat_ms: 10_000,
            pulsate: Pulsate::default(),
            cycle: Cycle::default(),
            disco: Disco::default(),
        }
    }
}

impl Screensaver {
    pub fn watchdog_interval(&self) -> Duration {
        millis(self.watchdog_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        millis(self.stale_after_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        millis(self.fallback_delay_ms)
    }

    pub fn recovery_spacing(&self) -> Duration {
        millis(self.recovery_spacing_ms)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        optional_millis(self.heartbeat_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
#[validate(schema(function = "validate_pulse_bounds"))]
pub struct Pulsate {
    /// Program providing the base mask
    pub program: String,
    #[validate(range(max = 100))]
    pub min_percent: u32,
    #[validate(range(max = 100))]
    pub max_percent: u32,
    pub rise_ms: u64,
    pub fall_ms: u64,
    pub pause_ms: u64,
    #[validate(range(min = 1))]
    pub tick_ms: u64,
}

fn validate_pulse_bounds(pulsate: &Pulsate) -> Result<(), validator::ValidationError> {
    if pulsate.min_percent > pulsate.max_percent {
        return Err(validator::ValidationError::new("min_percent_above_max_percent"));
    }

    Ok(())
}

impl Default for Pulsate {
    fn default() -> Self {
        Self {
            program: "q".to_owned(),
            min_percent: 70,
            max_percent: 100,
            rise_ms: 1500,
            fall_ms: 800,
            pause_ms: 700,
            tick_ms: 25,
        }
    }
}

impl Pulsate {
    pub fn tick(&self) -> Duration {
        millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Cycle {
    /// Program keys to cycle through, all loaded programs when empty
    pub programs: Vec<String>,
    #[validate(range(min = 1))]
    pub hold_ms: u64,
}

impl Default for Cycle {
    fn default() -> Self {
        Self {
            programs: vec![],
            hold_ms: 5000,
        }
    }
}

impl Cycle {
    pub fn hold(&self) -> Duration {
        millis(self.hold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Disco {
    /// Program keys to pick from, all loaded programs when empty
    pub programs: Vec<String>,
    #[validate(range(min = 1))]
    pub interval_ms: u64,
}

impl Default for Disco {
    fn default() -> Self {
        Self {
            programs: vec![],
            interval_ms: 1000,
        }
    }
}

impl Disco {
    pub fn interval(&self) -> Duration {
        millis(self.interval_ms)
    }
}
