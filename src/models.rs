use std::{fmt, str::FromStr};

use serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize};
use thiserror::Error;

mod config;
pub use config::*;

mod settings;
pub use settings::*;

/// Number of channels in a DMX universe
pub const CHANNEL_COUNT: usize = 512;

/// Values of every channel of the universe
#[derive(Clone, PartialEq, Eq)]
pub struct Universe([u8; CHANNEL_COUNT]);

impl Universe {
    pub fn zero() -> Self {
        Self([0; CHANNEL_COUNT])
    }

    pub fn filled(value: u8) -> Self {
        Self([value; CHANNEL_COUNT])
    }

    /// Build a universe from arbitrary integers
    ///
    /// Values are clamped to 0..=255, extra values are dropped and missing ones are zero.
    pub fn from_values<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<i64>,
    {
        let mut channels = [0u8; CHANNEL_COUNT];

        for (dst, src) in channels.iter_mut().zip(values) {
            *dst = src.into().clamp(0, 255) as u8;
        }

        Self(channels)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::ops::Index<usize> for Universe {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lit = self.0.iter().filter(|&&v| v > 0).count();
        f.debug_struct("Universe")
            .field("lit", &lit)
            .field("head", &&self.0[..8])
            .finish()
    }
}

impl Serialize for Universe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Universe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<i64>::deserialize(deserializer)?;
        Ok(Self::from_values(values))
    }
}

/// Per-channel on/off state of a program
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mask(Vec<bool>);

impl Mask {
    /// Create a mask, dropping anything past the last channel
    pub fn new(mut bits: Vec<bool>) -> Self {
        bits.truncate(CHANNEL_COUNT);
        Self(bits)
    }

    pub fn all() -> Self {
        Self(vec![true; CHANNEL_COUNT])
    }

    /// Mask of the channels that are lit in the given universe
    pub fn lit(universe: &Universe) -> Self {
        Self(universe.iter().map(|v| v > 0).collect())
    }

    pub fn is_set(&self, channel: usize) -> bool {
        self.0.get(channel).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&bit| bit).count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramKeyError {
    #[error("program key must not be empty")]
    Empty,
    #[error("program key must be a single character, got '{0}'")]
    TooLong(String),
}

/// Single-character program identifier, always lowercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramKey(char);

impl ProgramKey {
    pub fn new(c: char) -> Self {
        Self(c.to_lowercase().next().unwrap_or(c))
    }

    pub fn as_char(&self) -> char {
        self.0
    }
}

impl FromStr for ProgramKey {
    type Err = ProgramKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().trim_start_matches('\u{feff}').chars();

        match (chars.next(), chars.next()) {
            (None, _) => Err(ProgramKeyError::Empty),
            (Some(c), None) => Ok(Self::new(c)),
            (Some(_), Some(_)) => Err(ProgramKeyError::TooLong(s.to_owned())),
        }
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ProgramKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProgramKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_from_values_clamps_and_pads() {
        let universe = Universe::from_values(vec![-4i64, 12, 300]);

        assert_eq!(universe[0], 0);
        assert_eq!(universe[1], 12);
        assert_eq!(universe[2], 255);
        assert_eq!(universe[3], 0);
        assert_eq!(universe.as_slice().len(), CHANNEL_COUNT);

        let long = Universe::from_values(vec![7i64; 600]);
        assert_eq!(long.as_slice().len(), CHANNEL_COUNT);
        assert!(long.iter().all(|v| v == 7));
    }

    #[test]
    fn universe_json_is_a_plain_array() {
        let universe = Universe::filled(3);
        let json = serde_json::to_string(&universe).expect("serialize");
        assert!(json.starts_with("[3,3,"));

        let parsed: Universe = serde_json::from_str("[1, 2, 999]").expect("deserialize");
        assert_eq!(parsed[2], 255);
        assert_eq!(parsed[3], 0);
    }

    #[test]
    fn mask_out_of_range_is_unset() {
        let mask = Mask::new(vec![true, false]);

        assert!(mask.is_set(0));
        assert!(!mask.is_set(1));
        assert!(!mask.is_set(2));
        assert!(!mask.is_set(CHANNEL_COUNT + 10));
        assert_eq!(Mask::new(vec![true; 700]).len(), CHANNEL_COUNT);
    }

    #[test]
    fn program_key_parsing() {
        assert_eq!("A".parse::<ProgramKey>(), Ok(ProgramKey::new('a')));
        assert_eq!("\u{feff}q ".parse::<ProgramKey>(), Ok(ProgramKey::new('q')));
        assert_eq!("".parse::<ProgramKey>(), Err(ProgramKeyError::Empty));
        assert!(matches!(
            "ab".parse::<ProgramKey>(),
            Err(ProgramKeyError::TooLong(_))
        ));
    }
}
