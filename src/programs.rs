//! Program registry: named channel masks loaded once at startup

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Mask, ProgramKey};

mod csv;
pub use self::csv::CsvSource;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid program table: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("program table has no key column")]
    MissingKeyColumn,
    #[error("no programs found in {0}")]
    Empty(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("program '{key}' not found")]
pub struct NotFound {
    pub key: String,
}

impl NotFound {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// A source of program definitions
#[async_trait]
pub trait ProgramSource: Send + Sync {
    /// Human-readable name of the source, for logging
    fn name(&self) -> String;

    async fn read(&self) -> Result<BTreeMap<ProgramKey, Mask>, LoadError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProgramRegistry {
    programs: BTreeMap<ProgramKey, Mask>,
}

impl ProgramRegistry {
    pub fn from_map(programs: BTreeMap<ProgramKey, Mask>) -> Self {
        Self { programs }
    }

    /// Load programs from a source, retrying with linear backoff
    ///
    /// A source that reads successfully but yields no program counts as a failed attempt.
    #[instrument(skip(source), fields(source = %source.name()))]
    pub async fn load(source: &dyn ProgramSource, policy: RetryPolicy) -> Result<Self, LoadError> {
        let mut attempt = 0;

        loop {
            let error = match source.read().await {
                Ok(programs) if !programs.is_empty() => {
                    info!(count = programs.len(), "loaded programs");
                    return Ok(Self { programs });
                }
                Ok(_) => LoadError::Empty(source.name()),
                Err(error) => error,
            };

            if attempt >= policy.max_retries {
                error!(error = %error, attempts = attempt + 1, "giving up on loading programs");
                return Err(error);
            }

            attempt += 1;
            let delay = policy.base_delay * attempt;
            warn!(error = %error, attempt, delay = ?delay, "loading programs failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    pub fn get(&self, key: &str) -> Result<&Mask, NotFound> {
        key.parse::<ProgramKey>()
            .ok()
            .and_then(|parsed| self.programs.get(&parsed))
            .ok_or_else(|| NotFound::new(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    /// Program keys in ascending order
    pub fn keys(&self) -> Vec<ProgramKey> {
        self.programs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProgramSource for FlakySource {
        fn name(&self) -> String {
            "flaky".to_owned()
        }

        async fn read(&self) -> Result<BTreeMap<ProgramKey, Mask>, LoadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            if call < self.failures {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into());
            }

            let mut programs = BTreeMap::new();
            programs.insert(ProgramKey::new('a'), Mask::new(vec![true]));
            Ok(programs)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn load_retries_with_backoff() {
        let source = FlakySource {
            failures: 3,
            calls: AtomicU32::new(0),
        };

        let start = tokio::time::Instant::now();
        let registry = ProgramRegistry::load(&source, RetryPolicy::default())
            .await
            .expect("load should succeed on the last retry");

        assert_eq!(registry.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn load_gives_up_after_max_retries() {
        let source = FlakySource {
            failures: 10,
            calls: AtomicU32::new(0),
        };

        let result = ProgramRegistry::load(&source, RetryPolicy::default()).await;

        assert!(matches!(result, Err(LoadError::Io(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn get_unknown_key_is_not_found() {
        let mut programs = BTreeMap::new();
        programs.insert(ProgramKey::new('b'), Mask::all());
        programs.insert(ProgramKey::new('a'), Mask::new(vec![true, false]));
        let registry = ProgramRegistry::from_map(programs);

        assert_eq!(registry.get("A").map(Mask::count), Ok(1));
        assert_eq!(registry.get("x"), Err(NotFound::new("x")));
        assert_eq!(registry.get("ab"), Err(NotFound::new("ab")));
        assert_eq!(
            registry.keys(),
            vec![ProgramKey::new('a'), ProgramKey::new('b')]
        );
    }
}
