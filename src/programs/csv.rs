use std::{
    collections::BTreeMap,
    io::Read,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use super::{LoadError, ProgramSource};
use crate::models::{Mask, ProgramKey, CHANNEL_COUNT};

const KEY_COLUMN: &str = "key";

/// Program table stored as a `;`-separated file
///
/// The header row names a `key` column, every other column is a channel in order. A channel is
/// part of a program when its cell holds an integer greater than zero.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn header_name(field: &str) -> String {
    field.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn is_lit(cell: &str) -> bool {
    cell.trim().parse::<i64>().map_or(false, |value| value > 0)
}

pub fn parse(reader: impl Read) -> Result<BTreeMap<ProgramKey, Mask>, LoadError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let key_column = reader
        .headers()?
        .iter()
        .position(|field| header_name(field) == KEY_COLUMN)
        .ok_or(LoadError::MissingKeyColumn)?;

    let mut programs = BTreeMap::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let raw_key = record.get(key_column).unwrap_or_default();

        let key: ProgramKey = match raw_key.parse() {
            Ok(key) => key,
            Err(error) => {
                warn!(row = row + 1, error = %error, "skipping program row");
                continue;
            }
        };

        let mut bits: Vec<bool> = record
            .iter()
            .enumerate()
            .filter(|(column, _)| *column != key_column)
            .map(|(_, cell)| is_lit(cell))
            .collect();

        if bits.len() > CHANNEL_COUNT {
            warn!(key = %key, channels = bits.len(), "truncating program to {} channels", CHANNEL_COUNT);
            bits.truncate(CHANNEL_COUNT);
        }

        if programs.insert(key, Mask::new(bits)).is_some() {
            warn!(key = %key, "duplicate program, keeping the last definition");
        }
    }

    Ok(programs)
}

#[async_trait]
impl ProgramSource for CsvSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<BTreeMap<ProgramKey, Mask>, LoadError> {
        let data = tokio::fs::read(&self.path).await?;
        parse(data.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::{ProgramRegistry, RetryPolicy};

    const TABLE: &str = "\u{feff}key;ch1;ch2;ch3\nA;255;0;1\nq;1;1;1\nzz;1;1;1\n;1;0;0\nb;0;x;-3\n";

    #[test]
    fn parse_table() {
        let programs = parse(TABLE.as_bytes()).expect("table should parse");

        assert_eq!(programs.len(), 3);

        let a = &programs[&ProgramKey::new('a')];
        assert!(a.is_set(0));
        assert!(!a.is_set(1));
        assert!(a.is_set(2));

        assert_eq!(programs[&ProgramKey::new('q')].count(), 3);
        assert_eq!(programs[&ProgramKey::new('b')].count(), 0);
    }

    #[test]
    fn key_column_need_not_be_first() {
        let programs = parse("ch1;Key;ch2\n1;c;0\n".as_bytes()).expect("table should parse");
        let c = &programs[&ProgramKey::new('c')];

        assert_eq!(c.len(), 2);
        assert!(c.is_set(0));
        assert!(!c.is_set(1));
    }

    #[test]
    fn missing_key_column() {
        let result = parse("name;ch1\na;1\n".as_bytes());
        assert!(matches!(result, Err(LoadError::MissingKeyColumn)));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("programs.csv");
        tokio::fs::write(&path, TABLE).await.expect("write table");

        let registry = ProgramRegistry::load(&CsvSource::new(&path), RetryPolicy::default())
            .await
            .expect("registry should load");

        assert!(registry.contains("q"));
        assert!(registry.get("a").is_ok());
    }
}
