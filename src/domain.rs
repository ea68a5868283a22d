use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TripError;

/// A remote resource address naming one data file to download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The substring after the last `/`, used as the local file name.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Locator {
    type Err = TripError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TripError::InvalidLocator("empty locator".to_string()));
        }
        let locator = Self(trimmed.to_string());
        let name = locator.file_name();
        if name.is_empty() || name == "." || name == ".." {
            return Err(TripError::InvalidLocator(value.to_string()));
        }
        Ok(locator)
    }
}

/// Deterministic file names for output partitions: `<prefix>-<index>.<extension>`.
#[derive(Debug, Clone)]
pub struct PartitionNaming {
    prefix: String,
    extension: String,
    pattern: Regex,
}

impl PartitionNaming {
    pub fn new(prefix: &str, extension: &str) -> Result<Self, TripError> {
        let pattern = Regex::new(&format!(
            r"^{}-(\d+)\.{}$",
            regex::escape(prefix),
            regex::escape(extension)
        ))
        .map_err(|err| TripError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            pattern,
        })
    }

    pub fn name(&self, index: usize) -> String {
        format!("{}-{index}.{}", self.prefix, self.extension)
    }

    /// Recovers the partition index from a file name produced by [`Self::name`].
    pub fn index_of(&self, file_name: &str) -> Option<usize> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|idx| idx.as_str().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        let locator: Locator =
            "https://example.org/trip-data/yellow_tripdata_2009-01.parquet\n"
                .parse()
                .unwrap();
        assert_eq!(locator.file_name(), "yellow_tripdata_2009-01.parquet");
    }

    #[test]
    fn naming_round_trips_index() {
        let naming = PartitionNaming::new("LongTrips", "parquet").unwrap();
        assert_eq!(naming.name(3), "LongTrips-3.parquet");
        assert_eq!(naming.index_of("LongTrips-3.parquet"), Some(3));
        assert_eq!(naming.index_of("LongTrips-3.parquet.tmp"), None);
    }
}
