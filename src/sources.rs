use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::Locator;
use crate::error::TripError;

/// Lazily yields one [`Locator`] per non-blank line of a source list file.
pub struct SourceList {
    path: Utf8PathBuf,
    lines: Lines<BufReader<File>>,
}

impl SourceList {
    pub fn open(path: &Utf8Path) -> Result<Self, TripError> {
        if !path.as_std_path().exists() {
            return Err(TripError::MissingSourceList(path.as_std_path().to_path_buf()));
        }
        let file = File::open(path.as_std_path()).map_err(|err| TripError::SourceListRead {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Iterator for SourceList {
    type Item = Result<Locator, TripError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(TripError::SourceListRead {
                        path: self.path.as_std_path().to_path_buf(),
                        message: err.to_string(),
                    }));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(line.parse());
        }
    }
}
