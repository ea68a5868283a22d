use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile};

use crate::config::PipelineConfig;
use crate::domain::PartitionNaming;
use crate::error::TripError;

/// The two staging directories a run reads from and writes to.
#[derive(Debug, Clone)]
pub struct Workspace {
    data_dir: Utf8PathBuf,
    results_dir: Utf8PathBuf,
}

impl Workspace {
    pub fn new(data_dir: Utf8PathBuf, results_dir: Utf8PathBuf) -> Self {
        Self {
            data_dir,
            results_dir,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.data_dir.clone(), config.results_dir.clone())
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn results_dir(&self) -> &Utf8Path {
        &self.results_dir
    }

    /// Local destination for a downloaded partition.
    pub fn partition_path(&self, file_name: &str) -> Utf8PathBuf {
        self.data_dir.join(file_name)
    }

    /// Creates both staging directories. Safe to call on every run.
    pub fn prepare(&self) -> Result<(), TripError> {
        ensure_dirs(&[self.data_dir.as_path(), self.results_dir.as_path()])
    }
}

pub fn ensure_dirs(paths: &[&Utf8Path]) -> Result<(), TripError> {
    for path in paths {
        let std_path = path.as_std_path();
        if std_path.exists() && !std_path.is_dir() {
            return Err(TripError::NotADirectory(std_path.to_path_buf()));
        }
        fs::create_dir_all(std_path)
            .map_err(|err| TripError::Workspace(format!("create {path}: {err}")))?;
    }
    Ok(())
}

/// Regular files in `dir` with the given extension, sorted by file name.
pub fn list_partitions(dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>, TripError> {
    let entries = fs::read_dir(dir.as_std_path()).map_err(|err| TripError::Parquet {
        path: dir.as_std_path().to_path_buf(),
        message: err.to_string(),
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| TripError::Parquet {
            path: dir.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            continue;
        };
        if path.extension() == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A temp file next to `dest`, to be persisted over it once fully written.
pub fn staging_file(dest: &Utf8Path) -> Result<NamedTempFile, TripError> {
    let parent = dest.parent().ok_or_else(|| TripError::Write {
        path: dest.as_std_path().to_path_buf(),
        message: "invalid destination path".to_string(),
    })?;
    Builder::new()
        .prefix(".long-trips")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TripError::Write {
            path: dest.as_std_path().to_path_buf(),
            message: err.to_string(),
        })
}

/// Removes `<prefix>-<k>.<ext>` files with `k >= keep` left behind by an earlier run.
pub fn remove_stale_outputs(
    dir: &Utf8Path,
    naming: &PartitionNaming,
    keep: usize,
) -> Result<Vec<Utf8PathBuf>, TripError> {
    let write_err = |message: String| TripError::Write {
        path: dir.as_std_path().to_path_buf(),
        message,
    };
    let mut removed = Vec::new();
    let entries = fs::read_dir(dir.as_std_path()).map_err(|err| write_err(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| write_err(err.to_string()))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        match naming.index_of(&name) {
            Some(index) if index >= keep => {
                let path = dir.join(&name);
                fs::remove_file(path.as_std_path())
                    .map_err(|err| write_err(format!("remove {path}: {err}")))?;
                removed.push(path);
            }
            _ => {}
        }
    }
    removed.sort();
    Ok(removed)
}
