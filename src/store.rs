//! Flat-file storage for runs.
//!
//! A run is a directory `run_<timestamp>` under the results root holding one
//! `output_<id>.json` per query and, once analysed, an `analysis.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::AnalysisRecord;
use crate::gateway::ProviderResponse;

const RUN_PREFIX: &str = "run_";
const OUTPUT_PREFIX: &str = "output_";
const OUTPUT_SUFFIX: &str = ".json";

/// File name of the analysis table inside a run.
pub const ANALYSIS_FILE: &str = "analysis.json";

/// Identifier of a run: its directory name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    /// Wraps an existing run name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns a fresh id stamped with the local time.
    pub fn generate() -> Self {
        Self(Local::now().format("run_%Y-%m-%d_%H-%M-%S").to_string())
    }

    /// Directory name of the run.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One query's answers from every asked provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Id of the query.
    #[serde(rename = "id")]
    pub query_id: u64,
    /// Question text as sent.
    pub question: String,
    /// Provider id to answer; `None` when the provider failed.
    pub response: BTreeMap<String, Option<ProviderResponse>>,
}

/// Errors raised by a [`RunStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    Persistence {
        /// Target file.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// The requested run, or any run at all, does not exist.
    #[error("{what} not found at {}", .path.display())]
    SourceNotFound {
        /// What was looked for.
        what: String,
        /// Where it was looked for.
        path: PathBuf,
    },

    /// A stored record is not valid JSON of the expected shape.
    #[error("Malformed record {}: {source}", .path.display())]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// A stored record could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },
}

/// Storage backend for runs.
pub trait RunStore: Send + Sync {
    /// Root directory holding every run.
    fn root(&self) -> &Path;

    /// Location of a run.
    fn run_location(&self, run: &RunId) -> PathBuf;

    /// Lists runs, most recently modified first.
    fn list_runs(&self) -> Result<Vec<RunId>, StoreError>;

    /// Creates a new, empty run.
    fn create_run(&self) -> Result<RunId, StoreError>;

    /// Returns true when the run exists.
    fn run_exists(&self, run: &RunId) -> bool;

    /// Names of every file stored in a run, sorted.
    fn output_names(&self, run: &RunId) -> Result<Vec<String>, StoreError>;

    /// Persists one query output. Never overwrites an existing record.
    fn write_output(&self, run: &RunId, output: &QueryOutput) -> Result<PathBuf, StoreError>;

    /// Reads a record by file name.
    fn read_output(&self, run: &RunId, name: &str) -> Result<QueryOutput, StoreError>;

    /// Writes the analysis table of a run, replacing any previous one.
    fn write_analysis(
        &self,
        run: &RunId,
        records: &[AnalysisRecord],
    ) -> Result<PathBuf, StoreError>;
}

/// File name of the output record for `query_id`.
pub fn output_file_name(query_id: u64) -> String {
    format!("{OUTPUT_PREFIX}{query_id}{OUTPUT_SUFFIX}")
}

/// Extracts the query id from an `output_<n>.json` file name.
pub fn parse_output_id(name: &str) -> Option<u64> {
    name.strip_prefix(OUTPUT_PREFIX)?
        .strip_suffix(OUTPUT_SUFFIX)?
        .parse()
        .ok()
}

/// Query ids that already have an output record among `names`.
pub fn completed_ids_from_names<I, S>(names: I) -> BTreeSet<u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| parse_output_id(name.as_ref()))
        .collect()
}

/// Query ids already answered in `run`.
pub fn get_completed_ids(store: &dyn RunStore, run: &RunId) -> Result<BTreeSet<u64>, StoreError> {
    Ok(completed_ids_from_names(store.output_names(run)?))
}

/// The most recently modified run.
pub fn latest_run(store: &dyn RunStore) -> Result<RunId, StoreError> {
    store
        .list_runs()?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::SourceNotFound {
            what: "No run".to_string(),
            path: store.root().to_path_buf(),
        })
}

/// Writes a file at `path` through a temporary sibling that is moved into
/// place once `write` succeeds. A failed write leaves nothing at `path`.
///
/// With `overwrite` false an existing file at `path` is an `AlreadyExists`
/// error.
fn persist_file<F>(path: &Path, overwrite: bool, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".partial_")
        .tempfile_in(dir)?;

    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    if overwrite {
        temp.persist(path)?;
    } else {
        temp.persist_noclobber(path)?;
    }
    Ok(())
}

/// Run store backed by directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRunStore {
    root: PathBuf,
}

impl FsRunStore {
    /// Creates a store rooted at `root`. Nothing is created until a run is.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_error(path: &Path, source: io::Error) -> StoreError {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::SourceNotFound {
                what: "Run".to_string(),
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl RunStore for FsRunStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn run_location(&self, run: &RunId) -> PathBuf {
        self.root.join(run.as_str())
    }

    fn list_runs(&self) -> Result<Vec<RunId>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut runs: Vec<(SystemTime, RunId)> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                if !name.starts_with(RUN_PREFIX) {
                    return None;
                }
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                Some((modified, RunId(name)))
            })
            .collect();

        runs.sort_by(|a, b| b.cmp(a));
        Ok(runs.into_iter().map(|(_, run)| run).collect())
    }

    fn create_run(&self) -> Result<RunId, StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Persistence {
            path: self.root.clone(),
            source,
        })?;

        let base = RunId::generate();
        let mut run = base.clone();
        let mut suffix = 1;
        loop {
            let path = self.run_location(&run);
            match fs::create_dir(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Created run directory");
                    return Ok(run);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    run = RunId(format!("{base}_{suffix}"));
                }
                Err(source) => return Err(StoreError::Persistence { path, source }),
            }
        }
    }

    fn run_exists(&self, run: &RunId) -> bool {
        self.run_location(run).is_dir()
    }

    fn output_names(&self, run: &RunId) -> Result<Vec<String>, StoreError> {
        let dir = self.run_location(run);
        let entries = fs::read_dir(&dir).map_err(|e| Self::read_error(&dir, e))?;

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    fn write_output(&self, run: &RunId, output: &QueryOutput) -> Result<PathBuf, StoreError> {
        let path = self
            .run_location(run)
            .join(output_file_name(output.query_id));
        let json = serde_json::to_string_pretty(output).map_err(|e| StoreError::Persistence {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let written = persist_file(&path, false, |file| {
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")
        });

        match written {
            Ok(()) => {
                debug!(path = %path.display(), query_id = output.query_id, "Saved output");
                Ok(path)
            }
            Err(source) => Err(StoreError::Persistence { path, source }),
        }
    }

    fn read_output(&self, run: &RunId, name: &str) -> Result<QueryOutput, StoreError> {
        let path = self.run_location(run).join(name);
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Malformed { path, source })
    }

    fn write_analysis(
        &self,
        run: &RunId,
        records: &[AnalysisRecord],
    ) -> Result<PathBuf, StoreError> {
        let path = self.run_location(run).join(ANALYSIS_FILE);
        let mut json = serde_json::to_string_pretty(records).map_err(|e| {
            StoreError::Persistence {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            }
        })?;
        json.push('\n');

        persist_file(&path, true, |file| file.write_all(json.as_bytes())).map_err(|source| {
            StoreError::Persistence {
                path: path.clone(),
                source,
            }
        })?;
        info!(path = %path.display(), records = records.len(), "Saved analysis");
        Ok(path)
    }
}
