//! Query runner: asks every query and persists one output per query.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::gateway::{Gateway, RunMode};
use crate::queries::{Query, QueryFile};
use crate::store::{get_completed_ids, latest_run, RunId, RunStore, StoreError};

pub use crate::store::QueryOutput;

/// Loads the queries of a query file.
///
/// A missing or unparsable file yields no queries.
pub fn load_queries(path: &Path) -> Vec<Query> {
    match QueryFile::load(path) {
        Ok(file) => file.queries,
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "No queries loaded");
            Vec::new()
        }
    }
}

/// Subset of queries to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Skip queries with a lower id.
    pub start: Option<u64>,
    /// Run at most this many queries.
    pub limit: Option<usize>,
    /// Run exactly these ids; overrides `start` and `limit`.
    pub ids: Option<Vec<u64>>,
}

/// Applies `filter`, keeping input order.
pub fn filter_queries(queries: &[Query], filter: &QueryFilter) -> Vec<Query> {
    if let Some(ids) = &filter.ids {
        let wanted: BTreeSet<u64> = ids.iter().copied().collect();
        return queries
            .iter()
            .filter(|q| wanted.contains(&q.id))
            .cloned()
            .collect();
    }

    queries
        .iter()
        .filter(|q| filter.start.map_or(true, |start| q.id >= start))
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Which run a `run` invocation writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// A new run.
    Fresh,
    /// The most recent run, or a new one when none exists.
    Latest,
    /// A named existing run.
    Named(RunId),
}

/// The run being written and the queries it already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    /// Run being written.
    pub run: RunId,
    /// Query ids already answered in it.
    pub completed: BTreeSet<u64>,
}

/// What happened to one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Output persisted.
    Saved {
        /// Output file.
        path: PathBuf,
        /// Providers that failed.
        absent_slots: usize,
    },
    /// Already answered in the active run.
    Skipped,
    /// Providers were asked but the output could not be persisted.
    WriteFailed {
        /// Providers that failed.
        absent_slots: usize,
    },
}

/// Totals of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Outputs written.
    pub saved: usize,
    /// Queries skipped because the run already held them.
    pub skipped: usize,
    /// Outputs that could not be written.
    pub failed_writes: usize,
    /// Provider slots that came back absent.
    pub absent_slots: usize,
}

impl RunReport {
    fn record(&mut self, outcome: &QueryOutcome) {
        match outcome {
            QueryOutcome::Saved { absent_slots, .. } => {
                self.saved += 1;
                self.absent_slots += absent_slots;
            }
            QueryOutcome::Skipped => self.skipped += 1,
            QueryOutcome::WriteFailed { absent_slots } => {
                self.failed_writes += 1;
                self.absent_slots += absent_slots;
            }
        }
    }
}

/// Drives queries through the gateway into a run store.
pub struct QueryRunner {
    gateway: Gateway,
    store: Box<dyn RunStore>,
}

impl QueryRunner {
    /// Creates a runner.
    pub fn new(gateway: Gateway, store: Box<dyn RunStore>) -> Self {
        Self { gateway, store }
    }

    /// The store outputs are written to.
    pub fn store(&self) -> &dyn RunStore {
        self.store.as_ref()
    }

    /// Opens the run to write into.
    pub fn start_run(&self, resume: &Resume) -> Result<ActiveRun> {
        let run = match resume {
            Resume::Fresh => None,
            Resume::Latest => match latest_run(self.store.as_ref()) {
                Ok(run) => Some(run),
                Err(StoreError::SourceNotFound { .. }) => {
                    info!("No previous run to resume, starting a new one");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            Resume::Named(run) => {
                if !self.store.run_exists(run) {
                    return Err(StoreError::SourceNotFound {
                        what: "Run".to_string(),
                        path: self.store.run_location(run),
                    }
                    .into());
                }
                Some(run.clone())
            }
        };

        match run {
            Some(run) => {
                let completed = get_completed_ids(self.store.as_ref(), &run)
                    .with_context(|| format!("Failed to read completed queries of {run}"))?;
                info!(run = %run, completed = completed.len(), "Resuming run");
                Ok(ActiveRun { run, completed })
            }
            None => {
                let run = self.store.create_run().context("Failed to create run")?;
                Ok(ActiveRun {
                    run,
                    completed: BTreeSet::new(),
                })
            }
        }
    }

    /// Asks one query and persists its output.
    pub async fn run_query(
        &self,
        active: &ActiveRun,
        query: &Query,
        mode: &RunMode,
    ) -> QueryOutcome {
        if active.completed.contains(&query.id) {
            debug!(query_id = query.id, "Already answered, skipping");
            return QueryOutcome::Skipped;
        }

        info!(query_id = query.id, mode = %mode, "Running query");
        let response = self.gateway.ask_for_mode(mode, &query.text).await;
        let absent_slots = response.values().filter(|slot| slot.is_none()).count();

        let output = QueryOutput {
            query_id: query.id,
            question: query.text.clone(),
            response,
        };

        match self.store.write_output(&active.run, &output) {
            Ok(path) => QueryOutcome::Saved { path, absent_slots },
            Err(e) => {
                error!(query_id = query.id, error = %e, "Failed to save output");
                QueryOutcome::WriteFailed { absent_slots }
            }
        }
    }

    /// Runs `queries` one after another, calling `on_query` after each.
    pub async fn run_queries<F>(
        &self,
        active: &ActiveRun,
        queries: &[Query],
        mode: &RunMode,
        mut on_query: F,
    ) -> RunReport
    where
        F: FnMut(&Query, &QueryOutcome),
    {
        let mut report = RunReport::default();

        for query in queries {
            let outcome = self.run_query(active, query, mode).await;
            report.record(&outcome);
            on_query(query, &outcome);
        }

        info!(
            run = %active.run,
            saved = report.saved,
            skipped = report.skipped,
            failed_writes = report.failed_writes,
            absent_slots = report.absent_slots,
            "Run finished"
        );
        report
    }
}
