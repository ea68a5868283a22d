use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::{Dataset, ParquetDataset, Predicate, WrittenPartition};
use crate::error::TripError;
use crate::fetch::{Downloader, FetchResult, Fetcher, Pacer};
use crate::sources::SourceList;
use crate::store::{Workspace, remove_stale_outputs};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub partitions: usize,
    pub total_rows: u64,
    pub column: String,
    pub quantile: f64,
    pub threshold: f64,
    pub kept_rows: u64,
    pub kept_min: Option<f64>,
    pub kept_max: Option<f64>,
    pub files: Vec<WrittenPartition>,
    pub removed_stale: Vec<String>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub fetch: FetchResult,
    pub process: ProcessResult,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn timed(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            message: message.into(),
            elapsed: Some(elapsed),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<D: Downloader, P: Pacer> {
    config: PipelineConfig,
    workspace: Workspace,
    downloader: D,
    pacer: P,
}

impl<D: Downloader, P: Pacer> App<D, P> {
    pub fn new(config: PipelineConfig, downloader: D, pacer: P) -> Self {
        let workspace = Workspace::from_config(&config);
        Self {
            config,
            workspace,
            downloader,
            pacer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunResult, TripError> {
        let fetch = self.fetch(sink)?;
        let process = self.process(sink)?;
        Ok(RunResult { fetch, process })
    }

    /// Prepares the workspace and downloads every locator in the source list.
    pub fn fetch(&self, sink: &dyn ProgressSink) -> Result<FetchResult, TripError> {
        self.prepare(sink)?;

        sink.event(ProgressEvent::new(format!(
            "phase=Resolve; reading {}",
            self.config.source_list
        )));
        let sources = SourceList::open(&self.config.source_list)?;

        let start = Instant::now();
        let fetcher = Fetcher::new(
            &self.downloader,
            &self.pacer,
            &self.workspace,
            self.config.wait,
        );
        let result = fetcher.fetch_all(sources, sink)?;
        sink.event(ProgressEvent::timed(
            format!("phase=Fetch; downloaded {} files", result.items.len()),
            start.elapsed(),
        ));
        info!(files = result.items.len(), "fetch complete");
        Ok(result)
    }

    /// Computes the threshold over the downloaded partitions and writes the rows above it.
    pub fn process(&self, sink: &dyn ProgressSink) -> Result<ProcessResult, TripError> {
        self.prepare(sink)?;
        let column = self.config.column.as_str();
        let start = Instant::now();

        sink.event(ProgressEvent::new(format!(
            "phase=Load; scanning {}",
            self.workspace.data_dir()
        )));
        let dataset = ParquetDataset::open(
            self.workspace.data_dir(),
            &self.config.extension,
            self.config.batch_size,
        )?;
        dataset.validate_column(column)?;
        let total_rows = dataset.row_count()?;
        info!(
            partitions = dataset.partition_count(),
            rows = total_rows,
            "dataset loaded"
        );

        sink.event(ProgressEvent::new(format!(
            "phase=Threshold; quantile {} of {column}",
            self.config.quantile
        )));
        let threshold = dataset.quantile(column, self.config.quantile)?;
        info!(column, quantile = self.config.quantile, threshold, "threshold computed");

        sink.event(ProgressEvent::new(format!(
            "phase=Write; rows with {column} > {threshold}"
        )));
        let filtered = dataset.filter(Predicate::greater_than(column, threshold))?;
        let naming = self.config.naming()?;
        let summary = filtered.write(self.workspace.results_dir(), &|index| naming.name(index))?;
        let removed = remove_stale_outputs(self.workspace.results_dir(), &naming, summary.files.len())?;
        for path in &removed {
            info!(%path, "removed stale output");
        }

        let range = filtered.column_range(column)?;
        info!(rows = summary.rows, files = summary.files.len(), "results written");
        sink.event(ProgressEvent::timed(
            format!("phase=Done; kept {} of {total_rows} rows", summary.rows),
            start.elapsed(),
        ));

        Ok(ProcessResult {
            partitions: dataset.partition_count(),
            total_rows,
            column: column.to_string(),
            quantile: self.config.quantile,
            threshold,
            kept_rows: summary.rows,
            kept_min: range.map(|(min, _)| min),
            kept_max: range.map(|(_, max)| max),
            files: summary.files,
            removed_stale: removed.into_iter().map(|path| path.to_string()).collect(),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    fn prepare(&self, sink: &dyn ProgressSink) -> Result<(), TripError> {
        sink.event(ProgressEvent::new(format!(
            "phase=Prepare; {} and {}",
            self.workspace.data_dir(),
            self.workspace.results_dir()
        )));
        self.workspace.prepare()
    }
}
