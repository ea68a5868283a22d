use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::{ProcessResult, ProgressEvent, ProgressSink, RunResult};
use crate::fetch::FetchResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_process(result: &ProcessResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable output: progress on stderr, status lines on stdout.
pub struct ConsoleOutput {
    verbose: bool,
}

impl ConsoleOutput {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn downloaded_message(data_dir: &Utf8Path) -> String {
        format!("Files downloaded to {} folder.", folder_name(data_dir))
    }

    pub fn processed_message(results_dir: &Utf8Path) -> String {
        format!(
            "Process complete. Files with results saved in {} folder.",
            folder_name(results_dir)
        )
    }

    pub fn print_fetch(&self, data_dir: &Utf8Path) {
        println!("{}", Self::downloaded_message(data_dir));
    }

    pub fn print_process(&self, results_dir: &Utf8Path, result: &ProcessResult) {
        if self.verbose {
            eprintln!(
                "{} > {:.4} (q={}): kept {} of {} rows in {} files",
                result.column,
                result.threshold,
                result.quantile,
                result.kept_rows,
                result.total_rows,
                result.files.len()
            );
        }
        println!("{}", Self::processed_message(results_dir));
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        if !self.verbose {
            return;
        }
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

fn folder_name(dir: &Utf8Path) -> &str {
    dir.file_name().unwrap_or(dir.as_str())
}
