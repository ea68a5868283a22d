use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::Locator;
use crate::error::TripError;
use crate::store::{Workspace, staging_file};

pub trait Downloader: Send + Sync {
    /// Retrieves `locator` into `destination`, replacing any existing file. Returns bytes written.
    fn download(&self, locator: &Locator, destination: &Utf8Path) -> Result<u64, TripError>;
}

/// Suspends the fetch loop between retrievals.
pub trait Pacer {
    fn pause(&self, wait: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, wait: Duration) {
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    retries: usize,
}

impl HttpDownloader {
    pub fn new(retries: usize) -> Result<Self, TripError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("long-trips/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TripError::InvalidConfig(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| TripError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client, retries })
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, TripError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| "request failed".to_string());
        Err(TripError::HttpStatus {
            url: url.to_string(),
            status,
            message,
        })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, TripError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(url, status, attempt, "retrying download");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(url, attempt, error = %err, "retrying download");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(TripError::Http {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, locator: &Locator, destination: &Utf8Path) -> Result<u64, TripError> {
        let url = locator.as_str();
        let response = self.send_with_retries(url)?;
        let mut response = Self::handle_status(url, response)?;

        let download_err = |message: String| TripError::Download {
            path: destination.as_std_path().to_path_buf(),
            message,
        };
        let mut staged = staging_file(destination).map_err(|err| download_err(err.to_string()))?;
        let bytes = std::io::copy(&mut response, staged.as_file_mut()).map_err(|err| {
            TripError::Http {
                url: url.to_string(),
                message: err.to_string(),
            }
        })?;
        staged
            .as_file_mut()
            .flush()
            .map_err(|err| download_err(err.to_string()))?;
        staged
            .persist(destination.as_std_path())
            .map_err(|err| download_err(err.to_string()))?;
        Ok(bytes)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
    pub pauses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub locator: String,
    pub path: String,
    pub bytes: u64,
    pub latency_ms: u128,
}

/// Sequential fetch loop: one download, then one pause, per locator.
pub struct Fetcher<'a, D: Downloader, P: Pacer> {
    downloader: &'a D,
    pacer: &'a P,
    workspace: &'a Workspace,
    wait: Duration,
}

impl<'a, D: Downloader, P: Pacer> Fetcher<'a, D, P> {
    pub fn new(downloader: &'a D, pacer: &'a P, workspace: &'a Workspace, wait: Duration) -> Self {
        Self {
            downloader,
            pacer,
            workspace,
            wait,
        }
    }

    /// Stops at the first failing locator; files already fetched stay on disk.
    pub fn fetch_all<I>(&self, locators: I, sink: &dyn ProgressSink) -> Result<FetchResult, TripError>
    where
        I: IntoIterator<Item = Result<Locator, TripError>>,
    {
        let mut items = Vec::new();
        let mut pauses = 0usize;

        for locator in locators {
            let locator = locator?;
            let destination = self.workspace.partition_path(locator.file_name());

            sink.event(ProgressEvent::new(format!(
                "phase=Fetch; {} -> {destination}",
                locator
            )));
            let start = Instant::now();
            let bytes = self.downloader.download(&locator, &destination)?;
            let latency_ms = start.elapsed().as_millis();
            info!(%locator, path = %destination, bytes, latency_ms, "downloaded partition");

            items.push(FetchItemResult {
                locator: locator.to_string(),
                path: destination.to_string(),
                bytes,
                latency_ms,
            });

            self.pacer.pause(self.wait);
            pauses += 1;
        }

        Ok(FetchResult { items, pauses })
    }
}
