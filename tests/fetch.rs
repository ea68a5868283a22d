use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use long_trips::app::{ProgressEvent, ProgressSink};
use long_trips::domain::Locator;
use long_trips::error::TripError;
use long_trips::fetch::{Downloader, Fetcher, HttpDownloader, Pacer};
use long_trips::store::Workspace;

struct SilentSink;

impl ProgressSink for SilentSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct MockDownloader {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl Downloader for MockDownloader {
    fn download(&self, locator: &Locator, destination: &Utf8Path) -> Result<u64, TripError> {
        self.calls.lock().unwrap().push(locator.to_string());
        if self.fail_on.as_deref() == Some(locator.as_str()) {
            return Err(TripError::HttpStatus {
                url: locator.to_string(),
                status: 404,
                message: "not found".to_string(),
            });
        }
        let body = format!("payload of {locator}");
        std::fs::write(destination.as_std_path(), &body).unwrap();
        Ok(body.len() as u64)
    }
}

#[derive(Default)]
struct RecordingPacer {
    pauses: RefCell<Vec<Duration>>,
}

impl Pacer for RecordingPacer {
    fn pause(&self, wait: Duration) {
        self.pauses.borrow_mut().push(wait);
    }
}

fn workspace(temp: &tempfile::TempDir) -> Workspace {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let workspace = Workspace::new(root.join("Data"), root.join("Results"));
    workspace.prepare().unwrap();
    workspace
}

fn locators(urls: &[&str]) -> Vec<Result<Locator, TripError>> {
    urls.iter().map(|url| url.parse()).collect()
}

#[test]
fn one_file_per_locator_and_one_pause_each() {
    let temp = tempfile::tempdir().unwrap();
    let workspace = workspace(&temp);
    let downloader = MockDownloader::default();
    let pacer = RecordingPacer::default();
    let fetcher = Fetcher::new(&downloader, &pacer, &workspace, Duration::from_secs(1));

    let result = fetcher
        .fetch_all(
            locators(&[
                "https://example.org/trip-data/yellow_2009-01.parquet",
                "https://example.org/trip-data/yellow_2009-02.parquet",
                "https://example.org/other/yellow_2009-03.parquet",
            ]),
            &SilentSink,
        )
        .unwrap();

    assert_eq!(result.items.len(), 3);
    assert_eq!(result.pauses, 3);
    assert_eq!(*pacer.pauses.borrow(), vec![Duration::from_secs(1); 3]);
    for name in [
        "yellow_2009-01.parquet",
        "yellow_2009-02.parquet",
        "yellow_2009-03.parquet",
    ] {
        assert!(workspace.data_dir().join(name).as_std_path().is_file());
    }
    assert_eq!(
        *downloader.calls.lock().unwrap(),
        vec![
            "https://example.org/trip-data/yellow_2009-01.parquet",
            "https://example.org/trip-data/yellow_2009-02.parquet",
            "https://example.org/other/yellow_2009-03.parquet",
        ]
    );
}

#[test]
fn refetch_overwrites_existing_files() {
    let temp = tempfile::tempdir().unwrap();
    let workspace = workspace(&temp);
    let existing = workspace.partition_path("a.parquet");
    std::fs::write(existing.as_std_path(), "stale").unwrap();

    let downloader = MockDownloader::default();
    let pacer = RecordingPacer::default();
    let fetcher = Fetcher::new(&downloader, &pacer, &workspace, Duration::ZERO);
    let urls = ["https://example.org/a.parquet"];

    fetcher.fetch_all(locators(&urls), &SilentSink).unwrap();
    fetcher.fetch_all(locators(&urls), &SilentSink).unwrap();

    let content = std::fs::read_to_string(existing.as_std_path()).unwrap();
    assert_eq!(content, "payload of https://example.org/a.parquet");
    assert_eq!(pacer.pauses.borrow().len(), 2);
}

#[test]
fn first_failure_aborts_remaining_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let workspace = workspace(&temp);
    let downloader = MockDownloader {
        fail_on: Some("https://example.org/b.parquet".to_string()),
        ..MockDownloader::default()
    };
    let pacer = RecordingPacer::default();
    let fetcher = Fetcher::new(&downloader, &pacer, &workspace, Duration::ZERO);

    let err = fetcher
        .fetch_all(
            locators(&[
                "https://example.org/a.parquet",
                "https://example.org/b.parquet",
                "https://example.org/c.parquet",
            ]),
            &SilentSink,
        )
        .unwrap_err();

    assert_matches!(err, TripError::HttpStatus { status: 404, .. });
    assert_eq!(downloader.calls.lock().unwrap().len(), 2);
    assert_eq!(pacer.pauses.borrow().len(), 1);
    assert!(workspace.partition_path("a.parquet").as_std_path().exists());
    assert!(!workspace.partition_path("c.parquet").as_std_path().exists());
}

#[test]
fn invalid_locator_stops_before_download() {
    let temp = tempfile::tempdir().unwrap();
    let workspace = workspace(&temp);
    let downloader = MockDownloader::default();
    let pacer = RecordingPacer::default();
    let fetcher = Fetcher::new(&downloader, &pacer, &workspace, Duration::ZERO);

    let err = fetcher
        .fetch_all(locators(&["https://example.org/dir/"]), &SilentSink)
        .unwrap_err();
    assert_matches!(err, TripError::InvalidLocator(_));
    assert!(downloader.calls.lock().unwrap().is_empty());
}

/// Serves `responses` in order, one per connection, and returns the bound address.
fn serve(responses: Vec<(u16, &'static [u8])>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let head = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
        }
    });
    format!("http://{addr}")
}

#[test]
fn http_downloader_writes_body_to_destination() {
    let base = serve(vec![(200, &b"PAR1 fake body"[..])]);
    let temp = tempfile::tempdir().unwrap();
    let dest = Utf8PathBuf::from_path_buf(temp.path().join("file.parquet")).unwrap();
    std::fs::write(dest.as_std_path(), "old").unwrap();

    let downloader = HttpDownloader::new(0).unwrap();
    let locator: Locator = format!("{base}/data/file.parquet").parse().unwrap();
    let bytes = downloader.download(&locator, &dest).unwrap();

    assert_eq!(bytes, 14);
    assert_eq!(std::fs::read(dest.as_std_path()).unwrap(), b"PAR1 fake body");
}

#[test]
fn http_downloader_rejects_error_status_without_retry() {
    let base = serve(vec![(404, &b"missing"[..])]);
    let temp = tempfile::tempdir().unwrap();
    let dest = Utf8PathBuf::from_path_buf(temp.path().join("file.parquet")).unwrap();

    let downloader = HttpDownloader::new(0).unwrap();
    let locator: Locator = format!("{base}/file.parquet").parse().unwrap();
    let err = downloader.download(&locator, &dest).unwrap_err();

    assert_matches!(err, TripError::HttpStatus { status: 404, .. });
    assert!(!dest.as_std_path().exists());
}

#[test]
fn http_downloader_retries_transient_status_when_enabled() {
    let base = serve(vec![(503, &b"busy"[..]), (200, &b"ok"[..])]);
    let temp = tempfile::tempdir().unwrap();
    let dest = Utf8PathBuf::from_path_buf(temp.path().join("file.parquet")).unwrap();

    let downloader = HttpDownloader::new(1).unwrap();
    let locator: Locator = format!("{base}/file.parquet").parse().unwrap();
    downloader.download(&locator, &dest).unwrap();

    assert_eq!(std::fs::read(dest.as_std_path()).unwrap(), b"ok");
}

#[test]
#[ignore]
fn downloads_real_trip_file() {
    let temp = tempfile::tempdir().unwrap();
    let dest = Utf8PathBuf::from_path_buf(temp.path().join("yellow_tripdata_2009-01.parquet")).unwrap();
    let downloader = HttpDownloader::new(0).unwrap();
    let locator: Locator =
        "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2009-01.parquet"
            .parse()
            .unwrap();
    let bytes = downloader.download(&locator, &dest).unwrap();
    assert!(bytes > 0);
}
