// 🌐 Place Fetcher - remote endpoint or bundled dataset
//
// RemoteSource: HTTP GET of a JSON document
// BundledSource: the embedded dataset, or a JSON/CSV file on disk
// FallbackSource: primary source, falling back to a second one on error
//
// Fetches are blocking. fetch_in_background moves one onto a worker
// thread and delivers a single result over a channel.

use crate::place::Place;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Dataset shipped with the binary, used when no remote endpoint answers
pub const EMBEDDED_DATASET: &str = include_str!("../data/places.json");

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// Document is not JSON, or not an array of records
    #[error("Invalid place document: {0}")]
    Parse(String),

    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV dataset: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

// ============================================================================
// RECORD VALIDATION
// ============================================================================

/// Document shapes accepted from a place endpoint
#[derive(Deserialize)]
#[serde(untagged)]
enum PlaceDocument {
    List(Vec<serde_json::Value>),
    Wrapped { places: Vec<serde_json::Value> },
}

/// Parse a JSON place document.
///
/// Accepts a bare array of records or an object with a `places` array.
/// Records with missing or mistyped fields are skipped with a warning;
/// only a malformed document as a whole is an error.
pub fn parse_records(text: &str) -> Result<Vec<Place>, FetchError> {
    let document: PlaceDocument = serde_json::from_str(text)?;
    let raw = match document {
        PlaceDocument::List(records) => records,
        PlaceDocument::Wrapped { places } => places,
    };

    let total = raw.len();
    let mut places = Vec::with_capacity(total);

    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<Place>(value) {
            Ok(place) => places.push(place),
            Err(e) => warn!(index, error = %e, "skipping malformed place record"),
        }
    }

    debug!(accepted = places.len(), rejected = total - places.len(), "parsed place records");
    Ok(places)
}

/// Parse a CSV dataset with a header row of the record field names
pub fn parse_csv_records<R: std::io::Read>(reader: R) -> Result<Vec<Place>, FetchError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut places = Vec::new();

    for (index, result) in rdr.deserialize::<Place>().enumerate() {
        match result {
            Ok(place) => places.push(place),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => warn!(index, error = %e, "skipping malformed CSV place record"),
        }
    }

    Ok(places)
}

// ============================================================================
// SOURCES
// ============================================================================

/// Anything that can produce a batch of place records
pub trait PlaceSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<Place>, FetchError>;

    /// Short human-readable name, recorded in the refresh log
    fn describe(&self) -> String;
}

impl<S: PlaceSource + ?Sized> PlaceSource for Box<S> {
    fn fetch(&self) -> Result<Vec<Place>, FetchError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: PlaceSource + ?Sized> PlaceSource for Arc<S> {
    fn fetch(&self) -> Result<Vec<Place>, FetchError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// JSON document served over HTTP
pub struct RemoteSource {
    url: String,
    timeout: Duration,
}

impl RemoteSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PlaceSource for RemoteSource {
    fn fetch(&self) -> Result<Vec<Place>, FetchError> {
        // Built per fetch so the blocking client never lives inside an async runtime
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        info!(url = %self.url, "fetching places");
        let response = client.get(&self.url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text()?;
        parse_records(&body)
    }

    fn describe(&self) -> String {
        format!("remote:{}", self.url)
    }
}

enum Bundle {
    Embedded,
    File(PathBuf),
}

/// Dataset available without network access
pub struct BundledSource {
    bundle: Bundle,
}

impl BundledSource {
    /// The dataset compiled into the binary
    pub fn embedded() -> Self {
        Self { bundle: Bundle::Embedded }
    }

    /// A `.json` or `.csv` dataset on disk, read at fetch time
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            bundle: Bundle::File(path.as_ref().to_path_buf()),
        }
    }
}

impl PlaceSource for BundledSource {
    fn fetch(&self) -> Result<Vec<Place>, FetchError> {
        match &self.bundle {
            Bundle::Embedded => parse_records(EMBEDDED_DATASET),
            Bundle::File(path) => {
                let is_csv = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false);

                if is_csv {
                    parse_csv_records(std::fs::File::open(path)?)
                } else {
                    parse_records(&std::fs::read_to_string(path)?)
                }
            }
        }
    }

    fn describe(&self) -> String {
        match &self.bundle {
            Bundle::Embedded => "bundled".to_string(),
            Bundle::File(path) => format!("file:{}", path.display()),
        }
    }
}

/// Try `primary`; on any error use `fallback`
pub struct FallbackSource<P, F> {
    primary: P,
    fallback: F,
}

impl<P: PlaceSource, F: PlaceSource> FallbackSource<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: PlaceSource, F: PlaceSource> PlaceSource for FallbackSource<P, F> {
    fn fetch(&self) -> Result<Vec<Place>, FetchError> {
        match self.primary.fetch() {
            Ok(places) => Ok(places),
            Err(e) => {
                warn!(
                    primary = %self.primary.describe(),
                    fallback = %self.fallback.describe(),
                    error = %e,
                    "primary place source failed, using fallback"
                );
                self.fallback.fetch()
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} (fallback {})", self.primary.describe(), self.fallback.describe())
    }
}

// ============================================================================
// BACKGROUND FETCH
// ============================================================================

/// Run `source.fetch()` on a worker thread.
///
/// The receiver yields exactly one value: the places, or the error.
pub fn fetch_in_background(
    source: Arc<dyn PlaceSource>,
) -> Receiver<Result<Vec<Place>, FetchError>> {
    let (tx, rx) = channel();

    thread::spawn(move || {
        let result = source.fetch();
        // Receiver may have been dropped; nothing left to report to
        let _ = tx.send(result);
    });

    rx
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Source that always fails, for fallback tests
    struct FailingSource;

    impl PlaceSource for FailingSource {
        fn fetch(&self) -> Result<Vec<Place>, FetchError> {
            Err(FetchError::Parse("unavailable".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    struct FixedSource(Vec<Place>);

    impl PlaceSource for FixedSource {
        fn fetch(&self) -> Result<Vec<Place>, FetchError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn test_parse_array_document() {
        let json = r#"[
            {"id": 1, "name": "City Hospital", "category": "Hospital",
             "latitude": 40.1, "longitude": -73.2, "address": "1 Main St"},
            {"id": 2, "name": "Library", "category": "Library",
             "latitude": 40.2, "longitude": -73.3, "address": "2 Main St"}
        ]"#;

        let places = parse_records(json).unwrap();

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].name, "City Hospital");
        assert_eq!(places[1].longitude, -73.3);
    }

    #[test]
    fn test_parse_wrapped_document() {
        let json = r#"{"places": [
            {"id": 9, "name": "Precinct", "category": "Police",
             "latitude": 1.0, "longitude": 2.0, "address": ""}
        ]}"#;

        let places = parse_records(json).unwrap();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].id, 9);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let json = r#"[
            {"id": 1, "name": "Ok", "category": "Hospital",
             "latitude": 1.0, "longitude": 2.0, "address": "a"},
            {"id": "two", "name": "Bad id", "category": "Hospital",
             "latitude": 1.0, "longitude": 2.0, "address": "b"},
            {"id": 3, "name": "No coords", "category": "Police", "address": "c"},
            {"id": 4, "name": "Lat as text", "category": "Library",
             "latitude": "north", "longitude": 2.0, "address": "d"},
            {"id": 5, "name": "Also ok", "category": "Museum",
             "latitude": -1.0, "longitude": -2.0, "address": "e"}
        ]"#;

        let ids: Vec<i64> = parse_records(json).unwrap().iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(matches!(parse_records("not json"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_records(r#"{"id": 1}"#), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_embedded_dataset_parses() {
        let places = BundledSource::embedded().fetch().unwrap();

        assert!(!places.is_empty());
        assert!(places.iter().any(|p| p.category == "Hospital"));
        assert!(places.iter().any(|p| p.category == "Police"));
        assert!(places.iter().any(|p| p.category == "Library"));
    }

    #[test]
    fn test_csv_records() {
        let csv = "id,name,category,latitude,longitude,address\n\
                   1,Mercy Hospital,Hospital,41.5,-87.6,12 Oak Ave\n\
                   x,Broken,Police,41.5,-87.6,nowhere\n\
                   3,North Branch,Library,41.6,-87.7,\"3 Elm St, Suite 2\"\n";

        let places = parse_csv_records(csv.as_bytes()).unwrap();

        assert_eq!(places.len(), 2);
        assert_eq!(places[1].address, "3 Elm St, Suite 2");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = BundledSource::from_path("/definitely/not/here.json");
        assert!(matches!(source.fetch(), Err(FetchError::Io(_))));
    }

    /// Serve one canned HTTP response on a loopback port
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        format!("http://{}/places.json", addr)
    }

    #[test]
    fn test_remote_source_parses_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK",
            r#"[{"id": 1, "name": "Remote", "category": "Police", "latitude": 1.0, "longitude": 1.0, "address": ""}]"#,
        );

        let source = RemoteSource::new(&url).with_timeout(Duration::from_secs(5));
        assert_eq!(source.url(), url);
        assert_eq!(source.describe(), format!("remote:{}", url));

        let places = source.fetch().unwrap();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Remote");
    }

    #[test]
    fn test_remote_source_reports_status() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "");

        match RemoteSource::new(&url).fetch() {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_used_on_primary_error() {
        let fallback = FixedSource(vec![Place::new(1, "A", "Hospital", 0.0, 0.0, "")]);
        let source = FallbackSource::new(FailingSource, fallback);

        let places = source.fetch().unwrap();

        assert_eq!(places.len(), 1);
        assert!(source.describe().contains("fallback fixed"));
    }

    #[test]
    fn test_primary_preferred_when_it_succeeds() {
        let primary = FixedSource(vec![Place::new(7, "P", "Police", 0.0, 0.0, "")]);
        let source = FallbackSource::new(primary, FailingSource);

        assert_eq!(source.fetch().unwrap()[0].id, 7);
    }

    #[test]
    fn test_both_sources_failing_reports_fallback_error() {
        let source = FallbackSource::new(FailingSource, FailingSource);
        assert!(source.fetch().is_err());
    }

    #[test]
    fn test_fetch_in_background_delivers_one_result() {
        let rx = fetch_in_background(Arc::new(BundledSource::embedded()));

        let result = rx.recv().unwrap();
        assert!(result.is_ok());
        assert!(rx.recv().is_err(), "worker should send exactly once");

        let rx = fetch_in_background(Arc::new(FailingSource));
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Invalid place document: unavailable");
    }
}
