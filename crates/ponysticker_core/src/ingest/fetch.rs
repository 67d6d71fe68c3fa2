//! Bundle download with bounded retry.
//!
//! # Responsibility
//! - Retrieve one package bundle from the remote sticker store.
//! - Retry transport failures with a fixed delay.
//!
//! # Invariants
//! - An HTTP status >= 400 means the package does not exist; it is returned
//!   as [`FetchOutcome::Missing`] and never retried.
//! - At most `max_attempts` requests are issued per fetch.

use crate::model::package::PackageId;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::thread;
use std::time::Duration;

/// Remote bundle location; `{id}` is replaced by the package id.
pub const BUNDLE_URL_TEMPLATE: &str =
    "http://dl.stickershop.line.naver.jp/products/0/0/1/{id}/android/stickers.zip";
/// Total requests per fetch, including the first one.
pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failure (connection, DNS, TLS...).
pub type TransportError = Box<dyn Error + Send + Sync>;

/// Raw response of one transport request.
pub struct TransportResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

/// Blocking GET transport.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` blocking transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let response = self.client.get(url).send()?;
        Ok(TransportResponse {
            status: response.status().as_u16(),
            body: Box::new(response),
        })
    }
}

/// Result of fetching one package.
pub enum FetchOutcome {
    /// Bundle body, ready to be unpacked.
    Found(Box<dyn Read + Send>),
    /// The store answered with an error status.
    Missing { status: u16 },
}

impl std::fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(_) => f.write_str("Found(..)"),
            Self::Missing { status } => f.debug_struct("Missing").field("status", status).finish(),
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug)]
pub enum FetchError {
    RetriesExhausted {
        id: PackageId,
        attempts: u32,
        last: TransportError,
    },
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted { id, attempts, last } => {
                write!(f, "fetching package {id} failed after {attempts} attempts: {last}")
            }
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last.as_ref()),
        }
    }
}

/// Source of package bundles for the ingestion coordinator.
pub trait BundleSource: Send + Sync {
    fn fetch(&self, id: PackageId) -> FetchResult<FetchOutcome>;
}

impl<S: BundleSource + ?Sized> BundleSource for &S {
    fn fetch(&self, id: PackageId) -> FetchResult<FetchOutcome> {
        (**self).fetch(id)
    }
}

/// Retrying bundle fetcher over a [`Transport`].
#[derive(Debug, Clone)]
pub struct Fetcher<T> {
    transport: T,
    url_template: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            url_template: BUNDLE_URL_TEMPLATE.to_string(),
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn bundle_url(&self, id: PackageId) -> String {
        self.url_template.replace("{id}", &id.to_string())
    }
}

impl<T: Transport> BundleSource for Fetcher<T> {
    fn fetch(&self, id: PackageId) -> FetchResult<FetchOutcome> {
        let url = self.bundle_url(id);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.get(&url) {
                Ok(response) if response.status >= 400 => {
                    return Ok(FetchOutcome::Missing {
                        status: response.status,
                    });
                }
                Ok(response) => return Ok(FetchOutcome::Found(response.body)),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        id,
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    warn!(
                        "event=fetch_retry module=ingest status=error package_id={id} attempt={attempt} error={err}"
                    );
                    thread::sleep(self.retry_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BundleSource, FetchError, FetchOutcome, Fetcher, Transport, TransportError,
        TransportResponse,
    };
    use std::io::{Cursor, Read};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted results; `None` is a transport failure.
    struct ScriptedTransport {
        script: Mutex<Vec<Option<u16>>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(mut script: Vec<Option<u16>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                urls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.urls.lock().unwrap().len()
        }
    }

    impl Transport for &ScriptedTransport {
        fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
            self.urls.lock().unwrap().push(url.to_string());
            match self.script.lock().unwrap().pop().flatten() {
                Some(status) => Ok(TransportResponse {
                    status,
                    body: Box::new(Cursor::new(b"zip".to_vec())),
                }),
                None => Err("connection refused".into()),
            }
        }
    }

    fn fetcher(transport: &ScriptedTransport) -> Fetcher<&ScriptedTransport> {
        Fetcher::new(transport)
            .with_url_template("http://store.test/{id}/stickers.zip")
            .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn success_returns_body() {
        let transport = ScriptedTransport::new(vec![Some(200)]);
        let outcome = fetcher(&transport).fetch(42).unwrap();
        let FetchOutcome::Found(mut body) = outcome else {
            panic!("expected a bundle");
        };
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"zip");
        assert_eq!(
            transport.urls.lock().unwrap().as_slice(),
            ["http://store.test/42/stickers.zip"]
        );
    }

    #[test]
    fn error_status_is_missing_and_not_retried() {
        let transport = ScriptedTransport::new(vec![Some(404), Some(200)]);
        let outcome = fetcher(&transport).fetch(1).unwrap();
        assert!(matches!(outcome, FetchOutcome::Missing { status: 404 }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn transient_failures_are_retried() {
        let transport = ScriptedTransport::new(vec![None, None, Some(200)]);
        let outcome = fetcher(&transport).fetch(1).unwrap();
        assert!(matches!(outcome, FetchOutcome::Found(_)));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn five_failures_exhaust_retries_before_a_sixth_success() {
        let transport = ScriptedTransport::new(vec![None, None, None, None, None, Some(200)]);
        let err = fetcher(&transport).fetch(9).unwrap_err();
        let FetchError::RetriesExhausted { id, attempts, .. } = err;
        assert_eq!((id, attempts), (9, 5));
        assert_eq!(transport.calls(), 5);
    }
}
