//! Page retrieval.
//!
//! [`Fetch`] is the only place the pipeline suspends. It never retries on its
//! own; wrap it in [`crate::retry::RetryFetch`] for that. Adapters talk to a
//! [`Session`], which stamps the per-request timeout on every call.

use crate::error::FetchError;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

/// One page request: a GET, or a POST of form fields when `form` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub form: Option<Vec<(String, String)>>,
    pub timeout: Duration,
}

/// Retrieve raw page text.
pub trait Fetch {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError>;
}

/// Race pages, result downloads and plain text are all fine; images, PDFs
/// and the like are not.
fn acceptable_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") || ct.contains("csv")
}

/// UTF-8 when valid, otherwise ISO-8859-1 (every byte is a code point).
pub fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// [`Fetch`] over HTTP with a cookie store, which NYRR's search forms need.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %request.url, post = request.form.is_some()))]
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let builder = match &request.form {
            Some(form) => self.client.post(request.url.clone()).form(form),
            None => self.client.get(request.url.clone()),
        };
        let response = builder.timeout(request.timeout).send().await?;

        let status = response.status();
        let url = request.url.to_string();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound(url));
        }
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Unexpected HTTP status");
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !acceptable_content_type(ct) {
                return Err(FetchError::Malformed {
                    url,
                    content_type: ct.to_string(),
                });
            }
        }

        let bytes = response.bytes().await?;
        debug!(
            bytes = bytes.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(decode_body(&bytes))
    }
}

/// [`Fetch`] over saved pages on disk, addressed by `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPages;

impl Fetch for LocalPages {
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let url = request.url.to_string();
        if request.form.is_some() {
            return Err(FetchError::Transport(format!("cannot post a form to {url}")));
        }
        let path = request
            .url
            .to_file_path()
            .map_err(|_| FetchError::Transport(format!("not a local file: {url}")))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Read saved page");
                Ok(decode_body(&bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound(url)),
            Err(e) => Err(FetchError::Transport(format!("{url}: {e}"))),
        }
    }
}

/// A fetcher plus the timeout every request of a run uses.
#[derive(Debug)]
pub struct Session<'a, F> {
    fetcher: &'a F,
    timeout: Duration,
}

impl<'a, F: Fetch> Session<'a, F> {
    pub fn new(fetcher: &'a F, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub async fn get(&self, url: &Url) -> Result<String, FetchError> {
        self.fetcher
            .fetch(&FetchRequest {
                url: url.clone(),
                form: None,
                timeout: self.timeout,
            })
            .await
    }

    pub async fn post_form(
        &self,
        url: &Url,
        form: Vec<(String, String)>,
    ) -> Result<String, FetchError> {
        self.fetcher
            .fetch(&FetchRequest {
                url: url.clone(),
                form: Some(form),
                timeout: self.timeout,
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher for adapter and pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, Result<String, FetchError>>,
        pub requests: Mutex<Vec<FetchRequest>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub fn failing(mut self, url: &str, err: FetchError) -> Self {
            self.pages.insert(url.to_string(), Err(err));
            self
        }

        pub fn posted_forms(&self) -> Vec<Vec<(String, String)>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| r.form.clone())
                .collect()
        }
    }

    impl Fetch for FakeFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            self.pages
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(FetchError::NotFound(request.url.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn get(server: &MockServer, p: &str) -> Result<String, FetchError> {
        let fetcher = HttpFetcher::new("race_results-test").unwrap();
        let session = Session::new(&fetcher, Duration::from_secs(5));
        let url = Url::parse(&format!("{}{}", server.uri(), p)).unwrap();
        session.get(&url).await
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/results/13/ma.shtml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .set_body_string("<html>ok</html>"),
            )
            .mount(&server)
            .await;

        assert_eq!(get(&server, "/results/13/ma.shtml").await.unwrap(), "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = get(&server, "/missing.htm").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = get(&server, "/busy.htm").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_rejects_binary_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
            )
            .mount(&server)
            .await;

        let err = get(&server, "/logo.png").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("race_results-test").unwrap();
        let session = Session::new(&fetcher, Duration::from_millis(100));
        let url = Url::parse(&format!("{}/slow.htm", server.uri())).unwrap();
        let err = session.get(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_post_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_string_contains("team_code=RARI"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("found"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("race_results-test").unwrap();
        let session = Session::new(&fetcher, Duration::from_secs(5));
        let url = Url::parse(&format!("{}/search", server.uri())).unwrap();
        let body = session
            .post_form(&url, vec![("team_code".into(), "RARI".into())])
            .await
            .unwrap();
        assert_eq!(body, "found");
    }

    #[tokio::test]
    async fn test_local_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let saved = tmp.path().join("race.htm");
        std::fs::write(&saved, [b'Z', b'o', 0xeb]).unwrap();
        let session = Session::new(&LocalPages, Duration::from_secs(1));

        let url = Url::from_file_path(&saved).unwrap();
        assert_eq!(session.get(&url).await.unwrap(), "Zoë");

        let gone = Url::from_file_path(tmp.path().join("gone.htm")).unwrap();
        assert!(matches!(session.get(&gone).await, Err(FetchError::NotFound(_))));

        assert!(matches!(
            session.post_form(&url, Vec::new()).await,
            Err(FetchError::Transport(_))
        ));
    }

    #[test]
    fn test_decode_body_latin1_fallback() {
        assert_eq!(decode_body("Zoë".as_bytes()), "Zoë");
        assert_eq!(decode_body(&[b'Z', b'o', 0xeb]), "Zoë");
    }

    #[test]
    fn test_acceptable_content_types() {
        assert!(acceptable_content_type("text/html; charset=ISO-8859-1"));
        assert!(acceptable_content_type("text/csv"));
        assert!(acceptable_content_type("application/xhtml+xml"));
        assert!(!acceptable_content_type("application/pdf"));
    }
}
