//! Feed retrieval.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};

use crate::config::{AuthScheme, FeedAuth, SyncConfig};
use crate::error::FetchError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Anything that can produce the raw feed text.
pub trait FeedSource {
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches a feed over HTTP(S) with retries.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    url: String,
    auth: Option<FeedAuth>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    client: reqwest::Client,
}

impl HttpFeed {
    /// `webcal://` URLs are fetched over `https://`.
    pub fn new(url: &str) -> Result<Self, FetchError> {
        let url = normalize_url(url)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("icsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(HttpFeed {
            url,
            auth: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff: Duration::from_millis(500),
            client,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, FetchError> {
        Ok(HttpFeed::new(&config.source_url)?
            .with_auth(config.auth.clone())
            .with_timeout(Duration::from_secs(config.fetch_timeout_secs))
            .with_retries(config.fetch_retries, Duration::from_millis(config.retry_backoff_ms)))
    }

    pub fn with_auth(mut self, auth: Option<FeedAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `retries` additional attempts, waiting `backoff * 2^attempt` between them.
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_once(&self) -> Result<String, FetchError> {
        let mut request = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .header(ACCEPT, "text/calendar, text/plain;q=0.9, */*;q=0.5");

        request = match &self.auth {
            None => request,
            Some(FeedAuth::Bearer { token }) => request.bearer_auth(token),
            Some(FeedAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(FeedAuth::Env { variable, scheme }) => match std::env::var(variable) {
                Ok(token) => match scheme {
                    AuthScheme::Bearer => request.bearer_auth(token),
                    AuthScheme::Raw => request.header(AUTHORIZATION, token),
                },
                Err(_) => {
                    tracing::warn!(variable = %variable, "Auth token variable is not set, fetching without credentials");
                    request
                }
            },
        };

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        decode_body(&body)
    }

    fn transport_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

impl FeedSource for HttpFeed {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<String, FetchError> {
        let mut attempt = 0;

        loop {
            match self.fetch_once().await {
                Ok(body) => {
                    tracing::debug!(bytes = body.len(), attempt, "Fetched feed");
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = backoff_delay(self.backoff, attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Feed fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A feed held in memory. Cloning shares the body, so a test can change
/// what the next run sees.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    body: Arc<Mutex<Option<String>>>,
}

impl StaticFeed {
    pub fn new(body: impl Into<String>) -> Self {
        StaticFeed {
            body: Arc::new(Mutex::new(Some(body.into()))),
        }
    }

    pub fn set(&self, body: impl Into<String>) {
        *self.body.lock().unwrap_or_else(PoisonError::into_inner) = Some(body.into());
    }

    /// Make the next fetches fail with `NotFound`.
    pub fn remove(&self) {
        *self.body.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<String, FetchError> {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(FetchError::NotFound)
    }
}

fn normalize_url(url: &str) -> Result<String, FetchError> {
    let url = url.trim();
    let url = match url.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("webcal://") => format!("https://{}", &url[9..]),
        _ => url.to_string(),
    };

    let parsed = Url::parse(&url).map_err(|_| FetchError::InvalidUrl(url.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(url));
    }

    Ok(url)
}

fn status_error(status: StatusCode) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::AuthRequired(status.as_u16()),
        StatusCode::NOT_FOUND => FetchError::NotFound,
        other => FetchError::BadStatus(other.as_u16()),
    }
}

/// `base * 2^attempt`, capped at 30 seconds.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// UTF-8 (BOM stripped), falling back to ISO-8859-1 for anything else.
///
/// A UTF-16 body is rejected outright; decoding it as Latin-1 would produce
/// text that looks valid but contains no calendar.
pub fn decode_body(bytes: &[u8]) -> Result<String, FetchError> {
    if bytes.starts_with(b"\xFF\xFE") || bytes.starts_with(b"\xFE\xFF") {
        return Err(FetchError::Decode("UTF-16 feeds are not supported".into()));
    }

    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            tracing::debug!("Feed is not valid UTF-8, decoding as ISO-8859-1");
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n";

    fn feed(url: &str) -> HttpFeed {
        HttpFeed::new(url)
            .unwrap()
            .with_retries(2, Duration::from_millis(1))
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn rewrites_webcal() {
        let feed = HttpFeed::new("webcal://example.com/cal.ics").unwrap();
        assert_eq!(feed.url(), "https://example.com/cal.ics");
        assert!(matches!(HttpFeed::new("ftp://example.com/x"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(HttpFeed::new("not a url"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 10), Duration::from_secs(30));
        assert_eq!(backoff_delay(base, 40), Duration::from_secs(30));
    }

    #[test]
    fn decodes_bodies() {
        assert_eq!(decode_body(b"\xEF\xBB\xBFBEGIN").unwrap(), "BEGIN");
        assert_eq!(decode_body(b"Caf\xE9").unwrap(), "Café");
        assert!(matches!(decode_body(b"\xFF\xFEB\x00"), Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn fetches_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cal.ics")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "text/calendar")
            .with_body(FEED)
            .create_async()
            .await;

        let feed = feed(&format!("{}/cal.ics", server.url())).with_auth(Some(FeedAuth::Bearer {
            token: "secret".to_string(),
        }));

        assert_eq!(feed.fetch().await.unwrap(), FEED);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/cal.ics")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/cal.ics")
            .with_status(200)
            .with_body(FEED)
            .expect(1)
            .create_async()
            .await;

        let body = feed(&format!("{}/cal.ics", server.url())).fetch().await.unwrap();
        assert_eq!(body, FEED);
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cal.ics")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let result = feed(&format!("{}/cal.ics", server.url())).fetch().await;
        assert!(matches!(result, Err(FetchError::BadStatus(500))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cal.ics")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let result = feed(&format!("{}/cal.ics", server.url())).fetch().await;
        assert!(matches!(result, Err(FetchError::AuthRequired(401))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_feed_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone.ics")
            .with_status(404)
            .create_async()
            .await;

        let result = feed(&format!("{}/gone.ics", server.url())).fetch().await;
        assert!(matches!(result, Err(FetchError::NotFound)));
    }

    #[tokio::test]
    async fn latin1_body_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/cal.ics")
            .with_status(200)
            .with_body(b"SUMMARY:R\xE9union".as_slice())
            .create_async()
            .await;

        let body = feed(&format!("{}/cal.ics", server.url())).fetch().await.unwrap();
        assert_eq!(body, "SUMMARY:Réunion");
    }

    #[tokio::test]
    async fn static_feed_can_change() {
        let feed = StaticFeed::new("one");
        let shared = feed.clone();
        assert_eq!(feed.fetch().await.unwrap(), "one");
        shared.set("two");
        assert_eq!(feed.fetch().await.unwrap(), "two");
        shared.remove();
        assert!(matches!(feed.fetch().await, Err(FetchError::NotFound)));
    }
}
