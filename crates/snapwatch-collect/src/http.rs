use std::error::Error as _;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use snapwatch_core::CollectionError;

/// Blocking HTTP client shared by all collectors of one run.
///
/// Every request is bounded by the client timeout; expiry surfaces as
/// [`CollectionError::Unreachable`] like any other transport failure.
/// Errors never carry the request URL: query strings may hold API keys.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

/// Error text with its causes, minus the request URL.
fn reason(e: reqwest::Error) -> String {
    let e = e.without_url();
    let mut out = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// GET `url` and return the body; any non-2xx status is an error.
    pub fn get_text(&self, url: &str) -> Result<String, CollectionError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| CollectionError::unreachable(url, reason(e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollectionError::Status { url: url.to_string(), status: status.as_u16() });
        }
        resp.text().map_err(|e| CollectionError::partial(url, reason(e)))
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, CollectionError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| CollectionError::unreachable(url, reason(e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollectionError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let body = resp.text().map_err(|e| CollectionError::partial(url, reason(e)))?;
        serde_json::from_str(&body).map_err(|e| CollectionError::malformed(url, e))
    }

    /// Status check for link checking. Transport failures come back as text
    /// because a dead link is an observation, not a failed collection.
    pub fn status_of(&self, url: &str) -> Result<u16, String> {
        self.client
            .get(url)
            .send()
            .map(|resp| resp.status().as_u16())
            .map_err(|e| {
                if e.is_timeout() {
                    "timed out".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    reason(e)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // nothing listens on the discard port
    const CLOSED: &str = "http://127.0.0.1:9/runPagespeed";

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(2), "snapwatch-test").unwrap()
    }

    #[test]
    fn transport_errors_omit_query_strings() {
        let err = fetcher()
            .get_json::<serde_json::Value>(CLOSED, &[("url", "https://x"), ("key", "SUPERSECRETKEY")])
            .unwrap_err();
        assert!(matches!(err, CollectionError::Unreachable { .. }));
        let text = err.to_string();
        assert!(text.starts_with(CLOSED));
        assert!(!text.contains("SUPERSECRETKEY"), "{}", text);
    }

    #[test]
    fn status_check_reports_failure_as_text() {
        let text = fetcher().status_of("http://127.0.0.1:9/?token=SUPERSECRETKEY").unwrap_err();
        assert!(!text.contains("SUPERSECRETKEY"), "{}", text);
    }
}
