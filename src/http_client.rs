use crate::error::PageLoadError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{cookie::Jar, header, Client};
use std::sync::Arc;
use std::time::Duration;

/// Creates an HTTP client that presents like a regular desktop browser.
pub fn create_http_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    create_http_client_with_cookies(user_agent, timeout_secs, None)
}

/// Creates an HTTP client with an optional shared cookie jar.
pub fn create_http_client_with_cookies(
    user_agent: &str,
    timeout_secs: u64,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en,en-US;q=0.9,ur;q=0.8"),
    );
    headers.insert(header::DNT, header::HeaderValue::from_static("1"));
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        "Upgrade-Insecure-Requests",
        header::HeaderValue::from_static("1"),
    );
    headers.insert("Sec-Fetch-Dest", header::HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", header::HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", header::HeaderValue::from_static("none"));

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs));

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    } else {
        builder = builder.cookie_store(true);
    }

    Ok(builder.build()?)
}

/// Load cookies from a browser-exported JSON file into a jar.
/// Expected format: array of objects with "name" and "value" fields, as
/// produced by extensions like "Cookie Editor".
pub fn load_cookies_from_file(jar: &Jar, path: &str, site: &str) -> Result<usize> {
    let cookie_data = std::fs::read_to_string(path)?;
    let cookies: Vec<serde_json::Value> = serde_json::from_str(&cookie_data)?;
    let site_url = site.parse::<reqwest::Url>()?;

    let mut loaded = 0;
    for cookie in &cookies {
        if let (Some(name), Some(value)) = (cookie.get("name"), cookie.get("value")) {
            let name = name.as_str().unwrap_or("");
            let value = value.as_str().unwrap_or("");
            if name.is_empty() {
                continue;
            }
            jar.add_cookie_str(&format!("{}={}", name, value), &site_url);
            loaded += 1;
        }
    }

    tracing::info!("Loaded {} cookies from {}", loaded, path);
    Ok(loaded)
}

/// Seam over page loads. Production uses one `HttpFetcher` per pipeline
/// phase; tests substitute canned-HTML fetchers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load one page and return its body. A non-success status is a
    /// `PageLoadError`, not a body.
    async fn fetch(&self, url: &str) -> Result<String, PageLoadError>;
}

/// Fetcher backed by a dedicated `reqwest::Client`. Each pipeline phase
/// creates its own instance at entry and drops it at exit, so no HTTP
/// session is ever shared across phases.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: create_http_client(user_agent, timeout_secs)?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, PageLoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PageLoadError::new(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageLoadError::new(url, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| PageLoadError::new(url, e.to_string()))
    }
}

/// Fetch with a bounded number of attempts and a linearly growing backoff.
/// Exhausted retries surface the last error; the caller decides whether
/// that means "empty page" or "degraded record".
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    retries: u32,
) -> Result<String, PageLoadError> {
    let attempts = retries.max(1);
    let mut last: Option<PageLoadError> = None;

    for attempt in 1..=attempts {
        match fetcher.fetch(url).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                tracing::warn!(
                    "Page load failed (attempt {}/{}) for {}: {}",
                    attempt,
                    attempts,
                    url,
                    e.reason
                );
                last = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(1500 * u64::from(attempt))).await;
                }
            }
        }
    }

    Err(last.unwrap_or_else(|| PageLoadError::new(url, "no attempts made")))
}
