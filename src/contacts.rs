use crate::error::ContactError;
use crate::http_client::{create_http_client_with_cookies, load_cookies_from_file};
use crate::models::{ContactInfo, Record};
use crate::pacing::Pacing;
use crate::tracker::RunTracker;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SITE_BASE: &str = "https://www.olx.com.pk";

// Pause after a rate-limit response before moving on.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(5);

/// An authenticated contact-lookup session. Establishing credentials is a
/// collaborator concern; this seam only issues lookups and can attempt one
/// renewal when the session expires mid-batch.
#[async_trait]
pub trait ContactSession: Send + Sync {
    async fn lookup(&self, ad_id: &str) -> Result<ContactInfo, ContactError>;

    /// Try to re-establish the session after an auth failure.
    async fn renew(&self) -> Result<(), ContactError>;
}

/// Session backed by browser-exported cookies. Renewal re-reads the cookie
/// file, which the user may have refreshed since the run started.
pub struct OlxContactSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    cookies_file: String,
}

impl OlxContactSession {
    pub fn from_cookie_file(
        user_agent: &str,
        timeout_secs: u64,
        cookies_file: &str,
    ) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client =
            create_http_client_with_cookies(user_agent, timeout_secs, Some(jar.clone()))?;
        let loaded = load_cookies_from_file(&jar, cookies_file, SITE_BASE)?;
        if loaded == 0 {
            anyhow::bail!("cookie file {} contained no cookies", cookies_file);
        }
        Ok(Self {
            client,
            jar,
            cookies_file: cookies_file.to_string(),
        })
    }
}

#[async_trait]
impl ContactSession for OlxContactSession {
    async fn lookup(&self, ad_id: &str) -> Result<ContactInfo, ContactError> {
        let url = format!("{}/api/listing/{}/contactInfo/", SITE_BASE, ad_id);
        let referer = format!("{}/item/iid-{}", SITE_BASE, ad_id);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ContactError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 | 304 => {
                let data: Value = response
                    .json()
                    .await
                    .map_err(|e| ContactError::Transport(e.to_string()))?;
                Ok(parse_contact(&data))
            }
            401 | 403 => Err(ContactError::Unauthenticated),
            404 => Err(ContactError::NotFound(ad_id.to_string())),
            429 => Err(ContactError::RateLimited),
            status => Err(ContactError::Transport(format!("HTTP {}", status))),
        }
    }

    async fn renew(&self) -> Result<(), ContactError> {
        load_cookies_from_file(&self.jar, &self.cookies_file, SITE_BASE)
            .map_err(|e| ContactError::Transport(e.to_string()))?;

        let url = format!("{}/api/user/", SITE_BASE);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContactError::Transport(e.to_string()))?;

        if matches!(response.status().as_u16(), 200 | 304) {
            Ok(())
        } else {
            Err(ContactError::Unauthenticated)
        }
    }
}

/// Shape returned by the contact API: name, mobile, whatsapp, and an
/// optional list of additional numbers.
fn parse_contact(data: &Value) -> ContactInfo {
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let other_phones = data
        .get("mobileNumbers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ContactInfo {
        name: field("name"),
        phone: field("mobile"),
        whatsapp: field("whatsapp"),
        other_phones,
    }
}

/// Merge contact info into each record, in place. Per-record failures are
/// warnings; an expired session gets exactly one renewal attempt, after
/// which the remaining records are left un-enriched.
pub async fn enrich(
    records: &mut [Record],
    session: &dyn ContactSession,
    pacing: &Pacing,
    tracker: &RunTracker,
) -> usize {
    let total = records.len();
    let mut enriched = 0usize;
    let mut warned = 0usize;
    let mut renewal_spent = false;

    for idx in 0..total {
        let ad_id = records[idx].ad_id.clone();
        if ad_id.is_empty() {
            warned += 1;
            tracker
                .warn("contact enrichment skipped for a record with no ad id".to_string())
                .await;
            continue;
        }

        pacing.pause_before(idx).await;

        let mut outcome = session.lookup(&ad_id).await;

        if matches!(outcome, Err(ContactError::Unauthenticated)) && !renewal_spent {
            renewal_spent = true;
            tracker
                .progress("Contact session expired, attempting renewal".to_string())
                .await;
            match session.renew().await {
                Ok(()) => outcome = session.lookup(&ad_id).await,
                Err(e) => {
                    tracing::warn!("Session renewal failed: {}", e);
                }
            }
        }

        match outcome {
            Ok(info) if info.is_empty() => {
                warned += 1;
                tracker
                    .warn(format!("no contact fields published for ad {}", ad_id))
                    .await;
            }
            Ok(info) => {
                records[idx].contact = Some(info);
                enriched += 1;
            }
            Err(ContactError::Unauthenticated) => {
                // Session is gone for good: leave this and the rest alone.
                for rest in records[idx..].iter() {
                    warned += 1;
                    tracker
                        .warn(format!(
                            "contact enrichment skipped for ad {}: session expired",
                            rest.ad_id
                        ))
                        .await;
                }
                break;
            }
            Err(ContactError::RateLimited) => {
                warned += 1;
                tracker
                    .warn(format!("contact lookup rate limited for ad {}", ad_id))
                    .await;
                tokio::time::sleep(RATE_LIMIT_PAUSE).await;
            }
            Err(e) => {
                warned += 1;
                tracker
                    .warn(format!("contact lookup failed for ad {}: {}", ad_id, e))
                    .await;
            }
        }
    }

    tracker
        .progress(format!(
            "Contact enrichment done: {} enriched, {} skipped of {}",
            enriched, warned, total
        ))
        .await;

    warned
}
