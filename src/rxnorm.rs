use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::cache::NdcCache;
use crate::common::truncate_for_log;
use crate::error::LookupError;
use crate::normalize::strip_ndc;

/// Bounded retry settings for remote RxCUI lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after a failed attempt, before the next one.
    pub delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// One remote NDC -> RxCUI lookup attempt.
pub trait RxcuiLookup {
    fn lookup(&self, ndc: &str, timeout: Duration) -> Result<Option<String>, LookupError>;
}

impl<T: RxcuiLookup + ?Sized> RxcuiLookup for &T {
    fn lookup(&self, ndc: &str, timeout: Duration) -> Result<Option<String>, LookupError> {
        (**self).lookup(ndc, timeout)
    }
}

#[derive(Debug, Deserialize)]
struct RxcuiResponse {
    #[serde(rename = "idGroup")]
    id_group: Option<IdGroup>,
}

#[derive(Debug, Deserialize)]
struct IdGroup {
    #[serde(rename = "rxnormId")]
    rxnorm_id: Option<RxnormIds>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RxnormIds {
    One(String),
    Many(Vec<String>),
}

impl RxcuiResponse {
    fn first_rxcui(self) -> Option<String> {
        let ids = self.id_group?.rxnorm_id?;
        let first = match ids {
            RxnormIds::One(id) => Some(id),
            RxnormIds::Many(ids) => ids.into_iter().next(),
        };
        first
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

fn parse_rxcui_body(body: &str) -> Result<Option<String>, LookupError> {
    let parsed: RxcuiResponse = serde_json::from_str(body)?;
    Ok(parsed.first_rxcui())
}

/// RxNav `rxcui.json?idtype=NDC` client.
pub struct RxNavClient {
    client: Client,
    base_url: String,
}

impl RxNavClient {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("formulary-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl RxcuiLookup for RxNavClient {
    fn lookup(&self, ndc: &str, timeout: Duration) -> Result<Option<String>, LookupError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("idtype", "NDC"), ("id", ndc)])
            .timeout(timeout)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LookupError::Status {
                status,
                body: truncate_for_log(&body),
            });
        }
        parse_rxcui_body(&resp.text()?)
    }
}

/// Resolves NDCs through the persistent cache, falling back to `L`.
pub struct NdcResolver<'c, L> {
    cache: &'c mut NdcCache,
    lookup: L,
    policy: RetryPolicy,
    remote_calls: usize,
}

impl<'c, L: RxcuiLookup> NdcResolver<'c, L> {
    pub fn new(cache: &'c mut NdcCache, lookup: L, policy: RetryPolicy) -> Self {
        Self {
            cache,
            lookup,
            policy,
            remote_calls: 0,
        }
    }

    pub fn cache(&self) -> &NdcCache {
        &*self.cache
    }

    /// Remote attempts issued by this resolver, retries included.
    pub fn remote_calls(&self) -> usize {
        self.remote_calls
    }

    pub fn resolve(&mut self, raw_ndc: &str) -> Option<String> {
        let ndc = strip_ndc(raw_ndc);
        if ndc.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(&ndc) {
            return cached.map(str::to_string);
        }

        let rxcui = self.fetch(&ndc);
        self.cache.put(ndc.clone(), rxcui.clone());
        if let Err(err) = self.cache.flush() {
            tracing::warn!(
                path = %self.cache.path().display(),
                error = %err,
                "Failed persisting NDC cache"
            );
        }
        rxcui
    }

    // Exhausted retries are reported as "no mapping" and cached like one.
    fn fetch(&mut self, ndc: &str) -> Option<String> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            self.remote_calls += 1;
            match self.lookup.lookup(ndc, self.policy.timeout) {
                Ok(rxcui) => return rxcui,
                Err(err) if attempt == attempts => {
                    tracing::warn!(
                        ndc,
                        attempts,
                        error = %err,
                        "RxCUI lookup failed; caching as not found"
                    );
                }
                Err(err) => {
                    tracing::debug!(ndc, attempt, error = %err, "RxCUI lookup failed; retrying");
                    if !self.policy.delay.is_zero() {
                        std::thread::sleep(self.policy.delay);
                    }
                }
            }
        }
        None
    }
}
