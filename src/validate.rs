//! Reachability checks for a sample of manifest entries.

use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GeoError;
use crate::plan::{CommandEntry, CommandManifest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    #[default]
    Head,
    Get,
}

/// Answers "what HTTP status does this URL give right now".
pub trait UrlProbe: Send + Sync {
    fn status(&self, url: &str, method: ProbeMethod) -> Result<u16, GeoError>;
}

#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, GeoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|err| GeoError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .redirect(Policy::limited(10))
            .build()
            .map_err(|err| GeoError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, GeoError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(GeoError::Http(err.to_string()));
                }
            }
        }
    }
}

impl UrlProbe for HttpProbe {
    fn status(&self, url: &str, method: ProbeMethod) -> Result<u16, GeoError> {
        // GET responses are dropped unread; only the status line matters.
        let response = self.send_with_retries(|| match method {
            ProbeMethod::Head => self.client.head(url),
            ProbeMethod::Get => self.client.get(url),
        })?;
        Ok(response.status().as_u16())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub url: String,
    pub destination: String,
    pub http_status: Option<u16>,
    pub ok: bool,
}

impl ValidationResult {
    fn new(entry: &CommandEntry, http_status: Option<u16>) -> Self {
        Self {
            url: entry.url.clone(),
            destination: entry.destination.to_string(),
            http_status,
            ok: http_status == Some(200),
        }
    }
}

pub struct Validator<'a> {
    probe: &'a dyn UrlProbe,
}

impl<'a> Validator<'a> {
    pub fn new(probe: &'a dyn UrlProbe) -> Self {
        Self { probe }
    }

    /// Probes a uniform sample of `min(sample_size, |manifest|)` distinct
    /// entries; results come back in manifest order.
    pub fn validate<R: Rng + ?Sized>(
        &self,
        manifest: &CommandManifest,
        sample_size: usize,
        method: ProbeMethod,
        rng: &mut R,
    ) -> Vec<ValidationResult> {
        self.validate_with_progress(manifest, sample_size, method, rng, &|_| {})
    }

    /// Like `validate`, calling `on_result` after each probe.
    pub fn validate_with_progress<R: Rng + ?Sized>(
        &self,
        manifest: &CommandManifest,
        sample_size: usize,
        method: ProbeMethod,
        rng: &mut R,
        on_result: &dyn Fn(&ValidationResult),
    ) -> Vec<ValidationResult> {
        let indices = sample_indices(manifest.len(), sample_size, rng);
        info!(
            manifest = %manifest.name,
            sampled = indices.len(),
            of = manifest.len(),
            "validating urls"
        );
        indices
            .into_iter()
            .map(|index| {
                let entry = &manifest.entries[index];
                let status = match self.probe.status(&entry.url, method) {
                    Ok(status) => Some(status),
                    Err(err) => {
                        warn!(url = %entry.url, error = %err, "probe failed");
                        None
                    }
                };
                let result = ValidationResult::new(entry, status);
                debug!(url = %result.url, status = ?result.http_status, ok = result.ok, "probed");
                on_result(&result);
                result
            })
            .collect()
    }
}

/// Sorted distinct indices into a collection of `len` items.
pub fn sample_indices<R: Rng + ?Sized>(len: usize, sample_size: usize, rng: &mut R) -> Vec<usize> {
    let amount = sample_size.min(len);
    let mut indices = rand::seq::index::sample(rng, len, amount).into_vec();
    indices.sort_unstable();
    indices
}

/// True when something was probed and every probe succeeded.
pub fn all_ok(results: &[ValidationResult]) -> bool {
    !results.is_empty() && results.iter().all(|result| result.ok)
}
