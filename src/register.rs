//! National address register client.
//!
//! The register is a Solr-backed search service: every known field becomes an
//! exact-match filter (`fq`), while the house number suffix goes into the
//! free-text query (`q`) so that near-matches with a different suffix still
//! surface. The service is known to drop connections, so transport failures
//! are retried under a [`RetryPolicy`]; a rejected request is not.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::profiling::{RequestProfiler, Service};

/// Default register search endpoint.
pub const DEFAULT_REGISTER_ENDPOINT: &str =
    "https://api.pdok.nl/bzk/locatieserver/search/v3_1/free";

/// Fields requested from the register.
const RESULT_FIELDS: &str = "woonplaatsnaam,postcode,straatnaam,huis_nlt";

/// A transport-level failure talking to an external service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    /// Error message
    pub message: String,
    /// Whether sending the same request again may succeed
    pub retryable: bool,
}

impl RequestError {
    /// A failure that a retry may fix (timeouts, dropped connections).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will repeat on every attempt (rejected or malformed requests).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = !err.is_decode()
            && !err.is_status()
            && !err.is_builder()
            && (err.is_timeout() || err.is_connect() || err.is_request() || err.is_body());
        Self {
            message: err.to_string(),
            retryable,
        }
    }
}

/// How often and how patiently a flaky request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or the attempt
    /// budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, service: Service, mut attempt: F) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tries = 1;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.retryable && tries < max_attempts => {
                    warn!(
                        %service,
                        attempt = tries,
                        max_attempts,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    tries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Filters for one register search. Absent fields are not filtered on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterQuery {
    /// Street name
    pub street: Option<String>,
    /// Numeric house number
    pub house_number: Option<String>,
    /// Postal code in compact form
    pub postal_code: Option<String>,
    /// City
    pub city: Option<String>,
    /// House number suffix, sent as free text rather than as a filter
    pub house_number_suffix: Option<String>,
}

impl RegisterQuery {
    /// The same query without the house number suffix search term.
    pub fn without_suffix(&self) -> Self {
        Self {
            house_number_suffix: None,
            ..self.clone()
        }
    }

    /// Whether the house number suffix search term is part of this query.
    pub fn has_suffix(&self) -> bool {
        self.house_number_suffix.is_some()
    }

    /// Query string pairs as sent to the register.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("fl", RESULT_FIELDS.to_string())];
        if let Some(street) = &self.street {
            params.push(("fq", format!("straatnaam:{}", quoted(street))));
        }
        if let Some(house_number) = &self.house_number {
            params.push(("fq", format!("huisnummer:{house_number}")));
        }
        if let Some(postal_code) = &self.postal_code {
            params.push(("fq", format!("postcode:{}", quoted(postal_code))));
        }
        if let Some(city) = &self.city {
            params.push(("fq", format!("woonplaatsnaam:{}", quoted(city))));
        }
        if let Some(suffix) = &self.house_number_suffix {
            params.push(("q", suffix.clone()));
        }
        params
    }
}

/// Phrase-quote a filter value so multi-word names match as a whole.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One address known to the register.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RegisterCandidate {
    /// Street name
    #[serde(rename = "straatnaam", default)]
    pub street: String,
    /// House number with its suffix, e.g. "12A" or "12-3"
    #[serde(rename = "huis_nlt", default)]
    pub house_number_with_suffix: String,
    /// Postal code
    #[serde(rename = "postcode", default)]
    pub postal_code: String,
    /// City
    #[serde(rename = "woonplaatsnaam", default)]
    pub city: String,
}

/// Answer to a register search.
///
/// `match_count` is authoritative: the register may report far more matches
/// than it returns in `candidates`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterQueryResult {
    /// Total number of matching addresses
    pub match_count: u64,
    /// Returned candidates, at most `match_count` of them
    pub candidates: Vec<RegisterCandidate>,
}

impl RegisterQueryResult {
    /// Whether every match is present in `candidates`.
    pub fn is_complete(&self) -> bool {
        self.candidates.len() as u64 >= self.match_count
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<RegisterCandidate>,
}

impl From<SearchResponse> for RegisterQueryResult {
    fn from(response: SearchResponse) -> Self {
        Self {
            match_count: response.response.num_found,
            candidates: response.response.docs,
        }
    }
}

/// Authoritative source of valid street/number/postal code/city combinations.
#[async_trait::async_trait]
pub trait AddressRegister: Send + Sync {
    /// Search the register. `None` means the search could not be answered,
    /// which callers treat like a failed strategy.
    async fn query(&self, query: &RegisterQuery) -> Option<RegisterQueryResult>;
}

/// HTTP client for the national address register.
#[derive(Debug, Clone)]
pub struct RegisterClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
    profiler: Arc<RequestProfiler>,
}

impl RegisterClient {
    /// Create a new register client.
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        profiler: Arc<RequestProfiler>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
            retry,
            profiler,
        }
    }

    /// Endpoint this client searches.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, params: &[(&'static str, String)]) -> Result<RegisterQueryResult, RequestError> {
        let started = Instant::now();
        let result = self.send(params).await;
        self.profiler.record_request(Service::Register, started.elapsed());
        result
    }

    async fn send(&self, params: &[(&'static str, String)]) -> Result<RegisterQueryResult, RequestError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::permanent(format!(
                "register rejected the request with status {status}"
            )));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.into())
    }
}

#[async_trait::async_trait]
impl AddressRegister for RegisterClient {
    async fn query(&self, query: &RegisterQuery) -> Option<RegisterQueryResult> {
        let params = query.to_params();
        debug!(?query, "querying register");

        let mut attempt = 0u32;
        let result = self
            .retry
            .run(Service::Register, || {
                attempt += 1;
                if attempt > 1 {
                    self.profiler.record_retry(Service::Register);
                }
                self.fetch(&params)
            })
            .await;

        match result {
            Ok(result) => {
                debug!(match_count = result.match_count, "register answered");
                Some(result)
            }
            Err(err) => {
                warn!(error = %err, "register query failed");
                self.profiler.record_miss(Service::Register);
                None
            }
        }
    }
}
