//! # postal-labels
//!
//! Validate, repair and print postal address labels.
//!
//! Address records read from CSV files are checked against two services: a
//! general-purpose geocoder and the national address register. Records that
//! can be matched are corrected where needed, records that cannot are shown
//! to the operator, and the result is printed onto a sheet of adhesive
//! labels.
//!
//! ## Features
//!
//! - **Address Parsing**: Split street lines into street, number and suffix
//! - **Reconciliation**: Ordered fallback strategies against the register and geocoder
//! - **Audit Logs**: Rejected and changed records written as plain text
//! - **Label Sheets**: A4 sheets of 2 × 7 labels as PDF
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use postal_labels::{AddressChecker, AddressRecord};
//!
//! # async fn run() -> postal_labels::Result<()> {
//! // Reads the API key from input/credentials.json and checks it
//! let checker = AddressChecker::new().await?;
//!
//! let mut record = AddressRecord {
//!     first_name: "Anna".into(),
//!     last_name: "de Vries".into(),
//!     address: "Kerkstraat 12".into(),
//!     postal_code: "1234AB".into(),
//!     city: "Amsterdam".into(),
//!     country: "Netherlands".into(),
//!     ..Default::default()
//! };
//! let verdict = checker.check_record(&mut record).await;
//! println!("{verdict:?}: {}", record.block(checker.home()));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod credentials;
pub mod error;
pub mod geocoder;
pub mod input;
pub mod labels;
pub mod normalizer;
pub mod parser;
pub mod profiling;
pub mod prompt;
pub mod reconcile;
pub mod register;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;

// Re-export main API
pub use batch::{BatchCorrector, BatchReport, ChangedRecord};
pub use error::{Error, Result};
pub use geocoder::{Geocoder, GeocoderClient, StructuredAddress};
pub use input::{InputBatch, read_input_dir};
pub use labels::LabelSheet;
pub use normalizer::RecordNormalizer;
pub use parser::{AddressParser, ParsedAddress};
pub use profiling::{RequestProfiler, RequestSummary, Service};
pub use prompt::{Confirmer, FixedAnswer, TerminalConfirmer};
pub use reconcile::Reconciler;
pub use register::{AddressRegister, RegisterClient, RegisterQuery, RegisterQueryResult, RetryPolicy};
pub use types::*;

/// Main entry point: the configured services and the reconciliation engine.
///
/// # Examples
///
/// ```rust,no_run
/// use postal_labels::{AddressChecker, CheckerConfig, HomeCountry};
///
/// # async fn run() -> postal_labels::Result<()> {
/// let config = CheckerConfig::builder()
///     .home_country(HomeCountry::new("Netherlands", "NL"))
///     .credentials_path("input/credentials.json")
///     .build();
///
/// let checker = AddressChecker::with_config(config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AddressChecker {
    config: CheckerConfig,
    reconciler: Reconciler,
    profiler: Arc<RequestProfiler>,
}

impl AddressChecker {
    /// Set up the checker with default configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the API key is missing or
    /// rejected.
    pub async fn new() -> Result<Self> {
        Self::with_config(CheckerConfig::default()).await
    }

    /// Set up the checker with custom configuration.
    ///
    /// The API key is loaded and, unless disabled, probed against the
    /// geocoder before anything else happens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidApiKey`] for a missing, malformed or rejected
    /// key, and [`Error::Network`] when the geocoder cannot be reached for
    /// the probe.
    pub async fn with_config(config: CheckerConfig) -> Result<Self> {
        let api_key = credentials::load_api_key(&config.credentials_path)?;

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {e}")))?;
        let profiler = Arc::new(RequestProfiler::new());

        let geocoder = GeocoderClient::new(
            http.clone(),
            config.geocoder_endpoint.clone(),
            api_key,
            config.request_timeout,
            profiler.clone(),
        );
        if config.validate_api_key {
            geocoder.validate_key().await?;
        }

        let register = RegisterClient::new(
            http,
            config.register_endpoint.clone(),
            config.request_timeout,
            config.retry_policy,
            profiler.clone(),
        );

        Ok(Self::with_services(
            config,
            Arc::new(register),
            Arc::new(geocoder),
            profiler,
        ))
    }

    /// Build a checker over existing service implementations.
    ///
    /// Credentials are not read.
    pub fn with_services(
        config: CheckerConfig,
        register: Arc<dyn AddressRegister>,
        geocoder: Arc<dyn Geocoder>,
        profiler: Arc<RequestProfiler>,
    ) -> Self {
        let reconciler = Reconciler::new(register, geocoder, config.home_country.clone());
        Self {
            config,
            reconciler,
            profiler,
        }
    }

    /// The operator's home country.
    pub fn home(&self) -> &HomeCountry {
        &self.config.home_country
    }

    /// Create an address parser.
    pub fn parser(&self) -> AddressParser {
        AddressParser::new()
    }

    /// Create a normalizer for the home country.
    pub fn normalizer(&self) -> RecordNormalizer {
        RecordNormalizer::new(self.config.home_country.clone())
    }

    /// The reconciliation engine.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Reconcile a single record without asking anyone.
    pub async fn check_record(&self, record: &mut AddressRecord) -> Verdict {
        self.reconciler.reconcile(record).await
    }

    /// Correct a whole batch, asking `confirmer` about undecided records.
    pub async fn correct_batch(
        &self,
        records: &mut Vec<AddressRecord>,
        confirmer: &dyn Confirmer,
        progress: Option<ProgressBar>,
    ) -> BatchReport {
        let mut corrector = BatchCorrector::new(&self.reconciler, confirmer);
        if let Some(progress) = progress {
            corrector = corrector.with_progress(progress);
        }
        corrector.run(records).await
    }

    /// Request counters shared by both service clients.
    pub fn profiler(&self) -> &RequestProfiler {
        &self.profiler
    }

    /// Get the configuration used by this instance.
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }
}

/// Configuration for the address checker.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Country whose records are checked against the register
    pub home_country: HomeCountry,

    /// JSON file holding the geocoder API key
    pub credentials_path: PathBuf,

    /// Geocoder endpoint
    pub geocoder_endpoint: String,

    /// Register search endpoint
    pub register_endpoint: String,

    /// Timeout for a single request attempt
    pub request_timeout: Duration,

    /// Retry policy for register requests
    pub retry_policy: RetryPolicy,

    /// Whether to probe the API key before processing
    pub validate_api_key: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfigBuilder::new().build()
    }
}

impl CheckerConfig {
    /// Create a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use postal_labels::CheckerConfig;
    ///
    /// let config = CheckerConfig::builder()
    ///     .request_timeout(Duration::from_secs(10))
    ///     .validate_api_key(false)
    ///     .build();
    /// assert_eq!(config.home_country.code, "NL");
    /// ```
    pub fn builder() -> CheckerConfigBuilder {
        CheckerConfigBuilder::new()
    }
}

/// Builder for CheckerConfig.
#[derive(Debug, Clone)]
pub struct CheckerConfigBuilder {
    home_country: HomeCountry,
    credentials_path: Option<PathBuf>,
    geocoder_endpoint: String,
    register_endpoint: String,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    validate_api_key: bool,
}

impl CheckerConfigBuilder {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self {
            home_country: HomeCountry::default(),
            credentials_path: None,
            geocoder_endpoint: geocoder::DEFAULT_GEOCODER_ENDPOINT.to_string(),
            register_endpoint: register::DEFAULT_REGISTER_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
            validate_api_key: true,
        }
    }

    /// Set the home country.
    pub fn home_country(mut self, home: HomeCountry) -> Self {
        self.home_country = home;
        self
    }

    /// Set the credentials file.
    pub fn credentials_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Set the geocoder endpoint.
    pub fn geocoder_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.geocoder_endpoint = endpoint.into();
        self
    }

    /// Set the register endpoint.
    pub fn register_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.register_endpoint = endpoint.into();
        self
    }

    /// Set the per-attempt request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the register retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set whether to probe the API key before processing.
    pub fn validate_api_key(mut self, enabled: bool) -> Self {
        self.validate_api_key = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> CheckerConfig {
        CheckerConfig {
            home_country: self.home_country,
            credentials_path: self
                .credentials_path
                .unwrap_or_else(credentials::default_credentials_path),
            geocoder_endpoint: self.geocoder_endpoint,
            register_endpoint: self.register_endpoint,
            request_timeout: self.request_timeout,
            retry_policy: self.retry_policy,
            validate_api_key: self.validate_api_key,
        }
    }
}

impl Default for CheckerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
