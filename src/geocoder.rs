//! General-purpose geocoder client.
//!
//! The geocoder turns a free-text address into typed address components. It
//! is used to repair domestic addresses before they are checked against the
//! register, and as the only check for addresses abroad.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::profiling::{RequestProfiler, Service};
use crate::types::{AddressRecord, HomeCountry};

/// Default geocoding endpoint.
pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Typed address fields extracted from a geocoder result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredAddress {
    /// Street name (`route`)
    pub street_name: Option<String>,
    /// House number (`street_number`)
    pub street_number: Option<String>,
    /// Unit within the building (`subpremise`)
    pub street_extra: Option<String>,
    /// Postal code (`postal_code`)
    pub postal_code: Option<String>,
    /// City (`locality`)
    pub city: Option<String>,
    /// Two-letter country code (`country`, short form)
    pub country_short: Option<String>,
    /// Country name (`country`, long form)
    pub country_long: Option<String>,
}

impl StructuredAddress {
    /// Create a StructuredAddress from raw address components.
    pub(crate) fn from_components(components: Vec<AddressComponent>) -> Self {
        let mut address = StructuredAddress::default();

        for component in components {
            for kind in &component.types {
                match kind.as_str() {
                    "route" => address.street_name = Some(component.long_name.clone()),
                    "street_number" => address.street_number = Some(component.long_name.clone()),
                    "subpremise" => address.street_extra = Some(component.long_name.clone()),
                    "postal_code" => address.postal_code = Some(component.long_name.clone()),
                    "locality" => address.city = Some(component.long_name.clone()),
                    "country" => {
                        address.country_short = Some(component.short_name.clone());
                        address.country_long = Some(component.long_name.clone());
                    }
                    _ => {}
                }
            }
        }

        address
    }

    /// Street line: street name and number, with the unit after a comma.
    ///
    /// Empty when the geocoder resolved neither street nor number.
    pub fn address_line(&self) -> String {
        let mut line = [&self.street_name, &self.street_number]
            .into_iter()
            .filter_map(|part| non_empty(part))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(extra) = non_empty(&self.street_extra) {
            line = format!("{line}, {extra}");
        }
        line
    }

    /// Whether this is a fully resolved address in the home country.
    pub fn is_complete_in(&self, home: &HomeCountry) -> bool {
        non_empty(&self.country_short) == Some(home.code.as_str())
            && non_empty(&self.street_name).is_some()
            && non_empty(&self.street_number).is_some()
            && non_empty(&self.postal_code).is_some()
            && non_empty(&self.city).is_some()
    }

    /// Copy `record` with the resolved location fields written over it.
    ///
    /// Country is only taken over for addresses abroad.
    pub fn apply_to(&self, record: &AddressRecord, assume_domestic: bool) -> AddressRecord {
        let mut suggestion = record.clone();

        let line = self.address_line();
        if !line.is_empty() {
            suggestion.address = line;
        }
        if let Some(postal_code) = non_empty(&self.postal_code) {
            suggestion.postal_code = postal_code.to_string();
        }
        if let Some(city) = non_empty(&self.city) {
            suggestion.city = city.to_string();
        }
        if !assume_domestic {
            if let Some(country) = non_empty(&self.country_long) {
                suggestion.country = country.to_string();
            }
        }

        suggestion
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Raw address component as returned by the geocoder.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AddressComponent {
    #[serde(default)]
    long_name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Option<Vec<AddressComponent>>,
}

impl GeocodeResponse {
    fn into_structured(self) -> Option<StructuredAddress> {
        if self.status != "OK" {
            return None;
        }
        self.results
            .into_iter()
            .find_map(|result| result.address_components)
            .map(StructuredAddress::from_components)
    }
}

/// Free-text address lookup service.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// Look up the record's address line, optionally together with its city.
    ///
    /// Returns `None` when the service fails, finds nothing, or answers
    /// without address components.
    async fn lookup(&self, record: &AddressRecord, include_city: bool) -> Option<StructuredAddress>;

    /// Suggest a corrected copy of `record`.
    ///
    /// The city is included in the first lookup. For domestic records a
    /// result that is missing, not in the home country, or lacks any of
    /// street, number, postal code and city is retried without the city;
    /// for other records only a missing result is retried.
    async fn suggest(
        &self,
        record: &AddressRecord,
        assume_domestic: bool,
        home: &HomeCountry,
    ) -> Option<AddressRecord> {
        let first = self.lookup(record, true).await;

        let needs_retry = match &first {
            None => true,
            Some(address) => assume_domestic && !address.is_complete_in(home),
        };

        let address = if needs_retry {
            debug!("retrying geocoder lookup without city");
            self.lookup(record, false).await
        } else {
            first
        }?;

        Some(address.apply_to(record, assume_domestic))
    }
}

/// HTTP client for the geocoding service.
#[derive(Debug, Clone)]
pub struct GeocoderClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    profiler: Arc<RequestProfiler>,
}

impl GeocoderClient {
    /// Create a new geocoder client.
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        profiler: Arc<RequestProfiler>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
            profiler,
        }
    }

    /// Check that the service accepts the API key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidApiKey`] when the service denies the key and
    /// [`Error::Network`] when it cannot be reached.
    pub async fn validate_key(&self) -> Result<()> {
        let response = self
            .request("a")
            .await
            .map_err(|e| Error::network(format!("Failed to reach the geocoder: {e}")))?;

        if response.status == "REQUEST_DENIED" {
            return Err(Error::invalid_api_key(
                "The API key in the credentials file was invalid",
            ));
        }
        Ok(())
    }

    async fn request(&self, address: &str) -> std::result::Result<GeocodeResponse, reqwest::Error> {
        let started = Instant::now();
        let result = async {
            self.http
                .get(&self.endpoint)
                .query(&[("address", address), ("key", self.api_key.as_str())])
                .timeout(self.timeout)
                .send()
                .await?
                .error_for_status()?
                .json::<GeocodeResponse>()
                .await
        }
        .await;
        self.profiler.record_request(Service::Geocoder, started.elapsed());
        result
    }
}

#[async_trait::async_trait]
impl Geocoder for GeocoderClient {
    async fn lookup(&self, record: &AddressRecord, include_city: bool) -> Option<StructuredAddress> {
        let address = if include_city {
            format!("{} {}", record.address, record.city)
        } else {
            record.address.clone()
        };
        debug!(%address, "querying geocoder");

        let structured = match self.request(&address).await {
            Ok(response) => {
                let status = response.status.clone();
                let structured = response.into_structured();
                if structured.is_none() {
                    debug!(%status, "geocoder returned no usable result");
                }
                structured
            }
            Err(err) => {
                warn!(error = %err, "geocoder request failed");
                None
            }
        };

        if structured.is_none() {
            self.profiler.record_miss(Service::Geocoder);
        }
        structured
    }
}
