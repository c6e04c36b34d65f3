//! Common types and enums for postal-labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker placed in an address line by upstream exports for erased addresses.
pub const REMOVED_MARKER: &str = "<removed>";

/// The operator's home country.
///
/// Records whose country equals [`HomeCountry::name`] are *domestic*: they are
/// checked against the national register, and their country is left off
/// printed labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HomeCountry {
    /// Full country name as it appears in input files (e.g. "Netherlands")
    pub name: String,
    /// ISO 3166-1 alpha-2 code as reported by the geocoder (e.g. "NL")
    pub code: String,
}

impl HomeCountry {
    /// Create a new home country.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Check whether a country name refers to this country.
    ///
    /// Exact comparison; input files carry the canonical spelling.
    pub fn is(&self, country: &str) -> bool {
        country == self.name
    }
}

impl Default for HomeCountry {
    fn default() -> Self {
        Self::new("Netherlands", "NL")
    }
}

impl fmt::Display for HomeCountry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// One person/address pair from the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AddressRecord {
    /// First name
    pub first_name: String,
    /// Last name, including prefixes such as "van" or "te"
    pub last_name: String,
    /// Free-text street line, e.g. "Kerkstraat 12A"
    pub address: String,
    /// Optional second address line, empty when absent
    pub address_2: String,
    /// Postal code in whatever format the input used
    pub postal_code: String,
    /// City
    pub city: String,
    /// Country name
    pub country: String,
}

impl AddressRecord {
    /// Whether this record can never be delivered: its address line is empty
    /// or was erased upstream.
    pub fn is_removed(&self) -> bool {
        self.address.trim().is_empty() || self.address.contains(REMOVED_MARKER)
    }

    /// Whether this record lies in the given home country.
    pub fn is_domestic(&self, home: &HomeCountry) -> bool {
        home.is(&self.country)
    }

    /// Read a field by name.
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Address => &self.address,
            Field::PostalCode => &self.postal_code,
            Field::City => &self.city,
            Field::Country => &self.country,
        }
    }

    /// List the location fields that differ between `self` and `other`.
    pub fn diff(&self, other: &AddressRecord) -> Vec<FieldChange> {
        Field::ALL
            .iter()
            .filter(|field| self.get(**field) != other.get(**field))
            .map(|field| FieldChange {
                field: *field,
                old: self.get(*field).to_string(),
                new: other.get(*field).to_string(),
            })
            .collect()
    }

    /// Human-readable multi-line block used in prompts and audit logs.
    pub fn block<'a>(&'a self, home: &'a HomeCountry) -> RecordBlock<'a> {
        RecordBlock { record: self, home }
    }
}

/// Display adapter for [`AddressRecord::block`].
#[derive(Debug, Clone, Copy)]
pub struct RecordBlock<'a> {
    record: &'a AddressRecord,
    home: &'a HomeCountry,
}

impl fmt::Display for RecordBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.record;
        writeln!(f, "  Name:          {} {}", r.first_name, r.last_name)?;
        writeln!(f, "  Address:       {}", r.address)?;
        if !r.address_2.is_empty() {
            writeln!(f, "                 {}", r.address_2)?;
        }
        writeln!(f, "  Postal code:   {}", r.postal_code)?;
        write!(f, "  City:          {}", r.city)?;
        if !r.is_domestic(self.home) {
            write!(f, "\n  Country:       {}", r.country)?;
        }
        Ok(())
    }
}

/// The location fields a strategy may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Street line
    Address,
    /// Postal code
    PostalCode,
    /// City
    City,
    /// Country
    Country,
}

impl Field {
    /// All location fields in display order.
    pub const ALL: [Field; 4] = [Field::Address, Field::PostalCode, Field::City, Field::Country];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Address => "address",
            Field::PostalCode => "postal code",
            Field::City => "city",
            Field::Country => "country",
        };
        f.write_str(name)
    }
}

/// A single field rewritten by a successful strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Which field changed
    pub field: Field,
    /// Value before the strategy ran
    pub old: String,
    /// Value committed by the strategy
    pub new: String,
}

/// Which register filter to leave out of a verification query.
///
/// Leaving a field out turns the query into a search for its correct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IgnoredField {
    /// Query with every field
    #[default]
    None,
    /// Query without the street name
    Street,
    /// Query without the city
    City,
    /// Query without the postal code
    PostalCode,
}

/// One fallback approach in the reconciliation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Register lookup with every field
    FullMatch,
    /// Geocoder suggestion confirmed by the register
    GeocoderAssisted,
    /// Register lookup ignoring the street name
    IgnoreStreet,
    /// Register lookup ignoring the city
    IgnoreCity,
    /// Register lookup ignoring the postal code
    IgnorePostalCode,
    /// Geocoder suggestion for a record outside the home country
    GeocoderForeign,
}

impl Strategy {
    /// Strategy order for domestic records.
    pub const DOMESTIC_CHAIN: [Strategy; 5] = [
        Strategy::FullMatch,
        Strategy::GeocoderAssisted,
        Strategy::IgnoreStreet,
        Strategy::IgnoreCity,
        Strategy::IgnorePostalCode,
    ];

    /// Strategy order for records outside the home country.
    pub const FOREIGN_CHAIN: [Strategy; 1] = [Strategy::GeocoderForeign];

    /// Tag written to the changed-records audit log.
    pub fn tag(&self) -> &'static str {
        match self {
            Strategy::FullMatch => "register-full-match",
            Strategy::GeocoderAssisted => "geocoder-assisted",
            Strategy::IgnoreStreet => "register-correction-street",
            Strategy::IgnoreCity => "register-correction-city",
            Strategy::IgnorePostalCode => "register-correction-postal-code",
            Strategy::GeocoderForeign => "geocoder-foreign",
        }
    }

    /// The register filter this strategy leaves out, for register strategies.
    pub fn ignored_field(&self) -> Option<IgnoredField> {
        match self {
            Strategy::FullMatch => Some(IgnoredField::None),
            Strategy::IgnoreStreet => Some(IgnoredField::Street),
            Strategy::IgnoreCity => Some(IgnoredField::City),
            Strategy::IgnorePostalCode => Some(IgnoredField::PostalCode),
            Strategy::GeocoderAssisted | Strategy::GeocoderForeign => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Why a record was excluded from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Empty address line or an erased record
    RemovedAddress,
    /// Every strategy failed and the operator chose to drop the record
    DeclinedByOperator,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RemovedAddress => f.write_str("address is empty or removed"),
            RejectReason::DeclinedByOperator => {
                f.write_str("address could not be validated and was declined")
            }
        }
    }
}

/// Outcome of reconciling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A strategy succeeded without a meaningful change
    Confirmed {
        /// Winning strategy
        strategy: Strategy,
    },
    /// A strategy succeeded and rewrote at least one field
    Corrected {
        /// Fields that differ from the input
        changes: Vec<FieldChange>,
        /// Winning strategy
        strategy: Strategy,
    },
    /// The record must be dropped
    Rejected(RejectReason),
    /// No strategy succeeded; the record is kept as-is once a human agrees
    Undecided {
        /// Explanation shown to the operator
        reason: String,
    },
}

impl Verdict {
    /// Whether the record stays in the output.
    pub fn keeps_record(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }

    /// The strategy that produced this verdict, if any.
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            Verdict::Confirmed { strategy } | Verdict::Corrected { strategy, .. } => {
                Some(*strategy)
            }
            Verdict::Rejected(_) | Verdict::Undecided { .. } => None,
        }
    }
}
