//! Address line parsing.
//!
//! Splits a free-text street line such as `"Kerkstraat 12A"` or
//! `"2e Van Swindenstraat, 4 hs"` into street, house number and house number
//! suffix. The pattern follows the Dutch convention of street first and
//! number last.

use std::sync::LazyLock;

use regex::Regex;

/// Street name, separator, mandatory house number, optional suffix.
///
/// The street may start with digits ("2e Helmersstraat") and contains
/// letters (accented ones included), spaces and `' / \ . -`.
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d*[\w '/\\.\-]+)[,\s]+(\d+)[\s,]*([\w\-/]*)$")
        .expect("address pattern is a valid regex")
});

/// Address line parser.
#[derive(Debug, Clone, Default)]
pub struct AddressParser {
    _private: (),
}

impl AddressParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an address line into its structural parts.
    ///
    /// When the line has no house number after the street name, every part
    /// is `None`. That means the line cannot be repaired automatically, not
    /// that the address is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use postal_labels::AddressParser;
    ///
    /// let parsed = AddressParser::new().parse("Kerkstraat, 12A");
    /// assert_eq!(parsed.street.as_deref(), Some("Kerkstraat"));
    /// assert_eq!(parsed.house_number.as_deref(), Some("12"));
    /// assert_eq!(parsed.house_number_suffix.as_deref(), Some("A"));
    /// ```
    pub fn parse(&self, address: &str) -> ParsedAddress {
        let Some(captures) = ADDRESS_PATTERN.captures(address.trim()) else {
            return ParsedAddress::default();
        };

        let part = |index: usize| {
            captures
                .get(index)
                .map(|m| m.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
        };

        ParsedAddress {
            street: part(1),
            house_number: part(2),
            house_number_suffix: part(3),
        }
    }

    /// Parse multiple address lines.
    pub fn parse_batch(&self, addresses: &[&str]) -> Vec<ParsedAddress> {
        addresses.iter().map(|addr| self.parse(addr)).collect()
    }

    /// Parse multiple address lines in parallel using multiple threads.
    ///
    /// Results are returned in the same order as the input.
    #[cfg(feature = "parallel")]
    pub fn parse_batch_parallel(&self, addresses: &[&str]) -> Vec<ParsedAddress> {
        use rayon::prelude::*;

        addresses.par_iter().map(|addr| self.parse(addr)).collect()
    }
}

/// Structural parts of an address line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedAddress {
    /// Street name (e.g. "Kerkstraat", "2e Helmersstraat")
    pub street: Option<String>,
    /// Numeric house number (e.g. "12")
    pub house_number: Option<String>,
    /// Unit letter or sub-number following the house number (e.g. "A", "3-hoog")
    pub house_number_suffix: Option<String>,
}

impl ParsedAddress {
    /// Whether the line matched the street-and-number shape.
    pub fn is_match(&self) -> bool {
        self.house_number.is_some()
    }

    /// Check if the parsed address has any components.
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.house_number.is_none() && self.house_number_suffix.is_none()
    }
}
