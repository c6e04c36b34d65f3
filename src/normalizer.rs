//! Record normalization.
//!
//! Three concerns live here: cleaning raw input before any check runs,
//! formatting records for printing once checks are done, and deciding
//! whether two versions of a record are the same address written
//! differently.

use unicode_normalization::UnicodeNormalization;

use crate::types::{AddressRecord, HomeCountry};

/// Normalizer for address records.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    home: HomeCountry,
    ascii_folding: bool,
}

impl RecordNormalizer {
    /// Create a new normalizer for the given home country.
    pub fn new(home: HomeCountry) -> Self {
        Self {
            home,
            ascii_folding: true,
        }
    }

    /// Enable/disable folding address lines and cities to ASCII.
    pub fn with_ascii_folding(mut self, enabled: bool) -> Self {
        self.ascii_folding = enabled;
        self
    }

    /// The home country used for domestic formatting rules.
    pub fn home(&self) -> &HomeCountry {
        &self.home
    }

    /// Clean a freshly read record in place.
    ///
    /// `ß` becomes `ss`, accents are stripped from the address lines and the
    /// city, and the postal code is uppercased.
    pub fn prepare(&self, record: &mut AddressRecord) {
        for field in [&mut record.address, &mut record.address_2, &mut record.city] {
            let expanded = expand_sharp_s(field);
            *field = if self.ascii_folding {
                fold_ascii(&expanded)
            } else {
                expanded
            };
        }
        record.postal_code = record.postal_code.to_uppercase();
    }

    /// Clean a batch of records in place.
    pub fn prepare_batch(&self, records: &mut [AddressRecord]) {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            records.par_iter_mut().for_each(|record| self.prepare(record));
        }
        #[cfg(not(feature = "parallel"))]
        {
            records.iter_mut().for_each(|record| self.prepare(record));
        }
    }

    /// Format a checked record for printing.
    ///
    /// Compact domestic postal codes get their space back (`1234AB` becomes
    /// `1234 AB`), city and country are uppercased.
    pub fn finalize(&self, record: &mut AddressRecord) {
        if record.is_domestic(&self.home) {
            record.postal_code = format_postal_code(&record.postal_code);
        }
        record.city = expand_sharp_s(&record.city.to_uppercase());
        record.country = record.country.to_uppercase();
        record.address = expand_sharp_s(&record.address);
        record.address_2 = expand_sharp_s(&record.address_2);
    }

    /// Format a batch of checked records for printing.
    pub fn finalize_batch(&self, records: &mut [AddressRecord]) {
        records.iter_mut().for_each(|record| self.finalize(record));
    }

    /// Whether two records describe the same address.
    pub fn is_similar(&self, a: &AddressRecord, b: &AddressRecord) -> bool {
        is_similar(a, b, &self.home)
    }
}

/// Postal code as sent to the register: uppercase, no spaces.
pub fn query_postal_code(postal_code: &str) -> String {
    postal_code.to_uppercase().replace(' ', "")
}

/// Render a six-character domestic postal code as `1234 AB`.
///
/// Any other input is only uppercased.
pub fn format_postal_code(postal_code: &str) -> String {
    let upper = postal_code.to_uppercase();
    if upper.len() == 6 && upper.is_ascii() {
        format!("{} {}", &upper[..4], &upper[4..])
    } else {
        upper
    }
}

/// Whether two records describe the same address, ignoring case and the
/// `ß`/`ss` spelling difference.
///
/// Domestic postal codes are compared without spaces unless they are already
/// six characters long. Symmetric in `a` and `b`.
pub fn is_similar(a: &AddressRecord, b: &AddressRecord, home: &HomeCountry) -> bool {
    comparable(&a.address) == comparable(&b.address)
        && comparable_postal_code(a, home) == comparable_postal_code(b, home)
        && comparable(&a.city) == comparable(&b.city)
        && comparable(&a.country) == comparable(&b.country)
}

fn comparable(value: &str) -> String {
    expand_sharp_s(&value.to_lowercase())
}

fn comparable_postal_code(record: &AddressRecord, home: &HomeCountry) -> String {
    let postal_code = record.postal_code.to_lowercase();
    // six characters is the compact domestic form and is left alone
    if record.is_domestic(home) && postal_code.chars().count() != 6 {
        postal_code.replace(' ', "")
    } else {
        postal_code
    }
}

/// Replace the German sharp s with its two-letter expansion.
pub fn expand_sharp_s(value: &str) -> String {
    value.replace('ß', "ss").replace('ẞ', "SS")
}

/// Fold to ASCII through compatibility decomposition.
///
/// Accents are split off and dropped and ligatures are spelled out (`ĳ`
/// becomes `ij`). Characters without an ASCII decomposition are removed.
pub fn fold_ascii(value: &str) -> String {
    value.nfkd().filter(char::is_ascii).collect()
}
