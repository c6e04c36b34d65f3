//! Address reconciliation.
//!
//! A [`Reconciler`] decides for one record whether its address is valid and,
//! when it is not, tries to repair it. Domestic records run through an
//! ordered chain of strategies ([`Strategy::DOMESTIC_CHAIN`]) that combine
//! the address register with the geocoder; records abroad can only be
//! checked by the geocoder. Every strategy works on a copy of the record, and
//! only the copy of the first successful strategy is written back.
//!
//! Nothing here fails with an error: a strategy that cannot verify a record
//! returns `None` and the next one is tried. A record that no strategy can
//! settle ends up [`Verdict::Undecided`] and is left to a human.

use std::sync::Arc;

use tracing::{debug, info};

use crate::geocoder::Geocoder;
use crate::normalizer::{is_similar, query_postal_code};
use crate::parser::AddressParser;
use crate::prompt::Confirmer;
use crate::register::{AddressRegister, RegisterCandidate, RegisterQuery, RegisterQueryResult};
use crate::types::{AddressRecord, HomeCountry, IgnoredField, RejectReason, Strategy, Verdict};

/// More matches than this means the query did not pin anything down.
pub const MAX_MATCH_COUNT: u64 = 25_000;

/// Largest result set scanned when searching for the right postal code.
pub const MAX_POSTAL_CODE_CANDIDATES: u64 = 10;

/// Reconciliation engine for address records.
pub struct Reconciler {
    register: Arc<dyn AddressRegister>,
    geocoder: Arc<dyn Geocoder>,
    parser: AddressParser,
    home: HomeCountry,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler over the given services.
    pub fn new(
        register: Arc<dyn AddressRegister>,
        geocoder: Arc<dyn Geocoder>,
        home: HomeCountry,
    ) -> Self {
        Self {
            register,
            geocoder,
            parser: AddressParser::new(),
            home,
        }
    }

    /// The home country deciding which chain a record runs through.
    pub fn home(&self) -> &HomeCountry {
        &self.home
    }

    /// Reconcile `record` without asking anyone.
    ///
    /// On success the winning strategy's values are written to `record`. A
    /// failed strategy leaves no trace on it.
    pub async fn reconcile(&self, record: &mut AddressRecord) -> Verdict {
        if record.is_removed() {
            info!(address = %record.address, "rejecting removed address");
            return Verdict::Rejected(RejectReason::RemovedAddress);
        }

        let chain: &[Strategy] = if record.is_domestic(&self.home) {
            &Strategy::DOMESTIC_CHAIN
        } else {
            &Strategy::FOREIGN_CHAIN
        };

        for &strategy in chain {
            let Some(working) = self.attempt(strategy, record).await else {
                debug!(%strategy, address = %record.address, "strategy failed");
                continue;
            };

            let verdict = if is_similar(record, &working, &self.home) {
                Verdict::Confirmed { strategy }
            } else {
                Verdict::Corrected {
                    changes: record.diff(&working),
                    strategy,
                }
            };
            info!(
                %strategy,
                address = %working.address,
                changed = matches!(verdict, Verdict::Corrected { .. }),
                "address verified"
            );
            *record = working;
            return verdict;
        }

        info!(address = %record.address, "no strategy could verify the address");
        Verdict::Undecided {
            reason: format!("none of {} strategies could verify the address", chain.len()),
        }
    }

    /// Reconcile `record` and ask `confirmer` about a record that stays
    /// undecided.
    ///
    /// A refusal turns the verdict into [`RejectReason::DeclinedByOperator`].
    pub async fn check(&self, record: &mut AddressRecord, confirmer: &dyn Confirmer) -> Verdict {
        let verdict = self.reconcile(record).await;
        let reason = match &verdict {
            Verdict::Undecided { reason } => reason.clone(),
            _ => return verdict,
        };

        let question = format!(
            "\n---------------------------------------------------\n\
             We could not validate the correctness of the following address:\n\
             {}\n\
             Reason: {reason}\n\
             Do you want to add this address anyway?",
            record.block(&self.home)
        );
        if confirmer.confirm(&question, Some(false)) {
            verdict
        } else {
            Verdict::Rejected(RejectReason::DeclinedByOperator)
        }
    }

    /// Run one strategy on a copy of `record`.
    pub async fn attempt(&self, strategy: Strategy, record: &AddressRecord) -> Option<AddressRecord> {
        if let Some(ignored) = strategy.ignored_field() {
            return self.verify(record, ignored).await;
        }
        match strategy {
            Strategy::GeocoderAssisted => {
                let suggestion = self.geocoder.suggest(record, true, &self.home).await?;
                self.verify(&suggestion, IgnoredField::None).await
            }
            Strategy::GeocoderForeign => self.geocoder.suggest(record, false, &self.home).await,
            _ => None,
        }
    }

    /// Check a domestic record against the register, leaving out `ignored`.
    ///
    /// Returns the record as the register knows it, or `None` when the
    /// register cannot confirm a single address.
    pub async fn verify(&self, record: &AddressRecord, ignored: IgnoredField) -> Option<AddressRecord> {
        let parsed = self.parser.parse(&record.address);
        let (Some(street), Some(house_number)) = (parsed.street, parsed.house_number) else {
            debug!(address = %record.address, "no house number, cannot verify");
            return None;
        };

        let mut query = RegisterQuery {
            street: Some(street.clone()),
            house_number: Some(house_number.clone()),
            postal_code: non_empty(query_postal_code(&record.postal_code)),
            city: non_empty(record.city.clone()),
            house_number_suffix: parsed.house_number_suffix,
        };
        omit(&mut query, ignored);

        let mut result = self.register.query(&query).await?;

        // postal code search drops the suffix on its own, separate from the
        // generic retry below
        if ignored == IgnoredField::PostalCode && result.match_count == 0 && query.has_suffix() {
            query = query.without_suffix();
            result = self.register.query(&query).await?;
        }

        if result.match_count > MAX_MATCH_COUNT {
            debug!(count = result.match_count, "too many register matches");
            return None;
        }

        let mut suffix_dropped = false;
        if result.match_count == 0 {
            if !query.has_suffix() {
                return None;
            }
            result = self.register.query(&query.without_suffix()).await?;
            if result.match_count == 0 {
                return None;
            }
            suffix_dropped = true;
        } else if result.match_count > 1 && ignored != IgnoredField::None {
            return disambiguate(record, &street, &house_number, ignored, &result);
        }

        let candidate = result.candidates.first()?;
        let mut working = record.clone();
        if result.match_count == 1 {
            working.address = if suffix_dropped {
                record.address.replace(&street, &candidate.street)
            } else {
                format!("{} {}", candidate.street, candidate.house_number_with_suffix)
            };
        }
        working.postal_code = candidate.postal_code.clone();
        working.city = candidate.city.clone();
        Some(working)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn omit(query: &mut RegisterQuery, ignored: IgnoredField) {
    match ignored {
        IgnoredField::None => {}
        IgnoredField::Street => query.street = None,
        IgnoredField::City => query.city = None,
        IgnoredField::PostalCode => query.postal_code = None,
    }
}

/// Pick the correct value of the ignored field from several matches.
fn disambiguate(
    record: &AddressRecord,
    street: &str,
    house_number: &str,
    ignored: IgnoredField,
    result: &RegisterQueryResult,
) -> Option<AddressRecord> {
    let mut working = record.clone();

    match ignored {
        IgnoredField::None => return None,
        IgnoredField::PostalCode => {
            if result.match_count > MAX_POSTAL_CODE_CANDIDATES {
                debug!(count = result.match_count, "too many postal code candidates");
                return None;
            }
            let candidate = single_match(&result.candidates, |c| {
                c.street.contains(street)
                    && c.house_number_with_suffix.starts_with(house_number)
                    && c.city == record.city
            })?;
            working.address = record.address.replace(street, &candidate.street);
            working.postal_code = candidate.postal_code.clone();
        }
        IgnoredField::Street => {
            let candidate = unanimous(result, |c| &c.street)?;
            working.address = record.address.replace(street, &candidate.street);
        }
        IgnoredField::City => {
            let candidate = unanimous(result, |c| &c.city)?;
            working.city = candidate.city.clone();
        }
    }

    Some(working)
}

/// The only candidate satisfying `matches`, if exactly one does.
fn single_match<F>(candidates: &[RegisterCandidate], matches: F) -> Option<&RegisterCandidate>
where
    F: Fn(&RegisterCandidate) -> bool,
{
    let mut found = candidates.iter().filter(|c| matches(*c));
    let candidate = found.next()?;
    if found.next().is_some() {
        debug!("ambiguous register candidates");
        return None;
    }
    Some(candidate)
}

/// The first candidate, if every match agrees on `field`.
///
/// A truncated candidate list cannot prove agreement.
fn unanimous<F>(result: &RegisterQueryResult, field: F) -> Option<&RegisterCandidate>
where
    F: Fn(&RegisterCandidate) -> &String,
{
    if !result.is_complete() {
        debug!(count = result.match_count, returned = result.candidates.len(), "candidate list truncated");
        return None;
    }
    let first = result.candidates.first()?;
    if result.candidates.iter().all(|c| field(c) == field(first)) {
        Some(first)
    } else {
        debug!("register candidates disagree");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::StructuredAddress;
    use crate::prompt::FixedAnswer;
    use crate::types::Field;
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    type Answer = Box<dyn Fn(&RegisterQuery) -> Option<RegisterQueryResult> + Send + Sync>;

    /// Register answering through a closure and remembering every query.
    struct FakeRegister {
        answer: Answer,
        queries: Mutex<Vec<RegisterQuery>>,
    }

    impl FakeRegister {
        fn new(answer: impl Fn(&RegisterQuery) -> Option<RegisterQueryResult> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                answer: Box::new(answer),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<RegisterQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl AddressRegister for FakeRegister {
        async fn query(&self, query: &RegisterQuery) -> Option<RegisterQueryResult> {
            self.queries.lock().unwrap().push(query.clone());
            (self.answer)(query)
        }
    }

    /// Geocoder that always gives the same answer.
    struct FakeGeocoder {
        answer: Option<StructuredAddress>,
        calls: Mutex<usize>,
    }

    impl FakeGeocoder {
        fn new(answer: Option<StructuredAddress>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Geocoder for FakeGeocoder {
        async fn lookup(&self, _record: &AddressRecord, _include_city: bool) -> Option<StructuredAddress> {
            *self.calls.lock().unwrap() += 1;
            self.answer.clone()
        }
    }

    fn candidate(street: &str, number: &str, postal_code: &str, city: &str) -> RegisterCandidate {
        RegisterCandidate {
            street: street.to_string(),
            house_number_with_suffix: number.to_string(),
            postal_code: postal_code.to_string(),
            city: city.to_string(),
        }
    }

    fn found(match_count: u64, candidates: Vec<RegisterCandidate>) -> Option<RegisterQueryResult> {
        Some(RegisterQueryResult {
            match_count,
            candidates,
        })
    }

    fn nothing() -> Option<RegisterQueryResult> {
        found(0, Vec::new())
    }

    fn kerkstraat() -> AddressRecord {
        AddressRecord {
            first_name: "Anna".to_string(),
            last_name: "de Vries".to_string(),
            address: "Kerkstraat 12".to_string(),
            address_2: String::new(),
            postal_code: "1234AB".to_string(),
            city: "Amsterdam".to_string(),
            country: "Netherlands".to_string(),
        }
    }

    fn reconciler(register: Arc<FakeRegister>, geocoder: Arc<FakeGeocoder>) -> Reconciler {
        Reconciler::new(register, geocoder, HomeCountry::default())
    }

    #[tokio::test]
    async fn test_full_match_confirms_and_normalizes_postal_code() {
        let register = FakeRegister::new(|_| {
            found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let geocoder = FakeGeocoder::new(None);
        let engine = reconciler(register.clone(), geocoder.clone());

        let mut record = kerkstraat();
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Confirmed { strategy: Strategy::FullMatch });
        assert_eq!(record.address, "Kerkstraat 12");
        assert_eq!(record.postal_code, "1234 AB");
        assert_eq!(record.city, "Amsterdam");
        assert_eq!(geocoder.calls(), 0);

        let queries = register.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0],
            RegisterQuery {
                street: Some("Kerkstraat".to_string()),
                house_number: Some("12".to_string()),
                postal_code: Some("1234AB".to_string()),
                city: Some("Amsterdam".to_string()),
                house_number_suffix: None,
            }
        );
    }

    #[tokio::test]
    async fn test_everything_fails_leaves_record_undecided_and_untouched() {
        let register = FakeRegister::new(|_| nothing());
        let geocoder = FakeGeocoder::new(None);
        let engine = reconciler(register.clone(), geocoder.clone());

        let mut record = kerkstraat();
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Undecided { .. });
        assert_eq!(record, kerkstraat());
        assert_eq!(geocoder.calls(), 2);
        // full match, ignore street, ignore city, ignore postal code
        assert_eq!(register.queries().len(), 4);
    }

    #[tokio::test]
    async fn test_suffix_retry_falls_through_to_geocoder() {
        let register = FakeRegister::new(|_| nothing());
        let geocoder = FakeGeocoder::new(None);
        let engine = reconciler(register.clone(), geocoder.clone());

        let mut record = kerkstraat();
        record.address = "Kerkstraat 12A".to_string();
        assert!(engine.attempt(Strategy::FullMatch, &record).await.is_none());

        let queries = register.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].house_number_suffix.as_deref(), Some("A"));
        assert_eq!(queries[1], queries[0].without_suffix());

        let verdict = engine.reconcile(&mut record).await;
        assert_matches!(verdict, Verdict::Undecided { .. });
        assert!(geocoder.calls() > 0);
    }

    #[tokio::test]
    async fn test_removed_address_is_rejected_without_lookups() {
        let register = FakeRegister::new(|_| nothing());
        let geocoder = FakeGeocoder::new(None);
        let engine = reconciler(register.clone(), geocoder.clone());

        for address in ["", "   ", "<removed>", "Kerkstraat <removed>"] {
            let mut record = kerkstraat();
            record.address = address.to_string();
            let verdict = engine.reconcile(&mut record).await;
            assert_matches!(verdict, Verdict::Rejected(RejectReason::RemovedAddress));
        }
        assert!(register.queries().is_empty());
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_house_number_never_reaches_register() {
        let register = FakeRegister::new(|_| found(1, vec![candidate("Kerkstraat", "1", "1234 AB", "Amsterdam")]));
        let engine = reconciler(register.clone(), FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.address = "Postbus".to_string();
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Undecided { .. });
        assert!(register.queries().is_empty());
    }

    #[tokio::test]
    async fn test_degenerate_match_count_fails() {
        let register = FakeRegister::new(|_| {
            found(25_001, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        for ignored in [IgnoredField::None, IgnoredField::Street, IgnoredField::PostalCode] {
            assert!(engine.verify(&kerkstraat(), ignored).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_register_strategies_leave_out_their_field() {
        let cases = [
            (Strategy::FullMatch, None),
            (Strategy::IgnoreStreet, Some(Field::Address)),
            (Strategy::IgnoreCity, Some(Field::City)),
            (Strategy::IgnorePostalCode, Some(Field::PostalCode)),
        ];
        for (strategy, left_out) in cases {
            let register = FakeRegister::new(|_| nothing());
            let engine = reconciler(register.clone(), FakeGeocoder::new(None));
            assert!(engine.attempt(strategy, &kerkstraat()).await.is_none());

            let query = &register.queries()[0];
            assert_eq!(query.street.is_none(), left_out == Some(Field::Address), "{strategy}");
            assert_eq!(query.city.is_none(), left_out == Some(Field::City), "{strategy}");
            assert_eq!(query.postal_code.is_none(), left_out == Some(Field::PostalCode), "{strategy}");
        }
    }

    #[tokio::test]
    async fn test_match_count_at_cap_still_verifies() {
        let register = FakeRegister::new(|_| {
            found(MAX_MATCH_COUNT, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let verified = engine.verify(&kerkstraat(), IgnoredField::None).await.expect("verified");
        assert_eq!(verified.postal_code, "1234 AB");
        assert_eq!(verified.address, "Kerkstraat 12");
    }

    #[tokio::test]
    async fn test_unavailable_register_fails_strategy() {
        let register = FakeRegister::new(|_| None);
        let engine = reconciler(register, FakeGeocoder::new(None));
        assert!(engine.verify(&kerkstraat(), IgnoredField::None).await.is_none());
    }

    #[tokio::test]
    async fn test_suffix_dropped_keeps_original_suffix_text() {
        let register = FakeRegister::new(|query| {
            if query.has_suffix() {
                nothing()
            } else {
                found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
            }
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.address = "Kerkstraat 12 rood".to_string();
        let verified = engine.verify(&record, IgnoredField::None).await.expect("verified");

        assert_eq!(verified.address, "Kerkstraat 12 rood");
        assert_eq!(verified.postal_code, "1234 AB");
    }

    #[tokio::test]
    async fn test_single_match_takes_register_spelling() {
        let register = FakeRegister::new(|_| {
            found(1, vec![candidate("Kerkstraat", "12B", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.address = "kerkstraat 12 b".to_string();
        let verified = engine.verify(&record, IgnoredField::None).await.expect("verified");
        assert_eq!(verified.address, "Kerkstraat 12B");
    }

    #[tokio::test]
    async fn test_many_matches_without_ignored_field_keep_address_line() {
        let register = FakeRegister::new(|_| {
            found(
                2,
                vec![
                    candidate("Kerkstraat", "12A", "1234 AB", "Amsterdam"),
                    candidate("Kerkstraat", "12B", "1234 AB", "Amsterdam"),
                ],
            )
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let verified = engine.verify(&kerkstraat(), IgnoredField::None).await.expect("verified");
        assert_eq!(verified.address, "Kerkstraat 12");
        assert_eq!(verified.postal_code, "1234 AB");
    }

    #[tokio::test]
    async fn test_verify_is_idempotent() {
        let register = FakeRegister::new(|_| {
            found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let once = engine.verify(&kerkstraat(), IgnoredField::None).await.expect("verified");
        let twice = engine.verify(&once, IgnoredField::None).await.expect("verified");
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_postal_code_disambiguation_cap() {
        let register = FakeRegister::new(|_| {
            found(15, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));
        assert!(engine.verify(&kerkstraat(), IgnoredField::PostalCode).await.is_none());
    }

    #[tokio::test]
    async fn test_postal_code_disambiguation_at_cap() {
        let mut candidates = vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")];
        for n in 0..9 {
            candidates.push(candidate("Kerkstraat", "12", &format!("{} XX", 2000 + n), "Haarlem"));
        }
        assert_eq!(candidates.len() as u64, MAX_POSTAL_CODE_CANDIDATES);
        let register = FakeRegister::new(move |_| found(MAX_POSTAL_CODE_CANDIDATES, candidates.clone()));
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.postal_code = "9999ZZ".to_string();
        let verified = engine.verify(&record, IgnoredField::PostalCode).await.expect("verified");
        assert_eq!(verified.postal_code, "1234 AB");
    }

    #[tokio::test]
    async fn test_postal_code_disambiguation_needs_exactly_one_match() {
        let one = vec![
            candidate("Kerkstraat", "12", "1234 AB", "Amsterdam"),
            candidate("Kerkstraat", "12", "4321 BA", "Haarlem"),
            candidate("Molenweg", "12", "5555 CC", "Amsterdam"),
        ];
        let register = FakeRegister::new(move |_| found(3, one.clone()));
        let engine = reconciler(register.clone(), FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.postal_code = "9999ZZ".to_string();
        let verified = engine.verify(&record, IgnoredField::PostalCode).await.expect("verified");
        assert_eq!(verified.postal_code, "1234 AB");
        assert_eq!(verified.address, "Kerkstraat 12");
        assert_eq!(register.queries()[0].postal_code, None);

        let two = vec![
            candidate("Kerkstraat", "12", "1234 AB", "Amsterdam"),
            candidate("Oude Kerkstraat", "12", "1234 AC", "Amsterdam"),
        ];
        let register = FakeRegister::new(move |_| found(2, two.clone()));
        let engine = reconciler(register, FakeGeocoder::new(None));
        assert!(engine.verify(&record, IgnoredField::PostalCode).await.is_none());

        let none = vec![
            candidate("Kerkstraat", "12", "4321 BA", "Haarlem"),
            candidate("Molenweg", "12", "5555 CC", "Amsterdam"),
        ];
        let register = FakeRegister::new(move |_| found(2, none.clone()));
        let engine = reconciler(register, FakeGeocoder::new(None));
        assert!(engine.verify(&record, IgnoredField::PostalCode).await.is_none());
    }

    #[tokio::test]
    async fn test_postal_code_search_widens_without_suffix() {
        let register = FakeRegister::new(|query| {
            if query.has_suffix() {
                nothing()
            } else {
                found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
            }
        });
        let engine = reconciler(register.clone(), FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.address = "Kerkstraat 12 achter".to_string();
        record.postal_code = "9999ZZ".to_string();
        let verified = engine.verify(&record, IgnoredField::PostalCode).await.expect("verified");

        // the widened search is a fresh match, not a dropped suffix
        assert_eq!(verified.address, "Kerkstraat 12");
        assert_eq!(verified.postal_code, "1234 AB");

        let queries = register.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.postal_code.is_none()));
        assert_eq!(queries[1].house_number_suffix, None);
    }

    #[tokio::test]
    async fn test_street_correction_requires_agreement() {
        let register = FakeRegister::new(|query| match &query.street {
            Some(_) => nothing(),
            None => found(
                2,
                vec![
                    candidate("Kerkstraat", "12A", "1234 AB", "Amsterdam"),
                    candidate("Kerkstraat", "12B", "1234 AB", "Amsterdam"),
                ],
            ),
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.address = "Kerkstrat 12".to_string();
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Corrected { strategy: Strategy::IgnoreStreet, ref changes } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].field, Field::Address);
            assert_eq!(changes[0].old, "Kerkstrat 12");
            assert_eq!(changes[0].new, "Kerkstraat 12");
        });
        assert_eq!(record.address, "Kerkstraat 12");
    }

    #[tokio::test]
    async fn test_street_correction_fails_on_disagreement_or_truncation() {
        let disagree = FakeRegister::new(|_| {
            found(
                2,
                vec![
                    candidate("Kerkstraat", "12", "1234 AB", "Amsterdam"),
                    candidate("Kerklaan", "12", "1234 AB", "Amsterdam"),
                ],
            )
        });
        let engine = reconciler(disagree, FakeGeocoder::new(None));
        assert!(engine.verify(&kerkstraat(), IgnoredField::Street).await.is_none());

        let truncated = FakeRegister::new(|_| {
            found(
                30,
                vec![
                    candidate("Kerkstraat", "12", "1234 AB", "Amsterdam"),
                    candidate("Kerkstraat", "12", "1234 AB", "Amsterdam"),
                ],
            )
        });
        let engine = reconciler(truncated, FakeGeocoder::new(None));
        assert!(engine.verify(&kerkstraat(), IgnoredField::Street).await.is_none());
    }

    #[tokio::test]
    async fn test_city_correction() {
        let register = FakeRegister::new(|query| match &query.city {
            Some(_) => nothing(),
            None => found(
                2,
                vec![
                    candidate("Kerkstraat", "12A", "1234 AB", "Amsterdam"),
                    candidate("Kerkstraat", "12B", "1234 AB", "Amsterdam"),
                ],
            ),
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        record.city = "Amsterdm".to_string();
        let verdict = engine.reconcile(&mut record).await;

        assert_eq!(verdict.strategy(), Some(Strategy::IgnoreCity));
        assert_eq!(record.city, "Amsterdam");
    }

    #[tokio::test]
    async fn test_geocoder_suggestion_confirmed_by_register() {
        let register = FakeRegister::new(|query| {
            if query.street.as_deref() == Some("Kerkstraat") {
                found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
            } else {
                nothing()
            }
        });
        let geocoder = FakeGeocoder::new(Some(StructuredAddress {
            street_name: Some("Kerkstraat".to_string()),
            street_number: Some("12".to_string()),
            postal_code: Some("1234 AB".to_string()),
            city: Some("Amsterdam".to_string()),
            country_short: Some("NL".to_string()),
            country_long: Some("Netherlands".to_string()),
            ..Default::default()
        }));
        let engine = reconciler(register, geocoder.clone());

        let mut record = kerkstraat();
        record.address = "Kerkstr. 12".to_string();
        let verdict = engine.reconcile(&mut record).await;

        assert_eq!(verdict.strategy(), Some(Strategy::GeocoderAssisted));
        assert_matches!(verdict, Verdict::Corrected { .. });
        assert_eq!(record.address, "Kerkstraat 12");
        assert_eq!(record.first_name, "Anna");
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_foreign_record_confirmed_when_similar() {
        let register = FakeRegister::new(|_| nothing());
        let geocoder = FakeGeocoder::new(Some(StructuredAddress {
            street_name: Some("Müllerstraße".to_string()),
            street_number: Some("5".to_string()),
            postal_code: Some("10115".to_string()),
            city: Some("Berlin".to_string()),
            country_short: Some("DE".to_string()),
            country_long: Some("Germany".to_string()),
            ..Default::default()
        }));
        let engine = reconciler(register.clone(), geocoder);

        let mut record = AddressRecord {
            address: "MÜLLERSTRASSE 5".to_string(),
            postal_code: "10115".to_string(),
            city: "BERLIN".to_string(),
            country: "Germany".to_string(),
            ..kerkstraat()
        };
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Confirmed { strategy: Strategy::GeocoderForeign });
        assert_eq!(record.address, "Müllerstraße 5");
        assert!(register.queries().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_record_corrected() {
        let geocoder = FakeGeocoder::new(Some(StructuredAddress {
            street_name: Some("Rue de Rivoli".to_string()),
            street_number: Some("5".to_string()),
            postal_code: Some("75001".to_string()),
            city: Some("Paris".to_string()),
            country_long: Some("France".to_string()),
            ..Default::default()
        }));
        let engine = reconciler(FakeRegister::new(|_| nothing()), geocoder);

        let mut record = AddressRecord {
            address: "rue rivoli 5".to_string(),
            postal_code: "75001".to_string(),
            city: "Paris".to_string(),
            country: "Frankrijk".to_string(),
            ..kerkstraat()
        };
        let verdict = engine.reconcile(&mut record).await;

        assert_matches!(verdict, Verdict::Corrected { strategy: Strategy::GeocoderForeign, ref changes } => {
            let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
            assert_eq!(fields, vec![Field::Address, Field::Country]);
        });
        assert_eq!(record.country, "France");
    }

    #[tokio::test]
    async fn test_undecided_record_goes_to_operator() {
        let engine = reconciler(FakeRegister::new(|_| nothing()), FakeGeocoder::new(None));

        let mut record = kerkstraat();
        let verdict = engine.check(&mut record, &FixedAnswer(true)).await;
        assert_matches!(verdict, Verdict::Undecided { .. });
        assert!(verdict.keeps_record());

        let verdict = engine.check(&mut record, &FixedAnswer(false)).await;
        assert_matches!(verdict, Verdict::Rejected(RejectReason::DeclinedByOperator));
        assert!(!verdict.keeps_record());
    }

    /// Confirmer keeping every question it was asked.
    struct RecordingConfirmer {
        questions: Mutex<Vec<String>>,
    }

    impl Confirmer for RecordingConfirmer {
        fn confirm(&self, question: &str, default: Option<bool>) -> bool {
            assert_eq!(default, Some(false));
            self.questions.lock().unwrap().push(question.to_string());
            true
        }
    }

    #[tokio::test]
    async fn test_operator_sees_record_and_reason() {
        let engine = reconciler(FakeRegister::new(|_| nothing()), FakeGeocoder::new(None));
        let confirmer = RecordingConfirmer {
            questions: Mutex::new(Vec::new()),
        };

        let mut record = kerkstraat();
        let verdict = engine.check(&mut record, &confirmer).await;
        let reason = match verdict {
            Verdict::Undecided { reason } => reason,
            other => panic!("expected an undecided verdict, got {other:?}"),
        };

        let questions = confirmer.questions.lock().unwrap();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains(&record.block(engine.home()).to_string()));
        assert!(questions[0].contains(&format!("Reason: {reason}")));
        assert!(reason.contains("none of 5 strategies"));
    }

    /// Confirmer that must never be asked.
    struct Unreachable;

    impl Confirmer for Unreachable {
        fn confirm(&self, question: &str, _default: Option<bool>) -> bool {
            panic!("unexpected question: {question}");
        }
    }

    #[tokio::test]
    async fn test_settled_records_are_not_asked_about() {
        let register = FakeRegister::new(|_| {
            found(1, vec![candidate("Kerkstraat", "12", "1234 AB", "Amsterdam")])
        });
        let engine = reconciler(register, FakeGeocoder::new(None));

        let mut record = kerkstraat();
        let verdict = engine.check(&mut record, &Unreachable).await;
        assert_matches!(verdict, Verdict::Confirmed { .. });

        record.address = String::new();
        let verdict = engine.check(&mut record, &Unreachable).await;
        assert_matches!(verdict, Verdict::Rejected(RejectReason::RemovedAddress));
    }
}
