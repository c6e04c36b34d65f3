//! Batch correction of a whole input list.

use std::fs;
use std::path::Path;

use indicatif::ProgressBar;
use tracing::info;

use crate::error::Result;
use crate::prompt::Confirmer;
use crate::reconcile::Reconciler;
use crate::types::{AddressRecord, HomeCountry, Strategy, Verdict};

/// File name of the rejected-records log.
pub const INVALID_LOG: &str = "invalid_entries.log";

/// File name of the changed-records log.
pub const CHANGED_LOG: &str = "changed_entries.log";

/// A name that is always printed as another name.
const RENAMES: &[((&str, &str), (&str, &str))] = &[(("Rico", "te Wechel"), ("Grote", "Smurf"))];

/// Rename a record listed in [`RENAMES`]. Returns whether it was renamed.
fn apply_renames(record: &mut AddressRecord) -> bool {
    for ((first, last), (new_first, new_last)) in RENAMES {
        if record.first_name == *first && record.last_name == *last {
            record.first_name = new_first.to_string();
            record.last_name = new_last.to_string();
            return true;
        }
    }
    false
}

/// A record rewritten by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRecord {
    /// Record as read from the input
    pub original: AddressRecord,
    /// Record as it will be printed
    pub changed: AddressRecord,
    /// Strategy that made the change
    pub strategy: Strategy,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Dropped records, as read from the input
    pub invalid: Vec<AddressRecord>,
    /// Records rewritten by a strategy, in input order
    pub changed: Vec<ChangedRecord>,
    /// Number of records kept without changes
    pub untouched: usize,
}

impl BatchReport {
    /// Text of the rejected-records log.
    pub fn invalid_log(&self, home: &HomeCountry) -> String {
        self.invalid
            .iter()
            .map(|record| record.block(home).to_string())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Text of the changed-records log.
    pub fn changed_log(&self, home: &HomeCountry) -> String {
        self.changed
            .iter()
            .map(|entry| {
                format!(
                    "ORIGINAL:\n{}\nCHANGED:\n{}\nREASON: {}",
                    entry.original.block(home),
                    entry.changed.block(home),
                    entry.strategy.tag()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n\n")
    }

    /// Write both audit logs into `dir`, replacing earlier ones.
    pub fn write_logs(&self, dir: &Path, home: &HomeCountry) -> Result<()> {
        fs::write(dir.join(INVALID_LOG), self.invalid_log(home))?;
        fs::write(dir.join(CHANGED_LOG), self.changed_log(home))?;
        Ok(())
    }
}

/// Runs every record through a [`Reconciler`], one at a time.
pub struct BatchCorrector<'a> {
    reconciler: &'a Reconciler,
    confirmer: &'a dyn Confirmer,
    progress: Option<ProgressBar>,
}

impl<'a> BatchCorrector<'a> {
    /// Create a corrector asking `confirmer` about undecided records.
    pub fn new(reconciler: &'a Reconciler, confirmer: &'a dyn Confirmer) -> Self {
        Self {
            reconciler,
            confirmer,
            progress: None,
        }
    }

    /// Advance `progress` once per record.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Correct `records` in place.
    ///
    /// Rejected records are removed; the rest keep their order.
    pub async fn run(&self, records: &mut Vec<AddressRecord>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut kept = Vec::with_capacity(records.len());

        if let Some(progress) = &self.progress {
            progress.set_length(records.len() as u64);
        }

        for mut record in records.drain(..) {
            let original = record.clone();
            apply_renames(&mut record);

            match self.reconciler.check(&mut record, self.confirmer).await {
                Verdict::Rejected(reason) => {
                    info!(name = %format!("{} {}", original.first_name, original.last_name), %reason, "dropping record");
                    report.invalid.push(original);
                }
                Verdict::Corrected { strategy, .. } => {
                    report.changed.push(ChangedRecord {
                        original,
                        changed: record.clone(),
                        strategy,
                    });
                    kept.push(record);
                }
                Verdict::Confirmed { .. } | Verdict::Undecided { .. } => {
                    report.untouched += 1;
                    kept.push(record);
                }
            }

            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        *records = kept;
        info!(
            invalid = report.invalid.len(),
            changed = report.changed.len(),
            untouched = report.untouched,
            "batch corrected"
        );
        report
    }
}
