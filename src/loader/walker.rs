//! Per-record extraction with fallback
//!
//! The primary element list runs first. If any element fails, or the list
//! yields fewer than [`MIN_TRIPLES`], the fallback list runs from scratch.
//! Nothing from a failed attempt carries over.

use super::element::{ElementError, Extraction, ExtractionElement, ExtractionTriple};
use super::observer::{ElementSet, SkipReason};
use super::variable::Combination;
use crate::source::Record;

/// Fewest triples an instance may carry.
pub const MIN_TRIPLES: usize = 2;

/// What became of one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordOutcome {
    Accepted {
        set: ElementSet,
        triples: Vec<ExtractionTriple>,
    },
    Skipped(SkipReason),
}

/// Run one element list against a record into a fresh triple-set.
fn run_set<R: Record>(
    elements: &[ExtractionElement],
    set: ElementSet,
    record: &R,
    combination: &Combination,
) -> Result<Result<Vec<ExtractionTriple>, SkipReason>, ElementError> {
    let mut triples = Vec::new();
    for element in elements {
        match element.extract(record, combination)? {
            Extraction::Contributed(mut contributed) => triples.append(&mut contributed),
            Extraction::Failed(failure) => {
                return Ok(Err(SkipReason::ElementFailed {
                    set,
                    detail: failure.to_string(),
                }))
            }
        }
    }
    if triples.len() < MIN_TRIPLES {
        return Ok(Err(SkipReason::TooFewTriples {
            set,
            count: triples.len(),
        }));
    }
    Ok(Ok(triples))
}

/// Primary list, then fallback list, for a single record.
pub(crate) fn walk_record<R: Record>(
    primary: &[ExtractionElement],
    fallback: &[ExtractionElement],
    record: &R,
    combination: &Combination,
) -> Result<RecordOutcome, ElementError> {
    let primary_reason = match run_set(primary, ElementSet::Primary, record, combination)? {
        Ok(triples) => {
            return Ok(RecordOutcome::Accepted {
                set: ElementSet::Primary,
                triples,
            })
        }
        Err(reason) => reason,
    };

    if fallback.is_empty() {
        return Ok(RecordOutcome::Skipped(primary_reason));
    }

    Ok(match run_set(fallback, ElementSet::Fallback, record, combination)? {
        Ok(triples) => RecordOutcome::Accepted {
            set: ElementSet::Fallback,
            triples,
        },
        Err(reason) => RecordOutcome::Skipped(reason),
    })
}
