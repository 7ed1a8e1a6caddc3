use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::MatchConfig;
use crate::model::{Conflict, ConflictReason, Match, MatchOutput, MatchTier, TransactionRecord};

/// Deviation of 1% scores zero; the penalty is linear below that.
const SCORE_PENALTY: Decimal = Decimal::ONE_HUNDRED;

/// Pair ledger records against observed records, ledger order first.
///
/// Tier 1 claims the first unconsumed observed record with an identical
/// non-empty identifier. Tier 2 scores unconsumed observed records inside the
/// time window by relative amount deviation. Ledger records left over are
/// conflicts; observed records left over are missing from the ledger.
pub fn match_records(
    ledger: &[TransactionRecord],
    observed: &[TransactionRecord],
    config: &MatchConfig,
) -> MatchOutput {
    let mut observed_used = vec![false; observed.len()];
    let mut matched = Vec::new();
    let mut conflicts = Vec::new();

    for record in ledger {
        if let Some(oi) = find_exact_id(record, observed, &observed_used) {
            log::debug!("exact id match on '{}'", record.identifier);
            observed_used[oi] = true;
            matched.push(Match {
                ledger: record.clone(),
                observed: observed[oi].clone(),
                confidence: 1.0,
                tier: MatchTier::ExactId,
            });
            continue;
        }

        match find_fuzzy(record, observed, &observed_used, config) {
            Some((oi, score)) => {
                log::debug!(
                    "fuzzy match {} {} at {} (score {score})",
                    record.amount,
                    record.asset,
                    record.timestamp
                );
                observed_used[oi] = true;
                matched.push(Match {
                    ledger: record.clone(),
                    observed: observed[oi].clone(),
                    confidence: score.to_f64().unwrap_or(0.0),
                    tier: MatchTier::FuzzyTimeAmount,
                });
            }
            None => conflicts.push(Conflict {
                record: record.clone(),
                reason: ConflictReason::MissingInObserved,
            }),
        }
    }

    let missing_from_ledger: Vec<TransactionRecord> = observed
        .iter()
        .enumerate()
        .filter(|(i, _)| !observed_used[*i])
        .map(|(_, r)| r.clone())
        .collect();

    MatchOutput {
        matched,
        conflicts,
        missing_from_ledger,
    }
}

fn find_exact_id(
    record: &TransactionRecord,
    observed: &[TransactionRecord],
    observed_used: &[bool],
) -> Option<usize> {
    if !record.has_identifier() {
        return None;
    }
    observed
        .iter()
        .enumerate()
        .find(|(i, o)| !observed_used[*i] && o.identifier == record.identifier)
        .map(|(i, _)| i)
}

/// Best eligible candidate and its score, if the score clears the bar.
fn find_fuzzy(
    record: &TransactionRecord,
    observed: &[TransactionRecord],
    observed_used: &[bool],
    config: &MatchConfig,
) -> Option<(usize, Decimal)> {
    // Relative deviation is undefined for a zero amount.
    if record.amount.is_zero() {
        return None;
    }

    let window = Duration::minutes(config.time_window_minutes);
    let base = record.amount.abs();
    let mut best: Option<(usize, Decimal)> = None;

    for (oi, candidate) in observed.iter().enumerate() {
        if observed_used[oi] {
            continue;
        }
        let gap = candidate.timestamp - record.timestamp;
        if gap > window || gap < -window {
            continue;
        }

        // Unrepresentable deviation means the amounts are nowhere near each other.
        let Some(deviation) = record
            .amount
            .checked_sub(candidate.amount)
            .and_then(|diff| diff.abs().checked_div(base))
        else {
            continue;
        };
        if deviation > config.max_deviation {
            continue;
        }

        let score = Decimal::ONE - deviation * SCORE_PENALTY;
        // Strictly greater: ties keep the earlier observed record.
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((oi, score));
        }
    }

    best.filter(|(_, score)| *score >= config.min_confidence)
}
