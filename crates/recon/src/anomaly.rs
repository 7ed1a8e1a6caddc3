//! Stateless red-flag scan over the combined record set.

use std::collections::HashMap;

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::config::AnomalyConfig;
use crate::model::{AnomalyKind, Finding, Severity, TransactionRecord};

/// Scan every record. Findings come grouped by kind (fees, duplicates,
/// out-of-range), each group in input order.
pub fn detect_anomalies(
    records: &[TransactionRecord],
    reporting_year: i32,
    config: &AnomalyConfig,
) -> Vec<Finding> {
    let mut findings = fee_anomalies(records, config.fee_ratio);
    findings.extend(duplicate_identifiers(records));
    findings.extend(out_of_range(records, reporting_year));
    findings
}

fn fee_anomalies(records: &[TransactionRecord], fee_ratio: Decimal) -> Vec<Finding> {
    records
        .iter()
        .filter(|r| !r.fee.is_zero() && !r.amount.is_zero())
        // A bound past Decimal::MAX cannot be exceeded.
        .filter(|r| fee_ratio.checked_mul(r.amount.abs()).is_some_and(|bound| r.fee > bound))
        .map(|r| Finding {
            kind: AnomalyKind::FeeAnomaly,
            severity: Severity::High,
            message: format!(
                "fee {} exceeds {}% of amount {} {}",
                r.fee,
                percent(fee_ratio),
                r.amount,
                r.asset
            ),
            identifier: r.identifier.clone(),
        })
        .collect()
}

fn percent(ratio: Decimal) -> String {
    match ratio.checked_mul(Decimal::ONE_HUNDRED) {
        Some(pct) => pct.normalize().to_string(),
        None => format!("{}x100", ratio.normalize()),
    }
}

/// One finding per identifier seen more than once, at its first occurrence.
fn duplicate_identifiers(records: &[TransactionRecord]) -> Vec<Finding> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records.iter().filter(|r| r.has_identifier()) {
        *counts.entry(r.identifier.as_str()).or_insert(0) += 1;
    }

    let mut findings = Vec::new();
    for r in records.iter().filter(|r| r.has_identifier()) {
        // Removing the entry reports each identifier once.
        if let Some(count) = counts.remove(r.identifier.as_str()) {
            if count > 1 {
                findings.push(Finding {
                    kind: AnomalyKind::DuplicateIdentifier,
                    severity: Severity::Critical,
                    message: format!("identifier appears on {count} records"),
                    identifier: r.identifier.clone(),
                });
            }
        }
    }
    findings
}

fn out_of_range(records: &[TransactionRecord], reporting_year: i32) -> Vec<Finding> {
    records
        .iter()
        .filter(|r| r.timestamp.year() != reporting_year)
        .map(|r| Finding {
            kind: AnomalyKind::OutOfRange,
            severity: Severity::Medium,
            message: format!(
                "record dated {} falls outside reporting year {reporting_year}",
                r.timestamp.year()
            ),
            identifier: r.identifier.clone(),
        })
        .collect()
}
