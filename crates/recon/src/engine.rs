use crate::anomaly::detect_anomalies;
use crate::classify::classify;
use crate::cluster::build_clusters;
use crate::config::ReconConfig;
use crate::matcher::match_records;
use crate::model::{CorrectionReport, ReconInput, ReconMeta, ReconReport, TransactionRecord};
use crate::summary::compute_summary;

/// Run matching, pattern detection and the anomaly scan over one input.
pub fn run(config: &ReconConfig, input: &ReconInput) -> ReconReport {
    let matching = match_records(&input.ledger, &input.observed, &config.matching);
    let corrections =
        detect_corrections(&input.ledger, &input.observed, &config.own_addresses, config);

    let combined: Vec<TransactionRecord> =
        input.ledger.iter().chain(&input.observed).cloned().collect();
    let anomalies = detect_anomalies(&combined, config.reporting_year, &config.anomaly);

    log::info!(
        "'{}': {} matched, {} conflicts, {} missing from ledger, {} suggestions, {} anomalies",
        config.name,
        matching.matched.len(),
        matching.conflicts.len(),
        matching.missing_from_ledger.len(),
        corrections.summary.total,
        anomalies.len()
    );

    ReconReport {
        meta: ReconMeta {
            config_name: config.name.clone(),
            reporting_year: config.reporting_year,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            ledger_records: input.ledger.len(),
            observed_records: input.observed.len(),
        },
        matching,
        corrections,
        anomalies,
    }
}

/// Cluster both sources and classify each cluster. Clusters matching no
/// pattern produce nothing.
pub fn detect_corrections(
    ledger: &[TransactionRecord],
    observed: &[TransactionRecord],
    own_addresses: &[String],
    config: &ReconConfig,
) -> CorrectionReport {
    let clusters = build_clusters(ledger, observed, &config.clustering);
    let suggestions: Vec<_> = clusters
        .iter()
        .filter_map(|cluster| classify(cluster, own_addresses, &config.patterns))
        .collect();
    log::debug!(
        "{} of {} clusters produced a suggestion",
        suggestions.len(),
        clusters.len()
    );
    let summary = compute_summary(&suggestions);
    CorrectionReport { suggestions, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Origin, PatternKind};
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn run_fills_meta() {
        let config = ReconConfig::new("meta test", 2025);
        let input = ReconInput {
            ledger: vec![TransactionRecord::new(
                Origin::Ledger,
                ts("2025-04-01T09:00:00Z"),
                "BTC",
                dec("0.5"),
                "Deposit",
            )],
            observed: vec![TransactionRecord::new(
                Origin::Observed,
                ts("2025-04-01T09:01:00Z"),
                "BTC",
                dec("0.5"),
                "Receive",
            )],
        };

        let report = run(&config, &input);
        assert_eq!(report.meta.config_name, "meta test");
        assert_eq!(report.meta.reporting_year, 2025);
        assert_eq!(report.meta.ledger_records, 1);
        assert_eq!(report.meta.observed_records, 1);
        assert_eq!(report.meta.engine_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(report.matching.matched.len(), 1);
        assert!(report.anomalies.is_empty());
        // Two large incoming records with no outgoing side read as a sale.
        assert_eq!(report.corrections.summary.total, 1);
        assert!(report.has_findings());
    }

    #[test]
    fn run_on_empty_input() {
        let report = run(&ReconConfig::new("empty", 2025), &ReconInput::default());
        assert!(report.matching.matched.is_empty());
        assert_eq!(report.corrections.summary.total, 0);
        assert!(!report.has_findings());
    }

    #[test]
    fn detect_corrections_summarizes() {
        let config = ReconConfig::new("fees", 2025);
        let observed = vec![TransactionRecord::new(
            Origin::Observed,
            ts("2025-04-01T09:00:00Z"),
            "BTC",
            dec("-0.0002"),
            "Send",
        )
        .with_identifier("feetx")];

        let report = detect_corrections(&[], &observed, &[], &config);
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].pattern, PatternKind::GasFee);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.by_pattern.get("GAS_FEE"), Some(&1));
    }

    #[test]
    fn detect_corrections_survives_oversized_amounts() {
        let config = ReconConfig::new("shib", 2025);
        let huge = dec("-50000000000000000000000000000");
        let ledger = vec![TransactionRecord::new(
            Origin::Ledger,
            ts("2025-04-01T09:00:00Z"),
            "SHIB",
            huge,
            "Withdrawal",
        )];
        let observed = vec![TransactionRecord::new(
            Origin::Observed,
            ts("2025-04-01T09:00:00Z"),
            "SHIB",
            huge,
            "Receive",
        )];

        let report = detect_corrections(&ledger, &observed, &[], &config);
        assert!(report.suggestions.is_empty());
        assert_eq!(report.summary.total, 0);
    }

    #[test]
    fn anomalies_scan_both_sources() {
        let config = ReconConfig::new("dups", 2025);
        let input = ReconInput {
            ledger: vec![TransactionRecord::new(
                Origin::Ledger,
                ts("2024-12-31T23:00:00Z"),
                "BTC",
                dec("1"),
                "Deposit",
            )
            .with_identifier("same")],
            observed: vec![TransactionRecord::new(
                Origin::Observed,
                ts("2025-01-01T00:00:00Z"),
                "BTC",
                dec("1"),
                "Receive",
            )
            .with_identifier("same")],
        };
        let report = run(&config, &input);
        assert_eq!(report.anomalies.len(), 2);
        assert!(report.has_findings());
    }
}
