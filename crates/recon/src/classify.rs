//! Priority-ordered correction patterns over a single cluster.
//!
//! Priority (most specific first):
//! 1. BULK_MINT     one outgoing, several dust incoming
//! 2. MINT_BUY      outgoing plus a single dust incoming
//! 3. SELF_TRANSFER one outgoing, one incoming, amounts equal within tolerance
//! 4. GAS_FEE       small outgoing with nothing incoming
//! 5. SALE          non-dust incoming with nothing outgoing
//!
//! The first pattern whose precondition holds wins.

use rust_decimal::Decimal;

use crate::config::PatternConfig;
use crate::link::verification_link;
use crate::model::{
    Cluster, Correction, CorrectionAction, CorrectionSuggestion, Direction, Origin, PatternKind,
    Quantity, Severity, TaxImpact, TradeLeg, TransactionRecord,
};

pub const TAG_INSCRIPTION_ID: &str = "inscription_id";
pub const TAG_RUNE_NAME: &str = "rune_name";
pub const TAG_ASSET_TYPE: &str = "asset_type";

const IGNORE_WARNING: &str = "Do not delete: mark as ignored to keep the audit trail";

/// Shape of a cluster, computed once and shared by every rule.
struct ClusterFeatures<'a> {
    outgoing: Vec<&'a TransactionRecord>,
    incoming: Vec<&'a TransactionRecord>,
    all_incoming_dust: bool,
    first_incoming_dust: bool,
    first_outgoing_small: bool,
    symmetric_pair: bool,
}

impl<'a> ClusterFeatures<'a> {
    fn summarize(cluster: &'a Cluster, config: &PatternConfig) -> Self {
        let outgoing: Vec<&TransactionRecord> = cluster
            .records
            .iter()
            .filter(|r| r.direction() == Direction::Outgoing)
            .collect();
        let incoming: Vec<&TransactionRecord> = cluster
            .records
            .iter()
            .filter(|r| r.direction() == Direction::Incoming)
            .collect();

        let all_incoming_dust = incoming.iter().all(|r| is_dust(r.amount, config));
        let first_incoming_dust = incoming.first().is_some_and(|r| is_dust(r.amount, config));
        let first_outgoing_small = outgoing
            .first()
            .is_some_and(|r| r.amount.abs() < config.gas_fee_ceiling);
        let symmetric_pair = match (outgoing.as_slice(), incoming.as_slice()) {
            ([out], [inc]) => out
                .amount
                .abs()
                .checked_sub(inc.amount)
                .is_some_and(|diff| diff.abs() < config.transfer_tolerance),
            _ => false,
        };

        Self {
            outgoing,
            incoming,
            all_incoming_dust,
            first_incoming_dust,
            first_outgoing_small,
            symmetric_pair,
        }
    }

    fn pattern(&self) -> Option<PatternKind> {
        match (self.outgoing.len(), self.incoming.len()) {
            (1, inc) if inc > 1 && self.all_incoming_dust => Some(PatternKind::BulkMint),
            (out, 1) if out >= 1 && self.all_incoming_dust => Some(PatternKind::MintBuy),
            (1, 1) if self.symmetric_pair => Some(PatternKind::SelfTransfer),
            (out, 0) if out >= 1 && self.first_outgoing_small => Some(PatternKind::GasFee),
            (0, inc) if inc >= 1 && !self.first_incoming_dust => Some(PatternKind::Sale),
            _ => None,
        }
    }
}

/// `|amount| ≤ dust_ceiling`.
pub fn is_dust(amount: Decimal, config: &PatternConfig) -> bool {
    amount.abs() <= config.dust_ceiling
}

/// Classify one cluster. `None` when no pattern applies.
///
/// `_own_addresses` is accepted for callers that track wallets, but no rule
/// consults it: SELF_TRANSFER relies on amount symmetry alone, and a large
/// incoming record from an owned wallet with no outgoing side still reads as
/// SALE.
pub fn classify(
    cluster: &Cluster,
    _own_addresses: &[String],
    config: &PatternConfig,
) -> Option<CorrectionSuggestion> {
    let features = ClusterFeatures::summarize(cluster, config);
    let pattern = features.pattern()?;

    log::debug!(
        "{pattern}: {} outgoing, {} incoming",
        features.outgoing.len(),
        features.incoming.len()
    );

    let suggestion = match pattern {
        PatternKind::BulkMint => bulk_mint(&features, config),
        PatternKind::MintBuy => mint_buy(&features, config),
        PatternKind::SelfTransfer => self_transfer(&features),
        PatternKind::GasFee => gas_fee(&features),
        PatternKind::Sale => sale(&features, config),
    };

    Some(CorrectionSuggestion {
        records: cluster.records.clone(),
        ..suggestion
    })
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn suggestion(
    pattern: PatternKind,
    confidence: f64,
    severity: Severity,
    tax_impact: TaxImpact,
    corrections: Vec<Correction>,
) -> CorrectionSuggestion {
    CorrectionSuggestion {
        pattern,
        confidence,
        severity,
        tax_impact,
        records: Vec::new(),
        corrections,
    }
}

fn ignore(record: &TransactionRecord, reason: String) -> Correction {
    Correction {
        action: CorrectionAction::Ignore {
            warning: IGNORE_WARNING.into(),
        },
        records: vec![record.clone()],
        reason,
    }
}

/// Outgoing base-asset spend traded for `count` non-fungible units.
fn mint_trade(
    outgoing: &TransactionRecord,
    count: usize,
    link_source: &TransactionRecord,
    config: &PatternConfig,
) -> Correction {
    Correction {
        action: CorrectionAction::ChangeToTrade {
            sent: TradeLeg {
                asset: outgoing.asset.clone(),
                quantity: Quantity::Amount(outgoing.amount.abs()),
            },
            received: TradeLeg {
                asset: config.nft_placeholder.clone(),
                quantity: Quantity::Count(count),
            },
            verification_link: verification_link(&link_source.identifier, config),
            requires_user_input: false,
        },
        records: vec![outgoing.clone()],
        reason: "Mint cost establishes the cost basis of the received asset".into(),
    }
}

fn bulk_mint(f: &ClusterFeatures<'_>, config: &PatternConfig) -> CorrectionSuggestion {
    let count = f.incoming.len();
    let mut corrections: Vec<Correction> = f
        .incoming
        .iter()
        .enumerate()
        .map(|(i, r)| ignore(r, format!("Dust wrapper {}/{count} for bulk mint, not income", i + 1)))
        .collect();

    let link_source = f
        .incoming
        .iter()
        .find(|r| r.origin == Origin::Observed)
        .unwrap_or(&f.incoming[0]);
    corrections.push(mint_trade(f.outgoing[0], count, link_source, config));

    suggestion(
        PatternKind::BulkMint,
        0.95,
        Severity::High,
        TaxImpact::EstablishesCostBasis,
        corrections,
    )
}

fn mint_buy(f: &ClusterFeatures<'_>, config: &PatternConfig) -> CorrectionSuggestion {
    let wrapper = f.incoming[0];
    let corrections = vec![
        ignore(
            wrapper,
            "Dust wrapper for a non-fungible asset, not taxable income".into(),
        ),
        mint_trade(f.outgoing[0], 1, wrapper, config),
    ];

    suggestion(
        PatternKind::MintBuy,
        0.9,
        Severity::High,
        TaxImpact::EstablishesCostBasis,
        corrections,
    )
}

fn self_transfer(f: &ClusterFeatures<'_>) -> CorrectionSuggestion {
    let merge = Correction {
        action: CorrectionAction::MergeAsTransfer,
        records: vec![f.outgoing[0].clone(), f.incoming[0].clone()],
        reason: "Movement between own holdings, not a disposal or acquisition".into(),
    };

    suggestion(
        PatternKind::SelfTransfer,
        0.85,
        Severity::Medium,
        TaxImpact::NonTaxable,
        vec![merge],
    )
}

fn gas_fee(f: &ClusterFeatures<'_>) -> CorrectionSuggestion {
    let fee = Correction {
        action: CorrectionAction::ChangeToFee,
        records: vec![f.outgoing[0].clone()],
        reason: "Network cost without asset acquisition, deductible expense".into(),
    };

    suggestion(
        PatternKind::GasFee,
        0.8,
        Severity::Low,
        TaxImpact::TaxDeductible,
        vec![fee],
    )
}

fn sale(f: &ClusterFeatures<'_>, config: &PatternConfig) -> CorrectionSuggestion {
    let proceeds = f.incoming[0];
    let trade = Correction {
        action: CorrectionAction::ChangeToTrade {
            sent: TradeLeg {
                asset: sold_asset_label(proceeds, config),
                quantity: Quantity::UserInput,
            },
            received: TradeLeg {
                asset: proceeds.asset.clone(),
                quantity: Quantity::Amount(proceeds.amount),
            },
            verification_link: verification_link(&proceeds.identifier, config),
            requires_user_input: true,
        },
        records: vec![proceeds.clone()],
        reason: "Proceeds from selling a non-fungible asset, taxable event".into(),
    };

    suggestion(
        PatternKind::Sale,
        0.7,
        Severity::High,
        TaxImpact::TaxableIncome,
        vec![trade],
    )
}

/// Best available name for what was sold, from the record's protocol tags.
fn sold_asset_label(record: &TransactionRecord, config: &PatternConfig) -> String {
    if let Some(inscription) = record.tag(TAG_INSCRIPTION_ID) {
        let short: String = inscription.chars().take(16).collect();
        return format!("Ordinal {short}...");
    }
    if let Some(rune) = record.tag(TAG_RUNE_NAME) {
        return rune.to_string();
    }
    match record.tag(TAG_ASSET_TYPE) {
        Some("ORDINAL") => "Ordinal (check transaction details)".into(),
        Some("RUNE") => "Rune (check transaction details)".into(),
        _ => format!("{} (specify which asset was sold)", config.nft_placeholder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClusterKey;
    use chrono::{DateTime, Utc};

    const HASH: &str = "4f6b1e9c0d2a3b5c7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9012a3b4c5d6";

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-04-10T08:15:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn out(amount: &str) -> TransactionRecord {
        TransactionRecord::new(Origin::Ledger, at(), "BTC", dec(amount), "Withdrawal")
    }

    fn inc(amount: &str) -> TransactionRecord {
        TransactionRecord::new(Origin::Observed, at(), "BTC", dec(amount), "Deposit")
    }

    fn cluster(records: Vec<TransactionRecord>) -> Cluster {
        Cluster {
            key: ClusterKey::LedgerMinute(at()),
            records,
        }
    }

    fn run(records: Vec<TransactionRecord>) -> Option<CorrectionSuggestion> {
        classify(&cluster(records), &[], &PatternConfig::default())
    }

    fn actions(s: &CorrectionSuggestion) -> Vec<&'static str> {
        s.corrections.iter().map(|c| c.action.label()).collect()
    }

    #[test]
    fn dust_boundary() {
        let config = PatternConfig::default();
        assert!(is_dust(dec("0.00001"), &config));
        assert!(is_dust(dec("-0.00001"), &config));
        assert!(!is_dust(dec("0.0000101"), &config));
    }

    #[test]
    fn bulk_mint_beats_mint_buy() {
        let s = run(vec![
            out("-0.01"),
            inc("0.00000546").with_identifier(HASH),
            inc("0.00000546"),
            inc("0.00000546"),
        ])
        .unwrap();
        assert_eq!(s.pattern, PatternKind::BulkMint);
        assert_eq!(s.severity, Severity::High);
        assert_eq!(s.confidence, 0.95);
        assert_eq!(s.tax_impact, TaxImpact::EstablishesCostBasis);
        assert_eq!(s.records.len(), 4);
        assert_eq!(actions(&s), vec!["IGNORE", "IGNORE", "IGNORE", "CHANGE_TO_TRADE"]);

        match &s.corrections[3].action {
            CorrectionAction::ChangeToTrade { sent, received, verification_link, .. } => {
                assert_eq!(sent.asset, "BTC");
                assert_eq!(sent.quantity, Quantity::Amount(dec("0.01")));
                assert_eq!(received.asset, "ORDINAL/RUNE");
                assert_eq!(received.quantity, Quantity::Count(3));
                assert_eq!(
                    verification_link.as_deref(),
                    Some(format!("https://ordiscan.com/tx/{HASH}").as_str())
                );
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn bulk_mint_links_observed_incoming() {
        let ledger_dust = TransactionRecord::new(Origin::Ledger, at(), "BTC", dec("0.00000546"), "Deposit")
            .with_identifier("XVERSE_1");
        let s = run(vec![out("-0.02"), ledger_dust, inc("0.00000330").with_identifier(HASH)]).unwrap();
        assert_eq!(s.pattern, PatternKind::BulkMint);
        match &s.corrections[2].action {
            CorrectionAction::ChangeToTrade { verification_link, .. } => {
                assert!(verification_link.as_deref().unwrap().ends_with(HASH));
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn mint_buy() {
        let s = run(vec![out("-0.003"), inc("0.00000546").with_identifier("CEX_42")]).unwrap();
        assert_eq!(s.pattern, PatternKind::MintBuy);
        assert_eq!(s.confidence, 0.9);
        assert_eq!(actions(&s), vec!["IGNORE", "CHANGE_TO_TRADE"]);
        match &s.corrections[1].action {
            CorrectionAction::ChangeToTrade { received, verification_link, requires_user_input, .. } => {
                assert_eq!(received.quantity, Quantity::Count(1));
                assert!(verification_link.is_none());
                assert!(!*requires_user_input);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn mint_buy_with_several_outgoing_uses_first() {
        let s = run(vec![out("-0.004"), out("-0.0002"), inc("0.00000546")]).unwrap();
        assert_eq!(s.pattern, PatternKind::MintBuy);
        assert_eq!(s.corrections[1].records[0].amount, dec("-0.004"));
    }

    #[test]
    fn self_transfer() {
        let s = run(vec![out("-0.05"), inc("0.04991")]).unwrap();
        assert_eq!(s.pattern, PatternKind::SelfTransfer);
        assert_eq!(s.severity, Severity::Medium);
        assert_eq!(s.tax_impact, TaxImpact::NonTaxable);
        assert_eq!(actions(&s), vec!["MERGE_AS_TRANSFER"]);
        assert_eq!(s.corrections[0].records.len(), 2);
    }

    #[test]
    fn self_transfer_tolerance_is_strict() {
        // Difference of exactly 0.0001 is not within tolerance; nothing else applies
        assert!(run(vec![out("-0.05"), inc("0.0499")]).is_none());
    }

    #[test]
    fn gas_fee() {
        let s = run(vec![out("-0.0001")]).unwrap();
        assert_eq!(s.pattern, PatternKind::GasFee);
        assert_eq!(s.severity, Severity::Low);
        assert_eq!(s.tax_impact, TaxImpact::TaxDeductible);
        assert_eq!(actions(&s), vec!["CHANGE_TO_FEE"]);
    }

    #[test]
    fn large_lone_outgoing_is_not_gas() {
        assert!(run(vec![out("-0.0005")]).is_none());
    }

    #[test]
    fn sale_uses_inscription_tag() {
        let proceeds = inc("0.25")
            .with_identifier(HASH)
            .with_tag(TAG_INSCRIPTION_ID, "abcdef0123456789abcdef0123456789i0")
            .with_tag(TAG_RUNE_NAME, "IGNORED•RUNE");
        let s = run(vec![proceeds]).unwrap();
        assert_eq!(s.pattern, PatternKind::Sale);
        assert_eq!(s.confidence, 0.7);
        assert_eq!(s.tax_impact, TaxImpact::TaxableIncome);
        match &s.corrections[0].action {
            CorrectionAction::ChangeToTrade { sent, received, verification_link, requires_user_input } => {
                assert_eq!(sent.asset, "Ordinal abcdef0123456789...");
                assert_eq!(sent.quantity, Quantity::UserInput);
                assert_eq!(received.asset, "BTC");
                assert_eq!(received.quantity, Quantity::Amount(dec("0.25")));
                assert!(verification_link.is_some());
                assert!(*requires_user_input);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn sale_label_fallbacks() {
        let config = PatternConfig::default();
        let rune = inc("0.1").with_tag(TAG_RUNE_NAME, "DOG•GO•TO•THE•MOON");
        assert_eq!(sold_asset_label(&rune, &config), "DOG•GO•TO•THE•MOON");

        let typed = inc("0.1").with_tag(TAG_ASSET_TYPE, "RUNE");
        assert_eq!(sold_asset_label(&typed, &config), "Rune (check transaction details)");

        let ordinal = inc("0.1").with_tag(TAG_ASSET_TYPE, "ORDINAL").with_tag(TAG_RUNE_NAME, "");
        assert_eq!(sold_asset_label(&ordinal, &config), "Ordinal (check transaction details)");

        let bare = inc("0.1");
        assert_eq!(
            sold_asset_label(&bare, &config),
            "ORDINAL/RUNE (specify which asset was sold)"
        );
    }

    #[test]
    fn dust_only_incoming_is_not_sale() {
        assert!(run(vec![inc("0.00000546")]).is_none());
    }

    #[test]
    fn bulk_mint_with_non_dust_incoming_yields_nothing() {
        assert!(run(vec![out("-0.01"), inc("0.00000546"), inc("0.5")]).is_none());
    }

    #[test]
    fn oversized_pair_is_not_symmetric() {
        let huge = dec("-50000000000000000000000000000");
        let send = TransactionRecord::new(Origin::Ledger, at(), "SHIB", huge, "Withdrawal");
        let receive = TransactionRecord::new(Origin::Observed, at(), "SHIB", huge, "Receive");
        assert!(run(vec![send, receive]).is_none());

        let max_send = TransactionRecord::new(Origin::Ledger, at(), "SHIB", Decimal::MIN, "Withdrawal");
        let max_receive = TransactionRecord::new(Origin::Observed, at(), "SHIB", Decimal::MAX, "Receive");
        let s = run(vec![max_send, max_receive]).unwrap();
        assert_eq!(s.pattern, PatternKind::SelfTransfer);
    }

    #[test]
    fn sale_ignores_own_addresses() {
        // Known limitation: an owned-wallet deposit without its outgoing leg still reads as SALE.
        let own = vec!["bc1pownedwallet".to_string()];
        let proceeds = inc("1.5").with_tag("from_address", "bc1pownedwallet");
        let s = classify(&cluster(vec![proceeds]), &own, &PatternConfig::default()).unwrap();
        assert_eq!(s.pattern, PatternKind::Sale);
    }

    #[test]
    fn labels_match_exactly() {
        let lowercase = TransactionRecord::new(Origin::Ledger, at(), "BTC", dec("-0.0001"), "withdrawal");
        assert!(run(vec![lowercase]).is_none());

        let send = TransactionRecord::new(Origin::Ledger, at(), "BTC", dec("-0.0001"), "Send");
        assert_eq!(run(vec![send]).unwrap().pattern, PatternKind::GasFee);
    }

    #[test]
    fn other_activity_types_ignored() {
        let buy = TransactionRecord::new(Origin::Ledger, at(), "BTC", dec("0.5"), "Buy");
        assert!(run(vec![buy]).is_none());
        assert!(run(vec![]).is_none());
    }
}
