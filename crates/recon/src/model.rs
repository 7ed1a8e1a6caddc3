use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Activity labels that mean value left the tracked party.
pub const OUTGOING_LABELS: [&str; 2] = ["Withdrawal", "Send"];
/// Activity labels that mean value arrived at the tracked party.
pub const INCOMING_LABELS: [&str; 2] = ["Deposit", "Receive"];

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which side of the reconciliation produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Self-reported ledger / exchange export.
    Ledger,
    /// Independently observed on chain.
    Observed,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger => write!(f, "LEDGER"),
            Self::Observed => write!(f, "OBSERVED"),
        }
    }
}

/// Semantic direction of a free-form activity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    /// Buy, Sell, Transfer, or anything the classifier does not reason about.
    Other,
}

/// A single normalized transaction from either source.
///
/// Constructed once by ingestion and never mutated by the engine. The
/// timestamp is always UTC; sources without a zone are read as UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    /// Positive = received by the tracked party, negative = sent.
    pub amount: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    /// Opaque correlation id. Empty when the source had none.
    #[serde(default)]
    pub identifier: String,
    pub activity_type: String,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiat_price: Option<Decimal>,
    /// Protocol hints such as `asset_type`, `inscription_id`, `rune_name`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl TransactionRecord {
    pub fn new(
        origin: Origin,
        timestamp: DateTime<Utc>,
        asset: impl Into<String>,
        amount: Decimal,
        activity_type: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            asset: asset.into(),
            amount,
            fee: Decimal::ZERO,
            identifier: String::new(),
            activity_type: activity_type.into(),
            origin,
            fiat_price: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_fiat_price(mut self, price: Decimal) -> Self {
        self.fiat_price = Some(price);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Direction by exact label membership. `"deposit"` is not incoming.
    pub fn direction(&self) -> Direction {
        let label = self.activity_type.as_str();
        if OUTGOING_LABELS.contains(&label) {
            Direction::Outgoing
        } else if INCOMING_LABELS.contains(&label) {
            Direction::Incoming
        } else {
            Direction::Other
        }
    }

    pub fn has_identifier(&self) -> bool {
        !self.identifier.is_empty()
    }

    /// Tag lookup that treats an empty value as absent.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Pre-loaded records for one run, one collection per source.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub ledger: Vec<TransactionRecord>,
    pub observed: Vec<TransactionRecord>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    ExactId,
    FuzzyTimeAmount,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactId => write!(f, "EXACT_ID"),
            Self::FuzzyTimeAmount => write!(f, "FUZZY_TIME_AMOUNT"),
        }
    }
}

/// One ledger record and one observed record claimed to be the same event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub ledger: TransactionRecord,
    pub observed: TransactionRecord,
    pub confidence: f64,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    MissingInObserved,
}

/// A ledger record with no acceptable observed partner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub record: TransactionRecord,
    pub reason: ConflictReason,
}

/// Disjoint partition of both inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutput {
    pub matched: Vec<Match>,
    pub conflicts: Vec<Conflict>,
    /// Observed records that no ledger record claimed.
    pub missing_from_ledger: Vec<TransactionRecord>,
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// The structural key a cluster was grouped by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClusterKey {
    /// Ledger records sharing a truncated minute, plus nearby observed records.
    LedgerMinute(DateTime<Utc>),
    /// Unattached observed records sharing an identifier.
    Identifier(String),
    /// Unattached observed records without identifier, by coarse bucket index.
    TimeBucket(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub key: ClusterKey,
    pub records: Vec<TransactionRecord>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    BulkMint,
    MintBuy,
    SelfTransfer,
    GasFee,
    Sale,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkMint => write!(f, "BULK_MINT"),
            Self::MintBuy => write!(f, "MINT_BUY"),
            Self::SelfTransfer => write!(f, "SELF_TRANSFER"),
            Self::GasFee => write!(f, "GAS_FEE"),
            Self::Sale => write!(f, "SALE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxImpact {
    EstablishesCostBasis,
    NonTaxable,
    TaxDeductible,
    TaxableIncome,
}

/// How much of an asset one side of a trade carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Amount(Decimal),
    /// Whole units of a non-fungible placeholder.
    Count(usize),
    /// Unknown to the engine; the user has to fill it in.
    UserInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeLeg {
    pub asset: String,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionAction {
    /// Flag as ignored in the tax record. Never delete.
    Ignore { warning: String },
    ChangeToTrade {
        sent: TradeLeg,
        received: TradeLeg,
        #[serde(skip_serializing_if = "Option::is_none")]
        verification_link: Option<String>,
        requires_user_input: bool,
    },
    MergeAsTransfer,
    ChangeToFee,
}

impl CorrectionAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignore { .. } => "IGNORE",
            Self::ChangeToTrade { .. } => "CHANGE_TO_TRADE",
            Self::MergeAsTransfer => "MERGE_AS_TRANSFER",
            Self::ChangeToFee => "CHANGE_TO_FEE",
        }
    }
}

/// One step of a suggestion, applied to the listed records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    #[serde(flatten)]
    pub action: CorrectionAction,
    pub records: Vec<TransactionRecord>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionSuggestion {
    pub pattern: PatternKind,
    pub confidence: f64,
    pub severity: Severity,
    pub tax_impact: TaxImpact,
    pub records: Vec<TransactionRecord>,
    pub corrections: Vec<Correction>,
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    FeeAnomaly,
    DuplicateIdentifier,
    OutOfRange,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeeAnomaly => write!(f, "FEE_ANOMALY"),
            Self::DuplicateIdentifier => write!(f, "DUPLICATE_IDENTIFIER"),
            Self::OutOfRange => write!(f, "OUT_OF_RANGE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub identifier: String,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionSummary {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_pattern: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionReport {
    pub suggestions: Vec<CorrectionSuggestion>,
    pub summary: CorrectionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub reporting_year: i32,
    pub engine_version: String,
    pub run_at: String,
    pub ledger_records: usize,
    pub observed_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub matching: MatchOutput,
    pub corrections: CorrectionReport,
    pub anomalies: Vec<Finding>,
}

impl ReconReport {
    /// Anything a reviewer must look at: conflicts, unledgered observations,
    /// suggestions or anomalies.
    pub fn has_findings(&self) -> bool {
        !self.matching.conflicts.is_empty()
            || !self.matching.missing_from_ledger.is_empty()
            || self.corrections.summary.total > 0
            || !self.anomalies.is_empty()
    }
}
