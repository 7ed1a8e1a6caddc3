use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Calendar year the tax record covers. Records outside it are flagged.
    pub reporting_year: i32,
    /// Addresses the user controls. Carried to the classifier; no canonical
    /// rule requires them.
    #[serde(default)]
    pub own_addresses: Vec<String>,
    #[serde(default)]
    pub sources: Option<SourcesConfig>,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub clustering: ClusterConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

impl ReconConfig {
    /// Config with every threshold at its default.
    pub fn new(name: impl Into<String>, reporting_year: i32) -> Self {
        Self {
            name: name.into(),
            reporting_year,
            own_addresses: Vec::new(),
            sources: None,
            matching: MatchConfig::default(),
            clustering: ClusterConfig::default(),
            patterns: PatternConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Files holding already-normalized records, resolved relative to the config.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub ledger: SourceConfig,
    pub observed: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default)]
    pub format: Option<RecordFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    Csv,
    Json,
}

impl SourceConfig {
    /// Explicit format, else inferred from the file extension. CSV by default.
    pub fn resolved_format(&self) -> RecordFormat {
        if let Some(format) = self.format {
            return format;
        }
        match Path::new(&self.file).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RecordFormat::Json,
            _ => RecordFormat::Csv,
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Fuzzy candidates must lie within this many minutes either side.
    pub time_window_minutes: i64,
    /// Largest relative amount deviation still eligible (0.001 = 0.1%).
    pub max_deviation: Decimal,
    /// Best fuzzy score must reach this to be accepted.
    pub min_confidence: Decimal,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: 30,
            max_deviation: Decimal::new(1, 3),
            min_confidence: Decimal::new(9, 1),
        }
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Observed records within this many minutes of a ledger minute attach to it.
    pub ledger_window_minutes: i64,
    /// Bucket width for unattached observed records without identifier.
    pub fallback_bucket_minutes: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ledger_window_minutes: 2,
            fallback_bucket_minutes: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Inclusive ceiling for a negligible-value wrapper output.
    pub dust_ceiling: Decimal,
    /// Lone outgoing amounts strictly below this read as network fees.
    pub gas_fee_ceiling: Decimal,
    /// Out/in amounts closer than this read as a move between own holdings.
    pub transfer_tolerance: Decimal,
    /// Asset label for the non-fungible side of a mint.
    pub nft_placeholder: String,
    /// Prefix a verified identifier is appended to.
    pub explorer_url: String,
    /// Identifier prefixes manufactured by ingestion, never linkable.
    pub synthetic_prefixes: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            dust_ceiling: Decimal::new(1, 5),
            gas_fee_ceiling: Decimal::new(5, 4),
            transfer_tolerance: Decimal::new(1, 4),
            nft_placeholder: "ORDINAL/RUNE".into(),
            explorer_url: "https://ordiscan.com/tx/".into(),
            synthetic_prefixes: vec!["XVERSE_".into(), "CEX_".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Anomaly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// A fee above this fraction of |amount| is flagged.
    pub fee_ratio: Decimal,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            fee_ratio: Decimal::new(1, 1),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !(1970..=9999).contains(&self.reporting_year) {
            return Err(ReconError::ConfigValidation(format!(
                "reporting_year must be between 1970 and 9999, got {}",
                self.reporting_year
            )));
        }

        if let Some(ref sources) = self.sources {
            for (slot, source) in [("ledger", &sources.ledger), ("observed", &sources.observed)] {
                if source.file.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "sources.{slot}.file must not be empty"
                    )));
                }
            }
        }

        let m = &self.matching;
        if m.time_window_minutes <= 0 {
            return Err(ReconError::ConfigValidation(format!(
                "matching.time_window_minutes must be positive, got {}",
                m.time_window_minutes
            )));
        }
        if m.max_deviation <= Decimal::ZERO || m.max_deviation >= Decimal::ONE {
            return Err(ReconError::ConfigValidation(format!(
                "matching.max_deviation must be in (0, 1), got {}",
                m.max_deviation
            )));
        }
        if m.min_confidence < Decimal::ZERO || m.min_confidence > Decimal::ONE {
            return Err(ReconError::ConfigValidation(format!(
                "matching.min_confidence must be in [0, 1], got {}",
                m.min_confidence
            )));
        }

        let c = &self.clustering;
        if c.ledger_window_minutes <= 0 || c.fallback_bucket_minutes <= 0 {
            return Err(ReconError::ConfigValidation(format!(
                "clustering windows must be positive, got ledger_window_minutes={} fallback_bucket_minutes={}",
                c.ledger_window_minutes, c.fallback_bucket_minutes
            )));
        }

        let p = &self.patterns;
        for (field, value) in [
            ("dust_ceiling", p.dust_ceiling),
            ("gas_fee_ceiling", p.gas_fee_ceiling),
            ("transfer_tolerance", p.transfer_tolerance),
        ] {
            if value.is_sign_negative() {
                return Err(ReconError::ConfigValidation(format!(
                    "patterns.{field} must not be negative, got {value}"
                )));
            }
        }
        if p.nft_placeholder.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "patterns.nft_placeholder must not be empty".into(),
            ));
        }

        if self.anomaly.fee_ratio.is_sign_negative() {
            return Err(ReconError::ConfigValidation(format!(
                "anomaly.fee_ratio must not be negative, got {}",
                self.anomaly.fee_ratio
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
