//! Canonical record files: already-normalized CSV or JSON exports.
//!
//! This is not schema inference. Columns are fixed; rows that do not parse
//! are rejected with the row number so the engine only ever sees well-formed
//! records.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::{RecordFormat, SourceConfig, SourcesConfig};
use crate::error::ReconError;
use crate::model::{Origin, ReconInput, TransactionRecord};

const COL_TIMESTAMP: &str = "timestamp";
const COL_ASSET: &str = "asset";
const COL_AMOUNT: &str = "amount";
const COL_FEE: &str = "fee";
const COL_IDENTIFIER: &str = "identifier";
const COL_ACTIVITY: &str = "activity_type";
const COL_FIAT_PRICE: &str = "fiat_price";
/// Present in some exports; the source slot decides origin instead.
const COL_ORIGIN: &str = "origin";

/// Zone-less timestamp layouts, read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Load both sources named in the config, resolving paths against `base_dir`.
pub fn load_input(base_dir: &Path, sources: &SourcesConfig) -> Result<ReconInput, ReconError> {
    Ok(ReconInput {
        ledger: load_source(base_dir, "ledger", Origin::Ledger, &sources.ledger)?,
        observed: load_source(base_dir, "observed", Origin::Observed, &sources.observed)?,
    })
}

pub fn load_source(
    base_dir: &Path,
    name: &str,
    origin: Origin,
    source: &SourceConfig,
) -> Result<Vec<TransactionRecord>, ReconError> {
    let path = base_dir.join(&source.file);
    let data = std::fs::read_to_string(&path)
        .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
    let records = match source.resolved_format() {
        RecordFormat::Csv => load_csv_records(name, origin, &data)?,
        RecordFormat::Json => load_json_records(name, origin, &data)?,
    };
    log::info!("loaded {} {origin} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse canonical CSV. Unknown columns become tags.
pub fn load_csv_records(
    name: &str,
    origin: Origin,
    csv_data: &str,
) -> Result<Vec<TransactionRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Io(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |column: &str| headers.iter().position(|h| h == column);
    let required = |column: &str| -> Result<usize, ReconError> {
        idx(column).ok_or_else(|| ReconError::MissingColumn {
            source: name.into(),
            column: column.into(),
        })
    };

    let timestamp_idx = required(COL_TIMESTAMP)?;
    let asset_idx = required(COL_ASSET)?;
    let amount_idx = required(COL_AMOUNT)?;
    let activity_idx = required(COL_ACTIVITY)?;
    let fee_idx = idx(COL_FEE);
    let identifier_idx = idx(COL_IDENTIFIER);
    let fiat_idx = idx(COL_FIAT_PRICE);

    let tag_columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            ![
                COL_TIMESTAMP,
                COL_ASSET,
                COL_AMOUNT,
                COL_FEE,
                COL_IDENTIFIER,
                COL_ACTIVITY,
                COL_FIAT_PRICE,
                COL_ORIGIN,
            ]
            .contains(&h.as_str())
        })
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    let mut records = Vec::new();

    for (i, row) in reader.records().enumerate() {
        let row_no = i + 1;
        let row = row.map_err(|e| ReconError::Io(e.to_string()))?;
        let field = |idx: usize| row.get(idx).unwrap_or("");
        let optional = |idx: Option<usize>| idx.map(|i| row.get(i).unwrap_or("")).unwrap_or("");

        let timestamp_str = field(timestamp_idx);
        let timestamp = parse_timestamp(timestamp_str).ok_or_else(|| ReconError::TimestampParse {
            source: name.into(),
            row: row_no,
            value: timestamp_str.into(),
        })?;

        let asset = field(asset_idx);
        if asset.is_empty() {
            return Err(ReconError::InvalidRecord {
                source: name.into(),
                row: row_no,
                reason: "empty asset".into(),
            });
        }

        let amount = required_decimal(name, row_no, field(amount_idx))?;
        let fee = optional_decimal(name, row_no, optional(fee_idx))?.unwrap_or(Decimal::ZERO);
        let fiat_price = optional_decimal(name, row_no, optional(fiat_idx))?;

        let tags: BTreeMap<String, String> = tag_columns
            .iter()
            .filter_map(|&(ci, column)| {
                let value = row.get(ci).unwrap_or("");
                (!value.is_empty()).then(|| (column.to_string(), value.to_string()))
            })
            .collect();

        records.push(TransactionRecord {
            timestamp,
            asset: asset.to_string(),
            amount,
            fee: fee.abs(),
            identifier: optional(identifier_idx).to_string(),
            activity_type: field(activity_idx).to_string(),
            origin,
            fiat_price,
            tags,
        });
    }

    Ok(records)
}

#[derive(Deserialize)]
struct RecordDoc {
    timestamp: String,
    asset: String,
    amount: Decimal,
    #[serde(default)]
    fee: Option<Decimal>,
    #[serde(default)]
    identifier: Option<String>,
    activity_type: String,
    #[serde(default)]
    fiat_price: Option<Decimal>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
}

/// Parse a JSON array of records. Non-string tag values are stringified.
pub fn load_json_records(
    name: &str,
    origin: Origin,
    json: &str,
) -> Result<Vec<TransactionRecord>, ReconError> {
    let docs: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| {
        ReconError::InvalidRecord {
            source: name.into(),
            row: 0,
            reason: format!("expected a JSON array of records: {e}"),
        }
    })?;

    let mut records = Vec::with_capacity(docs.len());
    for (i, value) in docs.into_iter().enumerate() {
        let row_no = i + 1;
        let doc: RecordDoc =
            serde_json::from_value(value).map_err(|e| ReconError::InvalidRecord {
                source: name.into(),
                row: row_no,
                reason: e.to_string(),
            })?;

        let timestamp =
            parse_timestamp(&doc.timestamp).ok_or_else(|| ReconError::TimestampParse {
                source: name.into(),
                row: row_no,
                value: doc.timestamp.clone(),
            })?;

        let tags = doc
            .tags
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect();

        records.push(TransactionRecord {
            timestamp,
            asset: doc.asset,
            amount: doc.amount,
            fee: doc.fee.unwrap_or(Decimal::ZERO).abs(),
            identifier: doc.identifier.unwrap_or_default(),
            activity_type: doc.activity_type,
            origin,
            fiat_price: doc.fiat_price,
            tags,
        });
    }

    Ok(records)
}

/// RFC 3339, offset-qualified, or zone-less (assumed UTC) timestamps.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    let cleaned = value.trim().replace(',', "");
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

fn required_decimal(name: &str, row: usize, value: &str) -> Result<Decimal, ReconError> {
    parse_decimal(value).ok_or_else(|| ReconError::AmountParse {
        source: name.into(),
        row,
        value: value.into(),
    })
}

fn optional_decimal(name: &str, row: usize, value: &str) -> Result<Option<Decimal>, ReconError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    required_decimal(name, row, value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    const LEDGER_CSV: &str = "\
timestamp,asset,amount,fee,identifier,activity_type,fiat_price,asset_type
2025-03-01 10:00:00,BTC,\"-1,000.5\",0.0001,abc,Withdrawal,,
2025-03-01T11:00:00+09:00,BTC,0.00000546,,,Deposit,95000000,ORDINAL
";

    #[test]
    fn csv_basic() {
        let records = load_csv_records("ledger", Origin::Ledger, LEDGER_CSV).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.timestamp.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert_eq!(first.amount, dec("-1000.5"));
        assert_eq!(first.fee, dec("0.0001"));
        assert_eq!(first.identifier, "abc");
        assert_eq!(first.origin, Origin::Ledger);
        assert!(first.fiat_price.is_none());
        assert!(first.tags.is_empty());

        let second = &records[1];
        assert_eq!(second.timestamp.to_rfc3339(), "2025-03-01T02:00:00+00:00");
        assert_eq!(second.fee, Decimal::ZERO);
        assert_eq!(second.identifier, "");
        assert_eq!(second.fiat_price, Some(dec("95000000")));
        assert_eq!(second.tag("asset_type"), Some("ORDINAL"));
    }

    #[test]
    fn csv_missing_column() {
        let err = load_csv_records("ledger", Origin::Ledger, "timestamp,asset,amount\n").unwrap_err();
        assert!(err.to_string().contains("activity_type"));
    }

    #[test]
    fn csv_bad_amount_reports_row() {
        let data = "timestamp,asset,amount,activity_type\n2025-01-01 00:00,BTC,1,Deposit\n2025-01-01 00:00,BTC,lots,Deposit\n";
        let err = load_csv_records("ledger", Origin::Ledger, data).unwrap_err();
        match err {
            ReconError::AmountParse { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn csv_bad_timestamp() {
        let data = "timestamp,asset,amount,activity_type\nyesterday,BTC,1,Deposit\n";
        let err = load_csv_records("ledger", Origin::Ledger, data).unwrap_err();
        assert!(matches!(err, ReconError::TimestampParse { row: 1, .. }));
    }

    #[test]
    fn json_basic() {
        let json = r#"[
            {"timestamp": "2025-03-01T10:00:00Z", "asset": "BTC", "amount": "0.5",
             "identifier": "abc", "activity_type": "Receive",
             "tags": {"asset_type": "RUNE", "rune_name": "DOG", "block": 840000, "note": null}},
            {"timestamp": "2025-03-01 10:05", "asset": "BTC", "amount": -0.25,
             "fee": "-0.0002", "activity_type": "Send"}
        ]"#;
        let records = load_json_records("observed", Origin::Observed, json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].origin, Origin::Observed);
        assert_eq!(records[0].tag("rune_name"), Some("DOG"));
        assert_eq!(records[0].tag("block"), Some("840000"));
        assert!(records[0].tag("note").is_none());
        assert_eq!(records[1].amount, dec("-0.25"));
        assert_eq!(records[1].fee, dec("0.0002"));
        assert_eq!(records[1].identifier, "");
    }

    #[test]
    fn json_rejects_non_array() {
        assert!(load_json_records("observed", Origin::Observed, "{}").is_err());
    }

    #[test]
    fn json_reports_bad_row() {
        let json = r#"[{"timestamp": "2025-03-01T10:00:00Z", "asset": "BTC", "activity_type": "Send"}]"#;
        let err = load_json_records("observed", Origin::Observed, json).unwrap_err();
        assert!(matches!(err, ReconError::InvalidRecord { row: 1, .. }));
    }

    #[test]
    fn timestamp_forms() {
        assert!(parse_timestamp("2025-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00.123Z").is_some());
        assert!(parse_timestamp("2025-03-01 10:00:00").is_some());
        assert!(parse_timestamp("2025-03-01 10:00:00.5").is_some());
        assert!(parse_timestamp("2025-03-01 10:00").is_some());
        assert!(parse_timestamp("03/01/2025").is_none());
    }

    #[test]
    fn load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ledger.csv"), LEDGER_CSV).unwrap();
        std::fs::write(
            dir.path().join("chain.json"),
            r#"[{"timestamp": "2025-03-01T10:00:00Z", "asset": "BTC", "amount": "1", "activity_type": "Receive"}]"#,
        )
        .unwrap();

        let sources = SourcesConfig {
            ledger: SourceConfig { file: "ledger.csv".into(), format: None },
            observed: SourceConfig { file: "chain.json".into(), format: None },
        };
        let input = load_input(dir.path(), &sources).unwrap();
        assert_eq!(input.ledger.len(), 2);
        assert_eq!(input.observed.len(), 1);
        assert_eq!(input.observed[0].origin, Origin::Observed);
    }

    #[test]
    fn load_missing_file() {
        let sources = SourcesConfig {
            ledger: SourceConfig { file: "nope.csv".into(), format: None },
            observed: SourceConfig { file: "nope.json".into(), format: None },
        };
        let err = load_input(Path::new("/nonexistent"), &sources).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
    }
}
