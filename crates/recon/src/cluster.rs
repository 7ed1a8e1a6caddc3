//! Structural grouping of both sources into candidate same-event clusters.
//!
//! Ledger exports carry minute granularity while chain timestamps lag by a
//! minute or two, so ledger minutes anchor the clusters and nearby observed
//! records attach to them. Observed records nothing claimed fall back to an
//! identifier key, then to a coarse time bucket. No scoring happens here.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::config::ClusterConfig;
use crate::model::{Cluster, ClusterKey, TransactionRecord};

/// Group both sources into disjoint clusters.
///
/// An observed record within the window of several ledger minutes joins only
/// the nearest one, so no record appears in two clusters.
///
/// Order: ledger-minute clusters chronologically, then identifier clusters
/// in first-appearance order, then time-bucket clusters chronologically.
pub fn build_clusters(
    ledger: &[TransactionRecord],
    observed: &[TransactionRecord],
    config: &ClusterConfig,
) -> Vec<Cluster> {
    let mut minutes: BTreeMap<DateTime<Utc>, Vec<&TransactionRecord>> = BTreeMap::new();
    for record in ledger {
        minutes
            .entry(truncate_to_minute(record.timestamp))
            .or_default()
            .push(record);
    }

    let window = Duration::minutes(config.ledger_window_minutes);
    let mut attached: HashMap<DateTime<Utc>, Vec<&TransactionRecord>> = HashMap::new();
    let mut leftovers: Vec<&TransactionRecord> = Vec::new();

    for record in observed {
        match nearest_minute(&minutes, record.timestamp, window) {
            Some(minute) => attached.entry(minute).or_default().push(record),
            None => leftovers.push(record),
        }
    }

    let mut clusters: Vec<Cluster> = minutes
        .into_iter()
        .map(|(minute, ledger_records)| {
            let nearby = attached.remove(&minute).unwrap_or_default();
            Cluster {
                key: ClusterKey::LedgerMinute(minute),
                records: ledger_records
                    .into_iter()
                    .chain(nearby)
                    .cloned()
                    .collect(),
            }
        })
        .collect();

    clusters.extend(group_leftovers(&leftovers, config));

    log::debug!(
        "clustered {} ledger + {} observed records into {} clusters",
        ledger.len(),
        observed.len(),
        clusters.len()
    );
    clusters
}

/// The ledger minute closest to `at`, if any lies within `window`.
/// Equal distances resolve to the earlier minute.
fn nearest_minute(
    minutes: &BTreeMap<DateTime<Utc>, Vec<&TransactionRecord>>,
    at: DateTime<Utc>,
    window: Duration,
) -> Option<DateTime<Utc>> {
    let mut best: Option<(DateTime<Utc>, Duration)> = None;
    for minute in minutes.range(at - window..=at + window).map(|(m, _)| *m) {
        let distance = if at >= minute { at - minute } else { minute - at };
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((minute, distance));
        }
    }
    best.map(|(minute, _)| minute)
}

fn group_leftovers(leftovers: &[&TransactionRecord], config: &ClusterConfig) -> Vec<Cluster> {
    let mut by_id: Vec<(String, Vec<&TransactionRecord>)> = Vec::new();
    let mut id_index: HashMap<&str, usize> = HashMap::new();
    let mut by_bucket: BTreeMap<i64, Vec<&TransactionRecord>> = BTreeMap::new();
    let bucket_secs = config.fallback_bucket_minutes * 60;

    for &record in leftovers {
        if record.has_identifier() {
            let idx = *id_index.entry(record.identifier.as_str()).or_insert_with(|| {
                by_id.push((record.identifier.clone(), Vec::new()));
                by_id.len() - 1
            });
            by_id[idx].1.push(record);
        } else {
            let bucket = record.timestamp.timestamp().div_euclid(bucket_secs);
            by_bucket.entry(bucket).or_default().push(record);
        }
    }

    let id_clusters = by_id.into_iter().map(|(id, records)| Cluster {
        key: ClusterKey::Identifier(id),
        records: records.into_iter().cloned().collect(),
    });
    let bucket_clusters = by_bucket.into_iter().map(|(bucket, records)| Cluster {
        key: ClusterKey::TimeBucket(bucket),
        records: records.into_iter().cloned().collect(),
    });

    id_clusters.chain(bucket_clusters).collect()
}

fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::minutes(1)).unwrap_or(ts)
}
