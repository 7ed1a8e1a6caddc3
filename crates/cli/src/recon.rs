//! `ledgermatch` commands: config-driven ledger vs. chain reconciliation.

use std::path::{Path, PathBuf};

use ledgermatch_recon::config::{MatchConfig, RecordFormat, SourceConfig};
use ledgermatch_recon::loader::{load_input, load_source};
use ledgermatch_recon::model::{Finding, MatchOutput, ReconReport};
use ledgermatch_recon::{Origin, ReconConfig, ReconError, TransactionRecord};
use serde::Serialize;

use crate::exit_codes::{
    recon_exit_code, EXIT_FINDINGS, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME,
};
use crate::CliError;

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        recon_err(recon_exit_code(&err), err.to_string())
    }
}

/// Findings are not an error, but scripts see exit 1. The summary on stderr
/// already said what was found, so the message stays empty.
fn findings() -> CliError {
    recon_err(EXIT_FINDINGS, "")
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    Ok(ReconConfig::from_toml(&config_str)?)
}

/// Write pretty JSON to `output_file` and/or stdout.
fn emit_json<T: Serialize>(
    value: &T,
    json_output: bool,
    output_file: Option<&Path>,
) -> Result<(), CliError> {
    if !json_output && output_file.is_none() {
        return Ok(());
    }

    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    year: Option<i32>,
) -> Result<(), CliError> {
    let mut config = read_config(&config_path)?;
    if let Some(year) = year {
        config.reporting_year = year;
        config.validate()?;
    }

    let sources = config.sources.as_ref().ok_or_else(|| {
        recon_err(EXIT_RECON_INVALID_CONFIG, "config has no [sources] section")
            .with_hint("add [sources.ledger] and [sources.observed] with a `file` each")
    })?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let input = load_input(base_dir, sources)?;

    let report = ledgermatch_recon::run(&config, &input);

    emit_json(&report, json_output, output_file.as_deref())?;
    print_report_summary(&report);

    if report.has_findings() {
        return Err(findings());
    }
    Ok(())
}

fn print_report_summary(report: &ReconReport) {
    let m = &report.matching;
    eprintln!(
        "{} ({}): {} ledger / {} observed records",
        report.meta.config_name,
        report.meta.reporting_year,
        report.meta.ledger_records,
        report.meta.observed_records,
    );
    print_match_summary(m);

    let s = &report.corrections.summary;
    if s.total > 0 {
        let by_pattern: Vec<String> =
            s.by_pattern.iter().map(|(p, n)| format!("{n} {p}")).collect();
        eprintln!("corrections: {} suggested ({})", s.total, by_pattern.join(", "));
    } else {
        eprintln!("corrections: none");
    }

    print_findings(&report.anomalies);
}

fn print_match_summary(m: &MatchOutput) {
    eprintln!(
        "matching: {} matched, {} conflicts, {} missing from ledger",
        m.matched.len(),
        m.conflicts.len(),
        m.missing_from_ledger.len(),
    );
}

fn print_findings(findings: &[Finding]) {
    eprintln!("anomalies: {}", findings.len());
    for f in findings {
        if f.identifier.is_empty() {
            eprintln!("  [{}] {}: {}", f.severity, f.kind, f.message);
        } else {
            eprintln!("  [{}] {} {}: {}", f.severity, f.kind, f.identifier, f.message);
        }
    }
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    match &config.sources {
        Some(sources) => eprintln!(
            "config \"{}\" is valid (year {}, ledger {}, observed {})",
            config.name, config.reporting_year, sources.ledger.file, sources.observed.file,
        ),
        None => eprintln!(
            "config \"{}\" is valid (year {}, no sources)",
            config.name, config.reporting_year,
        ),
    }
    Ok(())
}

// ============================================================================
// match
// ============================================================================

pub fn cmd_match(ledger: PathBuf, observed: PathBuf, json_output: bool) -> Result<(), CliError> {
    if ledger == observed {
        return Err(CliError::args("--ledger and --observed name the same file")
            .with_hint("pass the exchange export as --ledger and the chain records as --observed"));
    }

    let ledger = load_file("ledger", Origin::Ledger, &ledger)?;
    let observed = load_file("observed", Origin::Observed, &observed)?;

    let output =
        ledgermatch_recon::matcher::match_records(&ledger, &observed, &MatchConfig::default());

    emit_json(&output, json_output, None)?;
    print_match_summary(&output);

    if !output.conflicts.is_empty() || !output.missing_from_ledger.is_empty() {
        return Err(findings());
    }
    Ok(())
}

// ============================================================================
// anomalies
// ============================================================================

pub fn cmd_anomalies(
    year: i32,
    ledger_files: Vec<PathBuf>,
    observed_files: Vec<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    if ledger_files.is_empty() && observed_files.is_empty() {
        return Err(CliError::args("no record files given")
            .with_hint("pass ledger files positionally and chain files with --observed"));
    }
    // Reuse config validation for the year bounds.
    ReconConfig::new("anomalies", year).validate()?;

    let mut records: Vec<TransactionRecord> = Vec::new();
    let sets = [(Origin::Ledger, &ledger_files), (Origin::Observed, &observed_files)];
    for (origin, paths) in sets {
        for path in paths {
            let name = path.display().to_string();
            records.extend(load_file(&name, origin, path)?);
        }
    }
    let observed_count = records.iter().filter(|r| r.origin == Origin::Observed).count();
    eprintln!(
        "scanned {} ledger / {} observed records",
        records.len() - observed_count,
        observed_count,
    );

    let findings_list = ledgermatch_recon::anomaly::detect_anomalies(
        &records,
        year,
        &Default::default(),
    );

    emit_json(&findings_list, json_output, None)?;
    print_findings(&findings_list);

    if !findings_list.is_empty() {
        return Err(findings());
    }
    Ok(())
}

/// Load one record file; format from the extension.
fn load_file(name: &str, origin: Origin, path: &Path) -> Result<Vec<TransactionRecord>, CliError> {
    let source = SourceConfig {
        file: path.to_string_lossy().into_owned(),
        format: None,
    };
    if source.resolved_format() == RecordFormat::Csv
        && path.extension().is_some_and(|e| !e.eq_ignore_ascii_case("csv"))
    {
        log::warn!("{}: unrecognised extension, reading as CSV", path.display());
    }
    Ok(load_source(Path::new(""), name, origin, &source)?)
}
