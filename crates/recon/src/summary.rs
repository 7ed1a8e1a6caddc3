use std::collections::BTreeMap;

use crate::model::{CorrectionSuggestion, CorrectionSummary};

/// Tally suggestions by severity and by pattern label.
pub fn compute_summary(suggestions: &[CorrectionSuggestion]) -> CorrectionSummary {
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_pattern: BTreeMap<String, usize> = BTreeMap::new();

    for s in suggestions {
        *by_severity.entry(s.severity.to_string()).or_insert(0) += 1;
        *by_pattern.entry(s.pattern.to_string()).or_insert(0) += 1;
    }

    CorrectionSummary {
        total: suggestions.len(),
        by_severity,
        by_pattern,
    }
}
