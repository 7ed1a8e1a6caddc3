//! Explorer links for correction suggestions.
//!
//! Ingestion manufactures placeholder identifiers (`XVERSE_...`, `CEX_...`)
//! when a source row lacks a real hash. Those must never be surfaced as if
//! they were verifiable on-chain references.

use crate::config::PatternConfig;

/// Length of a transaction hash in hex characters.
const TX_HASH_LEN: usize = 64;

/// Underscores this early mark an ingestion-made identifier.
const SYNTHETIC_MARKER_SPAN: usize = 20;

/// Explorer link for `identifier`, or `None` unless it is a real tx hash.
pub fn verification_link(identifier: &str, config: &PatternConfig) -> Option<String> {
    if is_verifiable(identifier, &config.synthetic_prefixes) {
        Some(format!("{}{}", config.explorer_url, identifier))
    } else {
        None
    }
}

/// Exactly 64 hex characters and not an ingestion-synthesized id.
pub fn is_verifiable(identifier: &str, synthetic_prefixes: &[String]) -> bool {
    if is_synthetic(identifier, synthetic_prefixes) {
        return false;
    }
    identifier.len() == TX_HASH_LEN && identifier.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_synthetic(identifier: &str, synthetic_prefixes: &[String]) -> bool {
    synthetic_prefixes
        .iter()
        .any(|p| !p.is_empty() && identifier.starts_with(p.as_str()))
        || identifier.chars().take(SYNTHETIC_MARKER_SPAN).any(|c| c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "4f6b1e9c0d2a3b5c7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9012a3b4c5d6";

    #[test]
    fn real_hash_links() {
        assert_eq!(HASH.len(), 64);
        let link = verification_link(HASH, &PatternConfig::default()).unwrap();
        assert_eq!(link, format!("https://ordiscan.com/tx/{HASH}"));
    }

    #[test]
    fn uppercase_hex_links() {
        let upper = HASH.to_uppercase();
        assert!(verification_link(&upper, &PatternConfig::default()).is_some());
    }

    #[test]
    fn non_hex_64_chars_rejected() {
        let bad = format!("{}zz", &HASH[..62]);
        assert_eq!(bad.len(), 64);
        assert!(verification_link(&bad, &PatternConfig::default()).is_none());
    }

    #[test]
    fn short_hash_rejected() {
        assert!(verification_link(&HASH[..63], &PatternConfig::default()).is_none());
    }

    #[test]
    fn synthetic_ids_rejected() {
        let config = PatternConfig::default();
        let xverse = format!("XVERSE_{}", &HASH[..57]);
        assert_eq!(xverse.len(), 64);
        assert!(verification_link(&xverse, &config).is_none());
        assert!(verification_link("CEX_12345", &config).is_none());
        assert!(verification_link("", &config).is_none());
    }

    #[test]
    fn configured_prefix_rejects_hex_lookalike() {
        let config = PatternConfig {
            synthetic_prefixes: vec!["4f6b".into()],
            ..PatternConfig::default()
        };
        assert!(verification_link(HASH, &config).is_none());
    }
}
