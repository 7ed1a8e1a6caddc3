//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                                   |
//! |---------|------------|-----------------------------------------------|
//! | 0       | Universal  | Success, nothing to review                    |
//! | 1       | Universal  | Findings present (conflicts, suggestions, …)  |
//! | 2       | Universal  | CLI usage error (bad args)                    |
//! | 60-69   | recon      | Config and runtime failures                   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - the run completed and there is nothing to review.
pub const EXIT_SUCCESS: u8 = 0;

/// The run completed but produced conflicts, unledgered observations,
/// correction suggestions or anomalies. Like `diff(1)`, 1 means "differs".
pub const EXIT_FINDINGS: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse failures.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// Config failed to parse or validate, or has no sources for `run`.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// IO or record loading failure (missing file, bad row, write error).
pub const EXIT_RECON_RUNTIME: u8 = 61;

use ledgermatch_recon::ReconError;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::MissingColumn { .. }
        | ReconError::TimestampParse { .. }
        | ReconError::AmountParse { .. }
        | ReconError::InvalidRecord { .. }
        | ReconError::Io(_) => EXIT_RECON_RUNTIME,
    }
}
