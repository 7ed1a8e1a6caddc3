//! `ledgermatch-recon`: ledger vs. observed-chain transaction reconciliation.
//!
//! Pure engine crate: receives pre-loaded records, returns matches,
//! correction suggestions and anomaly findings. The `loader` module reads
//! canonical CSV/JSON record files; everything else is IO-free.

pub mod anomaly;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod loader;
pub mod matcher;
pub mod model;
pub mod summary;

pub use config::ReconConfig;
pub use engine::{detect_corrections, run};
pub use error::ReconError;
pub use model::{
    CorrectionSuggestion, Finding, MatchOutput, Origin, ReconInput, ReconReport,
    TransactionRecord,
};
