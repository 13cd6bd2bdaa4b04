// Grants ETL - Core Library
// Batch pipeline that consolidates government grant-expense reports into a
// relational store, applying only the minimal set of inserts/updates found
// by fingerprint-based reconciliation.

pub mod config;
pub mod error;
pub mod normalize;
pub mod records;
pub mod fingerprint;
pub mod translator;
pub mod extract;
pub mod reconcile;
pub mod storage;
pub mod staging;
pub mod ingest;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Config, EXPENSE_COLUMNS};
pub use error::{EtlError, Result};
pub use fingerprint::fingerprint;
pub use normalize::{normalize_key, parse_localized_amount};
pub use records::{ExpenseCategory, ExpenseRecord, RubricReversal, TermSummary};
pub use reconcile::{AmountUpdate, Decision, ExpenseDiff, ReconcileEngine};
pub use staging::StagingArea;
pub use storage::{load_expense_snapshot, setup_database};
pub use translator::TermTranslator;
pub use pipeline::{Pipeline, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
