// ⚙️ Centralized Configuration
// One explicit struct built from the environment at process start and
// passed by reference into every stage. Core logic never reads the
// environment on its own.

use crate::error::{EtlError, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::records::ExpenseCategory;

/// Environment variables the pipeline reads.
pub const ENV_DOWNLOADS_DIR: &str = "GRANTS_DOWNLOADS_DIR";
pub const ENV_STAGING_DIR: &str = "GRANTS_STAGING_DIR";
pub const ENV_DB_PATH: &str = "GRANTS_DB_PATH";
pub const ENV_RAW_DIR: &str = "GRANTS_RAW_DIR";
pub const ENV_LOGS_DIR: &str = "GRANTS_LOGS_DIR";

/// Canonical staging column order for expense rows.
/// The upload artifact appends one extra `action` column to this list.
pub const EXPENSE_COLUMNS: [&str; 13] = [
    "external_code",
    "term",
    "rubric",
    "category",
    "tax_id",
    "payee",
    "expense_doc_type",
    "description",
    "payment_doc_type",
    "payment_date",
    "debit_date",
    "amount",
    "composite_key",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// Where incoming source exports land (browser downloads folder).
    pub downloads_dir: PathBuf,

    /// Inbox for source files after ingestion (downloads are moved here).
    pub raw_dir: PathBuf,

    /// Staging directory for transfer artifacts between stages.
    pub staging_dir: PathBuf,

    /// SQLite database file.
    pub db_path: PathBuf,

    /// Where run summaries are written.
    pub logs_dir: PathBuf,

    /// Seed SIT → term map used by the extractor to locate expense files
    /// and assign the internal term id. The translator used for rubric
    /// reconciliation is built from the database instead, so the two can
    /// drift without breaking the diff.
    pub sit_term_map: Vec<(String, String)>,

    /// Substring markers for expense-category classification,
    /// first match wins. Source reports are pt-BR.
    pub category_markers: Vec<(String, ExpenseCategory)>,

    /// Divergence tolerance for amount comparisons, in currency units.
    pub amount_tolerance: f64,
}

impl Config {
    /// Build configuration from the environment. Does not touch the
    /// filesystem; call `validate()` before running a stage.
    pub fn from_env() -> Result<Self> {
        let downloads_dir = require_var(ENV_DOWNLOADS_DIR)?;
        let staging_dir = require_var(ENV_STAGING_DIR)?;
        let db_path = require_var(ENV_DB_PATH)?;

        let raw_dir = env::var(ENV_RAW_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(&staging_dir).join("..").join("raw"));
        let logs_dir = env::var(ENV_LOGS_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        Ok(Config {
            downloads_dir: PathBuf::from(downloads_dir),
            raw_dir,
            staging_dir: PathBuf::from(staging_dir),
            db_path: PathBuf::from(db_path),
            logs_dir,
            sit_term_map: default_sit_term_map(),
            category_markers: default_category_markers(),
            amount_tolerance: 0.01,
        })
    }

    /// Same defaults with explicit paths, for tests and tooling.
    pub fn with_paths(
        downloads_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        let staging_dir = staging_dir.into();
        let raw_dir = staging_dir.join("..").join("raw");
        let logs_dir = staging_dir.join("..").join("logs");
        Config {
            downloads_dir: downloads_dir.into(),
            raw_dir,
            staging_dir,
            db_path: db_path.into(),
            logs_dir,
            sit_term_map: default_sit_term_map(),
            category_markers: default_category_markers(),
            amount_tolerance: 0.01,
        }
    }

    /// Check required values and create the directories the run writes to.
    pub fn validate(&self) -> Result<()> {
        if self.staging_dir.as_os_str().is_empty() {
            return Err(EtlError::Configuration("staging dir is empty".into()));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(EtlError::Configuration("database path is empty".into()));
        }
        std::fs::create_dir_all(&self.staging_dir)?;
        std::fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }

    /// Seed map as a lookup table.
    pub fn sit_term_lookup(&self) -> HashMap<&str, &str> {
        self.sit_term_map
            .iter()
            .map(|(sit, term)| (sit.as_str(), term.as_str()))
            .collect()
    }
}

fn require_var(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EtlError::Configuration(format!("missing environment variable {name}")))
}

/// Known SIT numbers and their internal term ids. New grants get a row
/// here and in the `terms` table.
fn default_sit_term_map() -> Vec<(String, String)> {
    [
        ("57884", "6373"),
        ("63377", "6729"),
        ("66270", "6822"),
        ("67303", "6893"),
        ("67669", "6932"),
        ("71199", "26478"),
        ("74699", "26672"),
    ]
    .into_iter()
    .map(|(s, t)| (s.to_string(), t.to_string()))
    .collect()
}

fn default_category_markers() -> Vec<(String, ExpenseCategory)> {
    [
        ("PESSOAL CIVIL", ExpenseCategory::Personnel),
        ("OBRIGAÇÕES PATRONAIS", ExpenseCategory::Charges),
        ("MATERIAIS DE CONSUMO", ExpenseCategory::Consumables),
        ("SERVIÇOS DE TERCEIROS", ExpenseCategory::Services),
    ]
    .into_iter()
    .map(|(marker, cat)| (marker.to_string(), cat))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_paths_defaults() {
        let config = Config::with_paths("/tmp/dl", "/tmp/staging", "/tmp/etl.db");

        assert_eq!(config.amount_tolerance, 0.01);
        assert_eq!(config.sit_term_map.len(), 7);
        assert_eq!(config.sit_term_lookup().get("57884"), Some(&"6373"));

        println!("✅ Config defaults test PASSED");
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let mut config = Config::with_paths("/tmp/dl", "/tmp/staging", "/tmp/etl.db");
        config.db_path = PathBuf::new();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));

        println!("✅ Config validation test PASSED");
    }
}
