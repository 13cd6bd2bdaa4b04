// 📦 Staging artifacts
// File-based transfer between pipeline stages. Every artifact is UTF-8 CSV
// with a header row, all values pre-formatted as plain strings so the load
// stage can apply them without further transformation.

use crate::config::EXPENSE_COLUMNS;
use crate::error::{EtlError, Result};
use crate::records::{ExpenseRecord, RubricReversal, TermSummary};
use crate::reconcile::{AmountUpdate, Decision, ExpenseDiff};
use std::path::{Path, PathBuf};

/// Artifact file names inside the staging directory.
pub const GENERAL_FILE: &str = "general.csv";
pub const UPLOAD_FILE: &str = "upload.csv";
pub const TERMS_SUMMARY_FILE: &str = "terms_summary.csv";
pub const RUBRICS_SUMMARY_FILE: &str = "rubrics_summary.csv";
pub const TERMS_UPDATE_FILE: &str = "terms_update.csv";
pub const RUBRICS_UPDATE_FILE: &str = "rubrics_update.csv";

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StagingArea { dir: dir.into() }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    // ========================================================================
    // EXPENSES
    // ========================================================================

    /// Write the full normalized row set (post-extraction).
    pub fn write_general(&self, records: &[ExpenseRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(GENERAL_FILE))?;
        writer.write_record(EXPENSE_COLUMNS)?;
        for record in records {
            writer.write_record(record.staging_fields())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Re-read the general artifact (transform stage input).
    pub fn read_general(&self) -> Result<Vec<ExpenseRecord>> {
        let path = self.path(GENERAL_FILE);
        let mut reader = csv::Reader::from_path(&path)?;
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(expense_from_row(&row)?);
        }
        Ok(records)
    }

    /// Write the action-tagged changed subset (post-reconciliation).
    /// Column order is the canonical schema plus one trailing `action`.
    pub fn write_upload(&self, diff: &ExpenseDiff) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(UPLOAD_FILE))?;

        let mut header: Vec<&str> = EXPENSE_COLUMNS.to_vec();
        header.push("action");
        writer.write_record(&header)?;

        for record in &diff.inserts {
            let mut fields = record.staging_fields();
            fields.push(Decision::Insert.as_str().to_string());
            writer.write_record(&fields)?;
        }
        for record in &diff.updates {
            let mut fields = record.staging_fields();
            fields.push(Decision::Update.as_str().to_string());
            writer.write_record(&fields)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Re-read the upload artifact (load stage input). Rows with an
    /// unknown action tag are rejected — a malformed artifact must not
    /// be half-applied.
    pub fn read_upload(&self) -> Result<Vec<(Decision, ExpenseRecord)>> {
        let path = self.path(UPLOAD_FILE);
        let mut reader = csv::Reader::from_path(&path)?;
        let mut staged = Vec::new();

        for row in reader.records() {
            let row = row?;
            let record = expense_from_row(&row)?;
            let action_cell = row.get(EXPENSE_COLUMNS.len()).unwrap_or_default();
            let decision = Decision::parse(action_cell).ok_or_else(|| EtlError::Malformed {
                path: path.clone(),
                detail: format!("unknown action tag '{action_cell}'"),
            })?;
            staged.push((decision, record));
        }

        Ok(staged)
    }

    // ========================================================================
    // FINANCIAL SUMMARIES (post-extraction)
    // ========================================================================

    pub fn write_term_summaries(&self, summaries: &[TermSummary]) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(TERMS_SUMMARY_FILE))?;
        for summary in summaries {
            writer.serialize(summary)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_term_summaries(&self) -> Result<Vec<TermSummary>> {
        let mut reader = csv::Reader::from_path(self.path(TERMS_SUMMARY_FILE))?;
        let mut summaries = Vec::new();
        for row in reader.deserialize() {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    pub fn write_rubric_summaries(&self, reversals: &[RubricReversal]) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(RUBRICS_SUMMARY_FILE))?;
        for reversal in reversals {
            writer.serialize(reversal)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_rubric_summaries(&self) -> Result<Vec<RubricReversal>> {
        let mut reader = csv::Reader::from_path(self.path(RUBRICS_SUMMARY_FILE))?;
        let mut reversals = Vec::new();
        for row in reader.deserialize() {
            reversals.push(row?);
        }
        Ok(reversals)
    }

    // ========================================================================
    // AMOUNT UPDATES (terms / rubrics)
    // ========================================================================

    pub fn write_term_updates(&self, updates: &[AmountUpdate]) -> Result<()> {
        write_amount_updates(&self.path(TERMS_UPDATE_FILE), "sit_number", "financial_yield", updates)
    }

    pub fn write_rubric_updates(&self, updates: &[AmountUpdate]) -> Result<()> {
        write_amount_updates(
            &self.path(RUBRICS_UPDATE_FILE),
            "composite_key",
            "reversed_amount",
            updates,
        )
    }

    pub fn read_term_updates(&self) -> Result<Vec<AmountUpdate>> {
        read_amount_updates(&self.path(TERMS_UPDATE_FILE))
    }

    pub fn read_rubric_updates(&self) -> Result<Vec<AmountUpdate>> {
        read_amount_updates(&self.path(RUBRICS_UPDATE_FILE))
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    pub fn exists(&self, file: &str) -> bool {
        self.path(file).exists()
    }

    /// Rename an applied upload artifact to its processed marker so a
    /// re-run cannot double-apply it.
    pub fn mark_processed(&self, file: &str) -> Result<PathBuf> {
        let from = self.path(file);
        let to = from.with_extension("processed.csv");
        if to.exists() {
            std::fs::remove_file(&to)?;
        }
        std::fs::rename(&from, &to)?;
        Ok(to)
    }

    /// Delete a staging artifact if present. Used both after successful
    /// application and when a reconciliation comes back empty (a stale
    /// artifact from a previous run must not survive).
    pub fn remove(&self, file: &str) -> Result<()> {
        let path = self.path(file);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn write_amount_updates(
    path: &Path,
    key_column: &str,
    value_column: &str,
    updates: &[AmountUpdate],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([key_column, value_column])?;
    for update in updates {
        let value = format!("{}", update.value);
        writer.write_record([update.key.as_str(), value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn read_amount_updates(path: &Path) -> Result<Vec<AmountUpdate>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut updates = Vec::new();
    for row in reader.records() {
        let row = row?;
        updates.push(AmountUpdate {
            key: row.get(0).unwrap_or_default().to_string(),
            value: row.get(1).unwrap_or_default().parse().unwrap_or(0.0),
        });
    }
    Ok(updates)
}

/// Build an expense record from a staging row. Values were pre-formatted
/// on write, so this is position mapping only.
fn expense_from_row(row: &csv::StringRecord) -> Result<ExpenseRecord> {
    let cell = |i: usize| row.get(i).unwrap_or_default().to_string();

    Ok(ExpenseRecord {
        external_code: cell(0),
        term: cell(1),
        rubric: cell(2),
        category: cell(3),
        tax_id: cell(4),
        payee: cell(5),
        expense_doc_type: cell(6),
        description: cell(7),
        payment_doc_type: cell(8),
        payment_date: cell(9),
        debit_date: cell(10),
        amount: cell(11).parse().unwrap_or(0.0),
        composite_key: cell(12),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(code: &str, amount: f64) -> ExpenseRecord {
        ExpenseRecord {
            external_code: code.to_string(),
            term: "6373".to_string(),
            rubric: "3.3.90".to_string(),
            category: "CONSUMABLES".to_string(),
            tax_id: "12345678909".to_string(),
            payee: "FORNECEDOR LTDA".to_string(),
            expense_doc_type: "NF".to_string(),
            description: "Compra de material, lote 2".to_string(),
            payment_doc_type: String::new(),
            payment_date: "2024-12-31".to_string(),
            debit_date: String::new(),
            amount,
            composite_key: "6373-3.3.90".to_string(),
        }
    }

    #[test]
    fn test_upload_round_trip_keeps_actions_and_order() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let diff = ExpenseDiff {
            inserts: vec![sample_record("A1", 100.0)],
            updates: vec![sample_record("A2", 55.5)],
            unchanged: 3,
        };

        staging.write_upload(&diff).unwrap();
        let staged = staging.read_upload().unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].0, Decision::Insert);
        assert_eq!(staged[0].1, sample_record("A1", 100.0));
        assert_eq!(staged[1].0, Decision::Update);
        assert_eq!(staged[1].1.external_code, "A2");

        println!("✅ Upload round-trip test PASSED");
    }

    #[test]
    fn test_corrupt_action_tag_is_malformed_artifact() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let diff = ExpenseDiff {
            inserts: vec![sample_record("A1", 100.0)],
            ..ExpenseDiff::default()
        };
        staging.write_upload(&diff).unwrap();

        // Clobber the action tag in the written artifact
        let path = staging.path(UPLOAD_FILE);
        let tampered = std::fs::read_to_string(&path).unwrap().replace("INSERT", "DELETE");
        std::fs::write(&path, tampered).unwrap();

        let err = staging.read_upload().unwrap_err();
        assert!(matches!(err, crate::error::EtlError::Malformed { .. }));

        println!("✅ Corrupt artifact rejection test PASSED");
    }

    #[test]
    fn test_general_round_trip() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let records = vec![sample_record("A1", 100.0), sample_record("A2", 0.0)];
        staging.write_general(&records).unwrap();

        assert_eq!(staging.read_general().unwrap(), records);

        println!("✅ General artifact round-trip test PASSED");
    }

    #[test]
    fn test_amount_updates_round_trip() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let updates = vec![
            AmountUpdate { key: "57884".to_string(), value: 1200.5 },
            AmountUpdate { key: "63377".to_string(), value: 0.0 },
        ];

        staging.write_term_updates(&updates).unwrap();
        assert_eq!(staging.read_term_updates().unwrap(), updates);

        staging.write_rubric_updates(&updates).unwrap();
        assert_eq!(staging.read_rubric_updates().unwrap(), updates);

        println!("✅ Amount update round-trip test PASSED");
    }

    #[test]
    fn test_summary_round_trip() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let terms = vec![TermSummary {
            sit_number: "57884".to_string(),
            financial_yield: 1234.56,
        }];
        let rubrics = vec![RubricReversal {
            sit_number: "57884".to_string(),
            rubric: "3.3.90".to_string(),
            reversed_amount: 10.0,
        }];

        staging.write_term_summaries(&terms).unwrap();
        staging.write_rubric_summaries(&rubrics).unwrap();

        assert_eq!(staging.read_term_summaries().unwrap(), terms);
        assert_eq!(staging.read_rubric_summaries().unwrap(), rubrics);

        println!("✅ Summary artifact round-trip test PASSED");
    }

    #[test]
    fn test_mark_processed_renames_artifact() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        staging.write_upload(&ExpenseDiff::default()).unwrap();
        let processed = staging.mark_processed(UPLOAD_FILE).unwrap();

        assert!(!staging.exists(UPLOAD_FILE));
        assert!(processed.exists());
        assert!(processed.to_string_lossy().ends_with("upload.processed.csv"));

        println!("✅ Processed marker test PASSED");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        staging.write_term_updates(&[]).unwrap();
        staging.remove(TERMS_UPDATE_FILE).unwrap();
        staging.remove(TERMS_UPDATE_FILE).unwrap(); // already gone, still Ok

        assert!(!staging.exists(TERMS_UPDATE_FILE));

        println!("✅ Staging removal test PASSED");
    }
}
