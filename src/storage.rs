// 💾 Storage layer
// rusqlite access to the three tables the pipeline reconciles against.
// Snapshot reads are full-table and held in memory for the duration of the
// diff — record volumes are modest and this is a documented design limit,
// not something to optimize.

use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::records::ExpenseRecord;
use rusqlite::{params, Connection};
use std::collections::HashMap;

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            external_code TEXT PRIMARY KEY,
            term TEXT NOT NULL,
            rubric TEXT NOT NULL,
            category TEXT NOT NULL,
            tax_id TEXT NOT NULL,
            payee TEXT NOT NULL,
            expense_doc_type TEXT,
            description TEXT,
            payment_doc_type TEXT,
            payment_date TEXT NOT NULL,
            debit_date TEXT,
            amount REAL NOT NULL,
            composite_key TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms (
            term_id TEXT NOT NULL,
            sit_number TEXT NOT NULL,
            financial_yield REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubrics (
            composite_key TEXT PRIMARY KEY,
            reversed_amount REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_composite_key
         ON expenses(composite_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_sit_number
         ON terms(sit_number)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SNAPSHOT READS
// ============================================================================

/// Full-table read of persisted expenses, fingerprinted through the same
/// coercion rules extraction uses: NULL optional text becomes a trimmed
/// empty string, NULL dates become "", NULL amount becomes 0.0.
///
/// Returns `external_code -> fingerprint`. Legacy rows with an empty
/// external code are kept, keyed by `""` like any other code — dropping
/// them would re-classify the matching fresh row as INSERT on every run.
pub fn load_expense_snapshot(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT external_code, term, rubric, category, tax_id, payee,
                expense_doc_type, description, payment_doc_type,
                payment_date, debit_date, amount, composite_key
         FROM expenses
         WHERE external_code IS NOT NULL",
    )?;

    let rows = stmt.query_map([], |row| {
        let expense_doc_type: Option<String> = row.get(6)?;
        let description: Option<String> = row.get(7)?;
        let payment_doc_type: Option<String> = row.get(8)?;
        let debit_date: Option<String> = row.get(10)?;
        let amount: Option<f64> = row.get(11)?;

        Ok(ExpenseRecord {
            external_code: row.get(0)?,
            term: row.get(1)?,
            rubric: row.get(2)?,
            category: row.get(3)?,
            tax_id: row.get(4)?,
            payee: row.get(5)?,
            expense_doc_type: expense_doc_type.unwrap_or_default().trim().to_string(),
            description: description.unwrap_or_default().trim().to_string(),
            payment_doc_type: payment_doc_type.unwrap_or_default().trim().to_string(),
            payment_date: row.get(9)?,
            debit_date: debit_date.unwrap_or_default(),
            amount: amount.unwrap_or(0.0),
            composite_key: row.get(12)?,
        })
    })?;

    let mut snapshot = HashMap::new();
    for row in rows {
        let record = row?;
        snapshot.insert(record.external_code.clone(), fingerprint(&record));
    }

    Ok(snapshot)
}

/// Persisted financial yield per SIT number (keys normalized by the
/// caller's join, values raw). Duplicate SIT rows are last-read-wins,
/// same as the translator.
pub fn load_term_yields(conn: &Connection) -> Result<HashMap<String, f64>> {
    let mut stmt = conn.prepare("SELECT sit_number, financial_yield FROM terms")?;
    let rows = stmt.query_map([], |row| {
        let sit: String = row.get(0)?;
        let yield_value: Option<f64> = row.get(1)?;
        Ok((sit, yield_value.unwrap_or(0.0)))
    })?;

    let mut yields = HashMap::new();
    for row in rows {
        let (sit, value) = row?;
        yields.insert(crate::normalize::normalize_key(sit), value);
    }

    Ok(yields)
}

/// Persisted reversed amount per composite rubric key.
pub fn load_rubric_reversals(conn: &Connection) -> Result<HashMap<String, f64>> {
    let mut stmt = conn.prepare("SELECT composite_key, reversed_amount FROM rubrics")?;
    let rows = stmt.query_map([], |row| {
        let key: String = row.get(0)?;
        let amount: Option<f64> = row.get(1)?;
        Ok((key, amount.unwrap_or(0.0)))
    })?;

    let mut reversals = HashMap::new();
    for row in rows {
        let (key, amount) = row?;
        reversals.insert(key, amount);
    }

    Ok(reversals)
}

// ============================================================================
// WRITES (load stage)
// ============================================================================

pub fn insert_expense(conn: &Connection, record: &ExpenseRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO expenses (
            external_code, term, rubric, category, tax_id, payee,
            expense_doc_type, description, payment_doc_type,
            payment_date, debit_date, amount, composite_key
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.external_code,
            record.term,
            record.rubric,
            record.category,
            record.tax_id,
            record.payee,
            record.expense_doc_type,
            record.description,
            record.payment_doc_type,
            record.payment_date,
            nullable(&record.debit_date),
            record.amount,
            record.composite_key,
        ],
    )?;
    Ok(())
}

pub fn update_expense(conn: &Connection, record: &ExpenseRecord) -> Result<()> {
    conn.execute(
        "UPDATE expenses SET
            term = ?1, rubric = ?2, category = ?3, tax_id = ?4, payee = ?5,
            expense_doc_type = ?6, description = ?7, payment_doc_type = ?8,
            payment_date = ?9, debit_date = ?10, amount = ?11, composite_key = ?12
         WHERE external_code = ?13",
        params![
            record.term,
            record.rubric,
            record.category,
            record.tax_id,
            record.payee,
            record.expense_doc_type,
            record.description,
            record.payment_doc_type,
            record.payment_date,
            nullable(&record.debit_date),
            record.amount,
            record.composite_key,
            record.external_code,
        ],
    )?;
    Ok(())
}

pub fn update_term_yield(conn: &Connection, sit_number: &str, financial_yield: f64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE terms SET financial_yield = ?1 WHERE sit_number = ?2",
        params![financial_yield, sit_number],
    )?;
    Ok(affected)
}

pub fn update_rubric_reversal(
    conn: &Connection,
    composite_key: &str,
    reversed_amount: f64,
) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE rubrics SET reversed_amount = ?1 WHERE composite_key = ?2",
        params![reversed_amount, composite_key],
    )?;
    Ok(affected)
}

pub fn count_expenses(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
    Ok(count)
}

/// Empty optional strings are stored as NULL so the round-trip coercion
/// (NULL → "") is symmetric.
fn nullable(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
