// 🔧 Normalization helpers
// Pure coercion functions applied at the extraction boundary AND to every
// value re-read from storage. The diff only works because both sides pass
// through the exact same rules before hashing or joining.

use chrono::NaiveDate;
use std::fmt::Display;

/// Canonicalize an identifier that should hold an integer value but may
/// arrive as `"67303"`, `"67303.0"`, `67303.0` or `67303`.
///
/// Parse failures return the trimmed string form unchanged — this function
/// never fails, so it can be applied unconditionally to every key read
/// from any source.
pub fn normalize_key<V: Display>(value: V) -> String {
    let raw = value.to_string();
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => format!("{}", f.trunc() as i64),
        _ => trimmed.to_string(),
    }
}

/// Parse a localized currency string into a decimal amount.
///
/// Rules: `.` is the thousands separator, `,` is the decimal separator,
/// an optional `R$` prefix is stripped, and empty / `-` / literal-zero
/// values collapse to 0.0. Unparseable input also yields 0.0 — a single
/// bad cell never aborts the batch.
pub fn parse_localized_amount<V: Display>(value: V) -> f64 {
    let raw = value.to_string();
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed == "R$ 0,00" {
        return 0.0;
    }

    let cleaned = trimmed
        .trim_start_matches("R$")
        .trim()
        .replace('.', "")
        .replace(',', ".");

    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Strip tax-id formatting and left-pad with zeros: 11 digits for an
/// individual (CPF), 14 for an entity (CNPJ).
pub fn clean_tax_id(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 11 {
        format!("{digits:0>11}")
    } else {
        format!("{digits:0>14}")
    }
}

/// Extract the leading numeric-dotted rubric prefix from a free-text
/// expense type, e.g. `"3.3.90 - MATERIAIS DE CONSUMO"` → `"3.3.90"`.
/// Returns an empty string when the text does not start with a code.
pub fn extract_rubric(expense_type: &str) -> String {
    let trimmed = expense_type.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].trim().to_string()
}

/// Parse a day-first date (`31/12/2024`, `31-12-2024`) or an already
/// canonical `2024-12-31`. Returns None on failure — callers decide
/// whether the row is dropped (payment date) or the field stays empty
/// (debit date).
pub fn parse_day_first_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Take only the date part of a timestamp cell
    let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);

    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(date);
        }
    }
    None
}

/// Canonical storage/staging form of a date: `YYYY-MM-DD`.
pub fn sql_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Canonical form of an optional date: empty string when absent. This is
/// the representation the fingerprint hashes on both sides.
pub fn sql_date_opt(date: Option<NaiveDate>) -> String {
    date.map(sql_date).unwrap_or_default()
}
