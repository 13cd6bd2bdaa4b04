// 📋 Typed records
// Strongly-typed row structs built once at the extraction boundary.
// Downstream logic (fingerprint, diff, staging, load) only ever sees these,
// never raw cells.

use serde::{Deserialize, Serialize};

// ============================================================================
// EXPENSE CATEGORY
// ============================================================================

/// Fixed expense-category enumeration. Derived from the free-text expense
/// type by substring match (first marker wins), fallback `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Personnel,
    Charges,
    Consumables,
    Services,
    Other,
}

impl ExpenseCategory {
    /// Canonical storage/staging form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Personnel => "PERSONNEL",
            ExpenseCategory::Charges => "CHARGES",
            ExpenseCategory::Consumables => "CONSUMABLES",
            ExpenseCategory::Services => "SERVICES",
            ExpenseCategory::Other => "OTHER",
        }
    }

    /// Classify a free-text expense type against the configured markers.
    /// Matching is case-insensitive on the upper-cased text; the first
    /// marker that appears as a substring wins.
    pub fn classify(expense_type: &str, markers: &[(String, ExpenseCategory)]) -> Self {
        let upper = expense_type.to_uppercase();
        for (marker, category) in markers {
            if upper.contains(marker.as_str()) {
                return *category;
            }
        }
        ExpenseCategory::Other
    }

    /// Parse back from the canonical storage form.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "PERSONNEL" => ExpenseCategory::Personnel,
            "CHARGES" => ExpenseCategory::Charges,
            "CONSUMABLES" => ExpenseCategory::Consumables,
            "SERVICES" => ExpenseCategory::Services,
            _ => ExpenseCategory::Other,
        }
    }
}

// ============================================================================
// EXPENSE RECORD
// ============================================================================

/// One disbursement line, fully normalized.
///
/// All string fields are trimmed, dates are `YYYY-MM-DD` (empty when
/// absent), the tax id is zero-padded digits, and `composite_key` is
/// `term + "-" + rubric`. Rows where term or rubric is empty never make
/// it into a row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Source-assigned primary identifier. May be empty for legacy rows.
    pub external_code: String,

    /// Internal term (grant) identifier.
    pub term: String,

    /// Budget line code extracted from the expense type, e.g. "3.3.90".
    pub rubric: String,

    /// Canonical category form of [`ExpenseCategory`].
    pub category: String,

    /// 11-digit (individual) or 14-digit (entity) tax id.
    pub tax_id: String,

    pub payee: String,
    pub expense_doc_type: String,
    pub description: String,
    pub payment_doc_type: String,

    /// Required; rows without a parseable payment date are dropped.
    pub payment_date: String,

    /// Optional; empty when the source column is missing or unparseable.
    pub debit_date: String,

    pub amount: f64,

    /// Secondary natural key: `term + "-" + rubric`.
    pub composite_key: String,
}

impl ExpenseRecord {
    /// Invariant from the schema: the composite key exists exactly when
    /// both term and rubric are non-empty.
    pub fn has_valid_keys(&self) -> bool {
        !self.term.is_empty() && !self.rubric.is_empty()
    }

    /// Field values in the canonical staging column order
    /// (see `config::EXPENSE_COLUMNS`).
    pub fn staging_fields(&self) -> Vec<String> {
        vec![
            self.external_code.clone(),
            self.term.clone(),
            self.rubric.clone(),
            self.category.clone(),
            self.tax_id.clone(),
            self.payee.clone(),
            self.expense_doc_type.clone(),
            self.description.clone(),
            self.payment_doc_type.clone(),
            self.payment_date.clone(),
            self.debit_date.clone(),
            format!("{}", self.amount),
            self.composite_key.clone(),
        ]
    }
}

// ============================================================================
// FINANCIAL SUMMARIES
// ============================================================================

/// Per-grant rollup of investment income, keyed by the external SIT number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSummary {
    /// External identifier, canonicalized with `normalize_key`.
    pub sit_number: String,

    /// Total investment income, parsed from the localized currency form.
    pub financial_yield: f64,
}

/// Per-rubric reversed amount within a term. The composite key joins on
/// the *translated* term id, not the raw SIT number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricReversal {
    pub sit_number: String,
    pub rubric: String,
    pub reversed_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<(String, ExpenseCategory)> {
        vec![
            ("PESSOAL CIVIL".to_string(), ExpenseCategory::Personnel),
            ("OBRIGAÇÕES PATRONAIS".to_string(), ExpenseCategory::Charges),
            ("MATERIAIS DE CONSUMO".to_string(), ExpenseCategory::Consumables),
            ("SERVIÇOS DE TERCEIROS".to_string(), ExpenseCategory::Services),
        ]
    }

    #[test]
    fn test_category_classification() {
        let markers = markers();

        assert_eq!(
            ExpenseCategory::classify("3.1.90 PESSOAL CIVIL", &markers),
            ExpenseCategory::Personnel
        );
        assert_eq!(
            ExpenseCategory::classify("3.3.90 - materiais de consumo", &markers),
            ExpenseCategory::Consumables
        );
        assert_eq!(
            ExpenseCategory::classify("ALUGUEL DE IMÓVEL", &markers),
            ExpenseCategory::Other
        );

        println!("✅ Category classification test PASSED");
    }

    #[test]
    fn test_category_round_trip() {
        for category in [
            ExpenseCategory::Personnel,
            ExpenseCategory::Charges,
            ExpenseCategory::Consumables,
            ExpenseCategory::Services,
            ExpenseCategory::Other,
        ] {
            assert_eq!(ExpenseCategory::parse(category.as_str()), category);
        }

        // Unknown persisted values fall back to OTHER
        assert_eq!(ExpenseCategory::parse("LEGACY"), ExpenseCategory::Other);

        println!("✅ Category round-trip test PASSED");
    }

    #[test]
    fn test_staging_field_order_matches_schema() {
        let record = ExpenseRecord {
            external_code: "A1".to_string(),
            term: "6373".to_string(),
            rubric: "3.3.90".to_string(),
            category: "CONSUMABLES".to_string(),
            tax_id: "00000000009".to_string(),
            payee: "FORNECEDOR LTDA".to_string(),
            expense_doc_type: "NF".to_string(),
            description: "Material".to_string(),
            payment_doc_type: "TED".to_string(),
            payment_date: "2024-12-31".to_string(),
            debit_date: String::new(),
            amount: 100.0,
            composite_key: "6373-3.3.90".to_string(),
        };

        let fields = record.staging_fields();
        assert_eq!(fields.len(), crate::config::EXPENSE_COLUMNS.len());
        assert_eq!(fields[0], "A1");
        assert_eq!(fields[12], "6373-3.3.90");
        assert!(record.has_valid_keys());

        println!("✅ Staging field order test PASSED");
    }
}
