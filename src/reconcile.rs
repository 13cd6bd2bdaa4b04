// ⚖️ Reconciliation Engine
// Diffs a freshly extracted dataset against the persisted snapshot and
// classifies every record as INSERT, UPDATE or UNCHANGED. Rows present in
// storage but absent from the extract are left untouched — nothing is ever
// classified DELETE.

use crate::fingerprint::fingerprint;
use crate::records::ExpenseRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// DECISION
// ============================================================================

/// Classification of one fresh record relative to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Insert,
    Update,
    Unchanged,
}

impl Decision {
    /// Action tag carried by the staging artifact.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Insert => "INSERT",
            Decision::Update => "UPDATE",
            Decision::Unchanged => "UNCHANGED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "INSERT" => Some(Decision::Insert),
            "UPDATE" => Some(Decision::Update),
            "UNCHANGED" => Some(Decision::Unchanged),
            _ => None,
        }
    }
}

// ============================================================================
// EXPENSE PATH
// ============================================================================

/// Outcome of the expense diff. `inserts` and `updates` preserve the input
/// order of the fresh row set; unchanged rows are dropped entirely and
/// only counted.
#[derive(Debug, Clone, Default)]
pub struct ExpenseDiff {
    pub inserts: Vec<ExpenseRecord>,
    pub updates: Vec<ExpenseRecord>,
    pub unchanged: usize,
}

impl ExpenseDiff {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }

    pub fn changed(&self) -> usize {
        self.inserts.len() + self.updates.len()
    }
}

/// One divergent summary pair: key plus the fresh value to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountUpdate {
    pub key: String,
    pub value: f64,
}

pub struct ReconcileEngine {
    /// Tolerance for amount comparisons (default 0.01 currency unit),
    /// absorbing float/rounding noise from currency parsing.
    pub tolerance: f64,
}

impl ReconcileEngine {
    pub fn new() -> Self {
        ReconcileEngine { tolerance: 0.01 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconcileEngine { tolerance }
    }

    /// Classify every fresh expense row against the persisted snapshot
    /// (`external_code -> fingerprint`, see `storage::load_expense_snapshot`).
    ///
    /// - code absent from the snapshot → INSERT
    /// - fingerprint differs → UPDATE
    /// - fingerprint matches → UNCHANGED (dropped, counted)
    ///
    /// The three sets partition the fresh input; re-running against a
    /// snapshot that already absorbed this output yields an empty diff.
    pub fn reconcile_expenses(
        &self,
        fresh: &[ExpenseRecord],
        snapshot: &HashMap<String, String>,
    ) -> ExpenseDiff {
        let mut diff = ExpenseDiff::default();

        for record in fresh {
            match self.classify_expense(record, snapshot) {
                Decision::Insert => diff.inserts.push(record.clone()),
                Decision::Update => diff.updates.push(record.clone()),
                Decision::Unchanged => diff.unchanged += 1,
            }
        }

        diff
    }

    /// Classification for a single row.
    pub fn classify_expense(
        &self,
        record: &ExpenseRecord,
        snapshot: &HashMap<String, String>,
    ) -> Decision {
        match snapshot.get(&record.external_code) {
            None => Decision::Insert,
            Some(persisted) if *persisted != fingerprint(record) => Decision::Update,
            Some(_) => Decision::Unchanged,
        }
    }

    /// Inner-join amount comparison used by both the term-yield and the
    /// rubric-reversal paths. Fresh keys must already be normalized (the
    /// rubric path additionally translated, see `TermTranslator`).
    ///
    /// Keys without a persisted match are silently excluded; a pair is
    /// divergent only when `|fresh - persisted|` strictly exceeds the
    /// tolerance, so a diff of exactly 0.01 stays UNCHANGED. The epsilon
    /// absorbs f64 subtraction noise: `100.01 - 100.0` lands a hair above
    /// 0.01 even though the amounts differ by exactly one cent.
    pub fn reconcile_amounts(
        &self,
        fresh: &[(String, f64)],
        persisted: &HashMap<String, f64>,
    ) -> Vec<AmountUpdate> {
        fresh
            .iter()
            .filter_map(|(key, value)| {
                let existing = persisted.get(key)?;
                if (value - existing).abs() - self.tolerance > 1e-9 {
                    Some(AmountUpdate {
                        key: key.clone(),
                        value: *value,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

impl Default for ReconcileEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(code: &str, amount: f64) -> ExpenseRecord {
        ExpenseRecord {
            external_code: code.to_string(),
            term: "6373".to_string(),
            rubric: "3.3.90".to_string(),
            category: "CONSUMABLES".to_string(),
            tax_id: "12345678909".to_string(),
            payee: "FORNECEDOR LTDA".to_string(),
            expense_doc_type: "NF".to_string(),
            description: "Compra de material".to_string(),
            payment_doc_type: "TED".to_string(),
            payment_date: "2024-12-31".to_string(),
            debit_date: String::new(),
            amount,
            composite_key: "6373-3.3.90".to_string(),
        }
    }

    #[test]
    fn test_insert_unchanged_update_paths() {
        // Absent → INSERT, identical → UNCHANGED, changed amount → UPDATE
        let engine = ReconcileEngine::new();
        let fresh = vec![sample_record("A1", 100.0)];

        // Not present in the snapshot
        let empty = HashMap::new();
        let diff = engine.reconcile_expenses(&fresh, &empty);
        assert_eq!(diff.inserts.len(), 1);
        assert!(diff.updates.is_empty());
        assert_eq!(diff.unchanged, 0);

        // Present with identical hashed fields
        let mut snapshot = HashMap::new();
        snapshot.insert("A1".to_string(), fingerprint(&sample_record("A1", 100.0)));
        let diff = engine.reconcile_expenses(&fresh, &snapshot);
        assert!(diff.is_empty());
        assert_eq!(diff.unchanged, 1);

        // Present with a different persisted amount
        snapshot.insert("A1".to_string(), fingerprint(&sample_record("A1", 90.0)));
        let diff = engine.reconcile_expenses(&fresh, &snapshot);
        assert!(diff.inserts.is_empty());
        assert_eq!(diff.updates.len(), 1);

        println!("✅ Diff classification paths test PASSED");
    }

    #[test]
    fn test_classification_partitions_input() {
        // Every fresh row lands in exactly one set
        let engine = ReconcileEngine::new();
        let fresh = vec![
            sample_record("A1", 100.0), // unchanged
            sample_record("A2", 50.0),  // update
            sample_record("A3", 10.0),  // insert
        ];

        let mut snapshot = HashMap::new();
        snapshot.insert("A1".to_string(), fingerprint(&fresh[0]));
        snapshot.insert("A2".to_string(), fingerprint(&sample_record("A2", 45.0)));

        let diff = engine.reconcile_expenses(&fresh, &snapshot);

        assert_eq!(diff.inserts.len() + diff.updates.len() + diff.unchanged, fresh.len());
        assert_eq!(diff.inserts[0].external_code, "A3");
        assert_eq!(diff.updates[0].external_code, "A2");
        assert_eq!(diff.unchanged, 1);

        println!("✅ Classification partition test PASSED");
    }

    #[test]
    fn test_input_order_preserved() {
        let engine = ReconcileEngine::new();
        let fresh: Vec<ExpenseRecord> = (0..5)
            .map(|i| sample_record(&format!("N{i}"), i as f64))
            .collect();

        let diff = engine.reconcile_expenses(&fresh, &HashMap::new());

        let codes: Vec<&str> = diff.inserts.iter().map(|r| r.external_code.as_str()).collect();
        assert_eq!(codes, vec!["N0", "N1", "N2", "N3", "N4"]);

        println!("✅ Stable ordering test PASSED");
    }

    #[test]
    fn test_tolerance_boundary_is_strict() {
        // Exactly 0.01 is UNCHANGED, anything beyond is UPDATE
        let engine = ReconcileEngine::new();
        let mut persisted = HashMap::new();
        persisted.insert("57884".to_string(), 100.0);

        let at_boundary = vec![("57884".to_string(), 100.01)];
        assert!(engine.reconcile_amounts(&at_boundary, &persisted).is_empty());

        let beyond = vec![("57884".to_string(), 100.011)];
        let updates = engine.reconcile_amounts(&beyond, &persisted);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, 100.011);

        println!("✅ Tolerance boundary test PASSED");
    }

    #[test]
    fn test_one_cent_diff_survives_float_noise() {
        // Subtraction noise on cent-representable amounts must not push a
        // one-cent difference over the tolerance
        let engine = ReconcileEngine::new();

        for (persisted_amount, fresh_amount) in
            [(100.0, 100.01), (10.10, 10.11), (1200.50, 1200.49), (0.01, 0.02)]
        {
            let mut persisted = HashMap::new();
            persisted.insert("6373".to_string(), persisted_amount);
            let fresh = vec![("6373".to_string(), fresh_amount)];
            assert!(
                engine.reconcile_amounts(&fresh, &persisted).is_empty(),
                "{persisted_amount} vs {fresh_amount} flagged as divergent"
            );
        }

        // Two cents is a real divergence
        let mut persisted = HashMap::new();
        persisted.insert("6373".to_string(), 10.10);
        let fresh = vec![("6373".to_string(), 10.12)];
        assert_eq!(engine.reconcile_amounts(&fresh, &persisted).len(), 1);

        println!("✅ Float noise tolerance test PASSED");
    }

    #[test]
    fn test_amounts_inner_join_excludes_unmatched() {
        let engine = ReconcileEngine::new();
        let mut persisted = HashMap::new();
        persisted.insert("57884".to_string(), 100.0);

        let fresh = vec![
            ("57884".to_string(), 200.0), // divergent, matched
            ("99999".to_string(), 999.0), // no persisted counterpart
        ];

        let updates = engine.reconcile_amounts(&fresh, &persisted);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, "57884");

        println!("✅ Inner join exclusion test PASSED");
    }

    #[test]
    fn test_decision_round_trip() {
        for decision in [Decision::Insert, Decision::Update, Decision::Unchanged] {
            assert_eq!(Decision::parse(decision.as_str()), Some(decision));
        }
        assert_eq!(Decision::parse("DELETE"), None);

        println!("✅ Decision tag test PASSED");
    }
}
