// 🔑 Content fingerprint
// Deterministic hash over a fixed, ordered field tuple. Computed with the
// exact same coercions on freshly extracted rows and on rows re-read from
// storage — any asymmetry here makes the diff report every row as changed.
//
// NOTE: this is equality detection, not security. Collisions are a
// non-concern at these volumes; SHA-256 is used because it is already in
// the tree.

use crate::records::ExpenseRecord;
use sha2::{Digest, Sha256};

/// Delimiter between fields. `|` does not occur in the source reports.
const DELIMITER: char = '|';

/// Hash the canonical field tuple of an expense record.
///
/// Field order is fixed and load-bearing: term, rubric, category, tax id,
/// payee, expense doc type, description, payment doc type, payment date,
/// debit date, amount (two decimals), composite key. The external code is
/// deliberately excluded — it is the join key, not content.
pub fn fingerprint(record: &ExpenseRecord) -> String {
    let raw = format!(
        "{t}{d}{r}{d}{cat}{d}{tax}{d}{p}{d}{edt}{d}{desc}{d}{pdt}{d}{pay}{d}{deb}{d}{amt:.2}{d}{ck}",
        d = DELIMITER,
        t = record.term,
        r = record.rubric,
        cat = record.category,
        tax = record.tax_id,
        p = record.payee,
        edt = record.expense_doc_type,
        desc = record.description,
        pdt = record.payment_doc_type,
        pay = record.payment_date,
        deb = record.debit_date,
        amt = record.amount,
        ck = record.composite_key,
    );

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}
