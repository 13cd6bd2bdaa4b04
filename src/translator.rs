// 🗺️ Identifier translation
// The source system keys summary reports by SIT number; the store keys
// terms and rubrics by the internal term id. This map bridges the two.

use crate::error::Result;
use crate::normalize::normalize_key;
use rusqlite::Connection;
use std::collections::HashMap;

/// In-memory SIT → term map built from the authoritative `terms` table,
/// read once per run.
#[derive(Debug, Clone, Default)]
pub struct TermTranslator {
    map: HashMap<String, String>,
}

impl TermTranslator {
    /// Read the full term table and normalize both columns.
    ///
    /// Duplicate SIT numbers are last-read-wins: the table is expected to
    /// be 1:1 but this is not enforced, and the overwrite is the pinned
    /// policy (see `test_duplicate_sit_last_read_wins`). A read failure
    /// aborts the whole rubric reconciliation, there is no partial map.
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT sit_number, term_id FROM terms")?;
        let rows = stmt.query_map([], |row| {
            let sit: String = row.get(0)?;
            let term: String = row.get(1)?;
            Ok((sit, term))
        })?;

        let mut map = HashMap::new();
        for row in rows {
            let (sit, term) = row?;
            map.insert(normalize_key(sit), normalize_key(term));
        }

        Ok(TermTranslator { map })
    }

    /// Build from explicit pairs (tests, tooling). Same normalization and
    /// last-wins policy as `load`.
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut map = HashMap::new();
        for (sit, term) in pairs {
            map.insert(normalize_key(sit.as_ref()), normalize_key(term.as_ref()));
        }
        TermTranslator { map }
    }

    /// Internal term id for a SIT number, if the grant is known.
    pub fn resolve(&self, sit_number: &str) -> Option<&str> {
        self.map.get(&normalize_key(sit_number)).map(|s| s.as_str())
    }

    /// Composite rubric key on the *translated* term id:
    /// `term + "-" + rubric`. None when the SIT number is unmapped —
    /// the caller skips (and counts) those rows rather than failing.
    pub fn composite_key(&self, sit_number: &str, rubric: &str) -> Option<String> {
        self.resolve(sit_number)
            .map(|term| format!("{term}-{rubric}"))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::setup_database;

    #[test]
    fn test_composite_key_derivation() {
        let translator = TermTranslator::from_pairs([("57884", "6373")]);

        assert_eq!(
            translator.composite_key("57884", "3.3.90"),
            Some("6373-3.3.90".to_string())
        );

        println!("✅ Composite key derivation test PASSED");
    }

    #[test]
    fn test_unmapped_sit_resolves_to_none() {
        // Unmapped SIT is a skip, not an error
        let translator = TermTranslator::from_pairs([("57884", "6373")]);

        assert_eq!(translator.resolve("99999"), None);
        assert_eq!(translator.composite_key("99999", "3.3.90"), None);

        println!("✅ Unmapped SIT test PASSED");
    }

    #[test]
    fn test_keys_normalized_on_both_sides() {
        let translator = TermTranslator::from_pairs([("57884.0", "6373.0")]);

        assert_eq!(translator.resolve("57884"), Some("6373"));
        assert_eq!(translator.resolve("57884.0"), Some("6373"));

        println!("✅ Translator normalization test PASSED");
    }

    #[test]
    fn test_duplicate_sit_last_read_wins() {
        // Pinned policy: the term table is expected 1:1 on SIT, but a
        // duplicate silently keeps the last row read
        let translator = TermTranslator::from_pairs([("57884", "6373"), ("57884", "9999")]);

        assert_eq!(translator.len(), 1);
        assert_eq!(translator.resolve("57884"), Some("9999"));

        println!("✅ Duplicate SIT policy test PASSED");
    }

    #[test]
    fn test_load_from_storage() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        conn.execute(
            "INSERT INTO terms (term_id, sit_number, financial_yield) VALUES (?1, ?2, ?3)",
            rusqlite::params!["6373", "57884.0", 0.0],
        )
        .unwrap();

        let translator = TermTranslator::load(&conn).unwrap();

        assert_eq!(translator.len(), 1);
        assert_eq!(translator.resolve("57884"), Some("6373"));

        println!("✅ Translator storage load test PASSED");
    }
}
