// 🏁 Pipeline orchestration
// Extract → Transform (reconcile) → Load, strictly sequential. Each stage
// can also run as a standalone invocation — stages only communicate through
// staging artifacts and the database, never in-memory.

use crate::config::Config;
use crate::error::Result;
use crate::extract::Extractor;
use crate::ingest::sync_downloads;
use crate::normalize::normalize_key;
use crate::reconcile::{Decision, ReconcileEngine};
use crate::staging::{
    StagingArea, RUBRICS_UPDATE_FILE, TERMS_UPDATE_FILE, UPLOAD_FILE,
};
use crate::storage;
use crate::translator::TermTranslator;
use rusqlite::Connection;
use serde::Serialize;

/// Counters aggregated across one run. Row-level and unmapped-identifier
/// conditions surface here instead of escalating as errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub rows_extracted: usize,
    pub rows_dropped_no_date: usize,
    pub rows_dropped_no_keys: usize,

    pub inserts: usize,
    pub updates: usize,
    pub unchanged: usize,
    pub term_updates: usize,
    pub rubric_updates: usize,
    pub unmapped_sits: usize,

    pub load_errors: usize,
    pub applied_inserts: usize,
    pub applied_updates: usize,
    pub applied_term_updates: usize,
    pub applied_rubric_updates: usize,
}

impl RunSummary {
    /// Anything staged for the load stage?
    pub fn has_pending_changes(&self) -> bool {
        self.inserts + self.updates + self.term_updates + self.rubric_updates > 0
    }

    /// Persist the summary as JSON in the logs dir, named by timestamp.
    pub fn write_report(&self, config: &Config) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(&config.logs_dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = config.logs_dir.join(format!("run_{stamp}.json"));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    staging: StagingArea,
    engine: ReconcileEngine,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Pipeline {
            staging: StagingArea::new(&config.staging_dir),
            engine: ReconcileEngine::with_tolerance(config.amount_tolerance),
            config,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    // ========================================================================
    // STAGE 1: EXTRACT
    // ========================================================================

    /// Sync the inbox, consolidate expense exports and summary reports,
    /// and write the post-extraction staging artifacts. Returns false when
    /// no source data was found at all.
    pub fn extract(&self, summary: &mut RunSummary) -> Result<bool> {
        println!("\n📥 Stage 1/3: extraction");

        let moved = sync_downloads(self.config)?;
        if moved > 0 {
            println!("   ✅ {moved} file(s) moved into the raw dir");
        }

        let extractor = Extractor::new(self.config);

        let (records, report) = extractor.extract_expenses();
        summary.files_processed += report.files_processed;
        summary.files_skipped += report.files_skipped;
        summary.rows_extracted += report.rows_extracted;
        summary.rows_dropped_no_date += report.rows_dropped_no_date;
        summary.rows_dropped_no_keys += report.rows_dropped_no_keys;

        let (terms, rubrics, summary_files) = extractor.extract_summaries();
        summary.files_processed += summary_files;

        if records.is_empty() && terms.is_empty() && rubrics.is_empty() {
            println!("   ⚠️  No source data extracted");
            return Ok(false);
        }

        self.staging.write_general(&records)?;
        self.staging.write_term_summaries(&terms)?;
        self.staging.write_rubric_summaries(&rubrics)?;
        println!(
            "   💾 Staged {} expense rows, {} term summaries, {} rubric lines",
            records.len(),
            terms.len(),
            rubrics.len()
        );

        Ok(true)
    }

    // ========================================================================
    // STAGE 2: TRANSFORM (RECONCILE)
    // ========================================================================

    /// Diff the staged row sets against the persisted state and write the
    /// action-tagged update artifacts. Returns false when the store is
    /// already in sync (nothing staged for load).
    pub fn transform(&self, summary: &mut RunSummary) -> Result<bool> {
        println!("\n⚖️  Stage 2/3: reconciliation");

        let conn = Connection::open(&self.config.db_path)?;

        self.reconcile_expenses(&conn, summary)?;
        self.reconcile_terms(&conn, summary)?;
        self.reconcile_rubrics(&conn, summary)?;

        if summary.has_pending_changes() {
            Ok(true)
        } else {
            println!("   ✅ Store already in sync, nothing to load");
            Ok(false)
        }
    }

    fn reconcile_expenses(&self, conn: &Connection, summary: &mut RunSummary) -> Result<()> {
        if !self.staging.exists(crate::staging::GENERAL_FILE) {
            println!("   ℹ️  No expense artifact staged, skipping expense diff");
            return Ok(());
        }

        let fresh = self.staging.read_general()?;
        let snapshot = storage::load_expense_snapshot(conn)?;
        println!("   📦 {} persisted expense rows loaded", snapshot.len());

        let diff = self.engine.reconcile_expenses(&fresh, &snapshot);
        summary.inserts = diff.inserts.len();
        summary.updates = diff.updates.len();
        summary.unchanged = diff.unchanged;

        println!(
            "   📊 INSERT: {} | UPDATE: {} | UNCHANGED: {}",
            diff.inserts.len(),
            diff.updates.len(),
            diff.unchanged
        );

        if diff.is_empty() {
            // A stale artifact from a previous run must not be re-applied
            self.staging.remove(UPLOAD_FILE)?;
        } else {
            self.staging.write_upload(&diff)?;
        }

        Ok(())
    }

    fn reconcile_terms(&self, conn: &Connection, summary: &mut RunSummary) -> Result<()> {
        if !self.staging.exists(crate::staging::TERMS_SUMMARY_FILE) {
            return Ok(());
        }

        // Keys re-normalized on read: the staged file is a source too
        let fresh: Vec<(String, f64)> = self
            .staging
            .read_term_summaries()?
            .into_iter()
            .map(|t| (normalize_key(t.sit_number), t.financial_yield))
            .collect();

        let persisted = storage::load_term_yields(conn)?;
        let updates = self.engine.reconcile_amounts(&fresh, &persisted);
        summary.term_updates = updates.len();

        if updates.is_empty() {
            self.staging.remove(TERMS_UPDATE_FILE)?;
            println!("   ✅ Term yields in sync");
        } else {
            self.staging.write_term_updates(&updates)?;
            println!("   ⚠️  {} divergent term yield(s) staged", updates.len());
        }

        Ok(())
    }

    fn reconcile_rubrics(&self, conn: &Connection, summary: &mut RunSummary) -> Result<()> {
        if !self.staging.exists(crate::staging::RUBRICS_SUMMARY_FILE) {
            return Ok(());
        }

        let translator = TermTranslator::load(conn)?;

        // Join on the translated composite key; rows whose SIT number has
        // no translation are skipped and counted, never escalated
        let mut fresh = Vec::new();
        for reversal in self.staging.read_rubric_summaries()? {
            match translator.composite_key(&reversal.sit_number, &reversal.rubric) {
                Some(key) => fresh.push((key, reversal.reversed_amount)),
                None => summary.unmapped_sits += 1,
            }
        }

        if summary.unmapped_sits > 0 {
            println!("   ⚠️  {} rubric line(s) with unmapped SIT skipped", summary.unmapped_sits);
        }

        let persisted = storage::load_rubric_reversals(conn)?;
        let updates = self.engine.reconcile_amounts(&fresh, &persisted);
        summary.rubric_updates = updates.len();

        if updates.is_empty() {
            self.staging.remove(RUBRICS_UPDATE_FILE)?;
            println!("   ✅ Rubric reversals in sync");
        } else {
            self.staging.write_rubric_updates(&updates)?;
            println!("   ⚠️  {} divergent rubric reversal(s) staged", updates.len());
        }

        Ok(())
    }

    // ========================================================================
    // STAGE 3: LOAD
    // ========================================================================

    /// Apply the staged changes. Each applied artifact is renamed to its
    /// processed marker or deleted so a re-run cannot double-apply.
    /// Returns false when there was nothing staged.
    pub fn load(&self, summary: &mut RunSummary) -> Result<bool> {
        println!("\n📤 Stage 3/3: load");

        let conn = Connection::open(&self.config.db_path)?;
        let mut applied_any = false;

        if self.staging.exists(UPLOAD_FILE) {
            applied_any |= self.apply_expenses(&conn, summary)?;
        }
        if self.staging.exists(TERMS_UPDATE_FILE) {
            applied_any |= self.apply_term_updates(&conn, summary)?;
        }
        if self.staging.exists(RUBRICS_UPDATE_FILE) {
            applied_any |= self.apply_rubric_updates(&conn, summary)?;
        }

        if !applied_any {
            println!("   ℹ️  Nothing staged, store already in sync");
        }

        Ok(applied_any)
    }

    fn apply_expenses(&self, conn: &Connection, summary: &mut RunSummary) -> Result<bool> {
        let staged = self.staging.read_upload()?;
        if staged.is_empty() {
            self.staging.remove(UPLOAD_FILE)?;
            return Ok(false);
        }

        for (decision, record) in &staged {
            let result = match decision {
                Decision::Insert => storage::insert_expense(conn, record),
                Decision::Update => storage::update_expense(conn, record),
                // Never staged; tolerated on re-read for forward compat
                Decision::Unchanged => continue,
            };

            match result {
                Ok(()) => match decision {
                    Decision::Insert => summary.applied_inserts += 1,
                    Decision::Update => summary.applied_updates += 1,
                    Decision::Unchanged => {}
                },
                Err(e) => {
                    summary.load_errors += 1;
                    println!("   ❌ Row {} failed: {e}", record.external_code);
                }
            }
        }

        println!(
            "   🚀 INSERT: {} | UPDATE: {}",
            summary.applied_inserts, summary.applied_updates
        );

        self.staging.mark_processed(UPLOAD_FILE)?;
        println!("   💾 Upload artifact renamed to its processed marker");

        Ok(true)
    }

    fn apply_term_updates(&self, conn: &Connection, summary: &mut RunSummary) -> Result<bool> {
        let updates = self.staging.read_term_updates()?;
        for update in &updates {
            match storage::update_term_yield(conn, &update.key, update.value) {
                Ok(affected) => summary.applied_term_updates += affected,
                Err(e) => {
                    summary.load_errors += 1;
                    println!("   ❌ Term {} failed: {e}", update.key);
                }
            }
        }

        println!("   ✅ {} term yield(s) updated", summary.applied_term_updates);
        self.staging.remove(TERMS_UPDATE_FILE)?;
        Ok(!updates.is_empty())
    }

    fn apply_rubric_updates(&self, conn: &Connection, summary: &mut RunSummary) -> Result<bool> {
        let updates = self.staging.read_rubric_updates()?;
        for update in &updates {
            match storage::update_rubric_reversal(conn, &update.key, update.value) {
                Ok(affected) => summary.applied_rubric_updates += affected,
                Err(e) => {
                    summary.load_errors += 1;
                    println!("   ❌ Rubric {} failed: {e}", update.key);
                }
            }
        }

        println!("   ✅ {} rubric reversal(s) updated", summary.applied_rubric_updates);
        self.staging.remove(RUBRICS_UPDATE_FILE)?;
        Ok(!updates.is_empty())
    }

    // ========================================================================
    // FULL RUN
    // ========================================================================

    /// End-to-end run. The confirmation callback sits between transform
    /// and load so a human can review the staged diff; `|_| true` skips it.
    pub fn run(&self, confirm: impl FnOnce(&RunSummary) -> bool) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if !self.extract(&mut summary)? {
            return Ok(summary);
        }

        if !self.transform(&mut summary)? {
            return Ok(summary);
        }

        if !confirm(&summary) {
            println!("\n❌ Load cancelled, staged artifacts kept for review");
            return Ok(summary);
        }

        self.load(&mut summary)?;

        Ok(summary)
    }
}
