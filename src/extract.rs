// 📥 Extraction stage
// Consolidates per-grant expense exports and the semi-structured financial
// summary reports into normalized, typed row sets. All column-normalization
// rules live here — downstream stages only ever see canonical values.

use crate::config::Config;
use crate::error::{EtlError, Result};
use crate::normalize::{
    clean_tax_id, extract_rubric, normalize_key, parse_day_first_date, parse_localized_amount,
    sql_date, sql_date_opt,
};
use crate::records::{ExpenseCategory, ExpenseRecord, RubricReversal, TermSummary};
use std::fs;
use std::path::Path;

// Source column headers as they appear in the exports (pt-BR).
const COL_EXTERNAL_CODE: &str = "Código";
const COL_EXPENSE_TYPE: &str = "Tipo de Despesa";
const COL_TAX_ID: &str = "CPF/CNPJ";
const COL_PAYEE: &str = "Favorecido";
const COL_EXPENSE_DOC: &str = "Tipo Documento Despesa";
const COL_DESCRIPTION: &str = "Descrição da Despesa";
const COL_PAYMENT_DOC: &str = "Tipo Documento Pagamento";
const COL_PAYMENT_DATE: &str = "Data do Pagamento";
// Known spelling variants of the debit-date column across export versions
const COL_DEBIT_DATE: &str = "Data Débito Conta Convênio";
const COL_DEBIT_DATE_TYPO: &str = "Data Débito Conta Convêvio";
const COL_AMOUNT: &str = "Valor";

// Section sentinels in the summary reports.
const SIT_SENTINEL: &str = "Nº SIT";
const YIELD_SECTION: &str = "Detalhes dos Rendimentos de Aplicações Financeiras";
const EXPENSE_SECTION: &str = "Detalhe das Despesas";
const TOTAL_SENTINEL: &str = "T O T A L";

/// Per-run extraction counters, surfaced in the RunSummary.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub rows_extracted: usize,
    /// Rows lacking a parseable payment date.
    pub rows_dropped_no_date: usize,
    /// Rows with an empty term or rubric (composite-key invariant).
    pub rows_dropped_no_keys: usize,
}

pub struct Extractor<'a> {
    config: &'a Config,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Extractor { config }
    }

    // ========================================================================
    // EXPENSE EXPORTS
    // ========================================================================

    /// Consolidate every known grant's expense export from the raw dir.
    /// Missing or unreadable files are skipped and counted, never fatal.
    pub fn extract_expenses(&self) -> (Vec<ExpenseRecord>, ExtractReport) {
        let mut records = Vec::new();
        let mut report = ExtractReport::default();

        for (sit, term) in &self.config.sit_term_map {
            let path = self.config.raw_dir.join(format!("Despesas_SIT_{sit}.csv"));

            if !path.exists() {
                println!("   ⚠️  File not found: {}", path.display());
                report.files_skipped += 1;
                continue;
            }

            match self.extract_expense_file(&path, term, &mut report) {
                Ok(mut rows) => {
                    println!("   ✅ SIT {} - {} rows extracted", sit, rows.len());
                    report.rows_extracted += rows.len();
                    report.files_processed += 1;
                    records.append(&mut rows);
                }
                Err(e) => {
                    println!("   ❌ Failed to process {}: {e}", path.display());
                    report.files_skipped += 1;
                }
            }
        }

        (records, report)
    }

    /// Normalize one export. The file's SIT number only picks the term id;
    /// every row in the file belongs to that term.
    fn extract_expense_file(
        &self,
        path: &Path,
        term: &str,
        report: &mut ExtractReport,
    ) -> Result<Vec<ExpenseRecord>> {
        let content = read_text(path)?;
        let mut reader = csv::Reader::from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);

        let idx_payment_date = column(COL_PAYMENT_DATE).ok_or_else(|| EtlError::Malformed {
            path: path.to_path_buf(),
            detail: format!("column '{COL_PAYMENT_DATE}' missing"),
        })?;
        let idx_debit_date = column(COL_DEBIT_DATE).or_else(|| column(COL_DEBIT_DATE_TYPO));

        let idx_code = column(COL_EXTERNAL_CODE);
        let idx_type = column(COL_EXPENSE_TYPE);
        let idx_tax = column(COL_TAX_ID);
        let idx_payee = column(COL_PAYEE);
        let idx_expense_doc = column(COL_EXPENSE_DOC);
        let idx_description = column(COL_DESCRIPTION);
        let idx_payment_doc = column(COL_PAYMENT_DOC);
        let idx_amount = column(COL_AMOUNT);

        let mut records = Vec::new();

        for row in reader.records() {
            let row = row?;
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i)).unwrap_or_default().trim().to_string()
            };

            // Rows without a payment date are dropped, not defaulted
            let payment_date = match parse_day_first_date(row.get(idx_payment_date).unwrap_or_default()) {
                Some(date) => sql_date(date),
                None => {
                    report.rows_dropped_no_date += 1;
                    continue;
                }
            };
            let debit_date =
                sql_date_opt(idx_debit_date.and_then(|i| row.get(i)).and_then(parse_day_first_date));

            let expense_type = cell(idx_type);
            let rubric = extract_rubric(&expense_type);
            let category =
                ExpenseCategory::classify(&expense_type, &self.config.category_markers);

            if term.is_empty() || rubric.is_empty() {
                report.rows_dropped_no_keys += 1;
                continue;
            }

            // Amounts in the expense export are plain decimals, unlike
            // the localized summary reports; a bad cell defaults to 0.0
            let amount = cell(idx_amount).parse::<f64>().unwrap_or(0.0);

            records.push(ExpenseRecord {
                external_code: cell(idx_code),
                term: term.to_string(),
                rubric: rubric.clone(),
                category: category.as_str().to_string(),
                tax_id: clean_tax_id(&cell(idx_tax)),
                payee: cell(idx_payee),
                expense_doc_type: cell(idx_expense_doc),
                description: cell(idx_description),
                payment_doc_type: cell(idx_payment_doc),
                payment_date,
                debit_date,
                amount,
                composite_key: format!("{term}-{rubric}"),
            });
        }

        Ok(records)
    }

    // ========================================================================
    // FINANCIAL SUMMARY REPORTS
    // ========================================================================

    /// Scan the raw dir for `;`-delimited summary reports and extract the
    /// per-term financial yield plus per-rubric reversed amounts. Files
    /// without the SIT sentinel (e.g. the expense exports) are ignored.
    pub fn extract_summaries(&self) -> (Vec<TermSummary>, Vec<RubricReversal>, usize) {
        let mut terms = Vec::new();
        let mut rubrics = Vec::new();
        let mut files_processed = 0;

        let entries = match fs::read_dir(&self.config.raw_dir) {
            Ok(entries) => entries,
            Err(e) => {
                println!("   ❌ Cannot read raw dir: {e}");
                return (terms, rubrics, 0);
            }
        };

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        paths.sort();

        for path in paths {
            let content = match read_text(&path) {
                Ok(content) => content,
                Err(e) => {
                    println!("   ⚠️  Skipping {}: {e}", path.display());
                    continue;
                }
            };

            if let Some(summary) = parse_summary_report(&content) {
                println!(
                    "   ✅ SIT {} from '{}'",
                    summary.term.sit_number,
                    path.file_name().unwrap_or_default().to_string_lossy()
                );
                terms.push(summary.term);
                rubrics.extend(summary.rubrics);
                files_processed += 1;
            }
        }

        (terms, rubrics, files_processed)
    }
}

/// Parsed content of one summary report.
struct SummaryReport {
    term: TermSummary,
    rubrics: Vec<RubricReversal>,
}

/// Walk a summary report line by line. The format is a stack of labelled
/// `;`-delimited sections; only the SIT header, the investment-yield total
/// and the expense detail rows matter here.
fn parse_summary_report(content: &str) -> Option<SummaryReport> {
    let mut sit_number: Option<String> = None;
    let mut financial_yield = 0.0;
    let mut rubrics = Vec::new();

    let mut in_yield_section = false;
    let mut in_expense_section = false;

    for line in content.lines() {
        let line = line.trim();
        let parts: Vec<&str> = line.split(';').collect();

        if line.starts_with(SIT_SENTINEL) {
            if parts.len() > 1 {
                sit_number = Some(normalize_key(parts[1]));
            }
            continue;
        }

        let Some(sit) = sit_number.as_deref() else {
            continue;
        };

        if line.contains(YIELD_SECTION) {
            in_yield_section = true;
            continue;
        }
        if in_yield_section && line.starts_with(TOTAL_SENTINEL) {
            if parts.len() > 1 {
                financial_yield = parse_localized_amount(parts[1]);
            }
            in_yield_section = false;
        }

        if line.contains(EXPENSE_SECTION) {
            in_expense_section = true;
            continue;
        }
        if in_expense_section {
            if line.is_empty() || line.contains(TOTAL_SENTINEL) || line.starts_with("Despesa;") {
                continue;
            }
            if parts.len() >= 5 {
                let rubric = parts[0].split('-').next().unwrap_or_default().trim();
                if !rubric.is_empty() {
                    rubrics.push(RubricReversal {
                        sit_number: sit.to_string(),
                        rubric: rubric.to_string(),
                        reversed_amount: parse_localized_amount(parts[4]),
                    });
                }
            }
        }
    }

    sit_number.map(|sit| SummaryReport {
        term: TermSummary {
            sit_number: sit,
            financial_yield,
        },
        rubrics,
    })
}

/// Read a source file as text, falling back to Latin-1 when the bytes are
/// not valid UTF-8 (the summary exports ship in either encoding).
fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| EtlError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    })
}
