use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::io::{self, BufRead, Write};

use grants_etl::{setup_database, Config, Pipeline, RunSummary};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    let assume_yes = args.iter().any(|a| a == "--yes" || a == "-y");

    let config = Config::from_env().context("pipeline configuration is incomplete")?;
    config.validate()?;

    let pipeline = Pipeline::new(&config);

    println!("🏁 Grants ETL v{}", grants_etl::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match command {
        "run" => {
            let summary = pipeline.run(|s| assume_yes || confirm_load(s))?;
            finish(&config, &summary)?;
        }
        "extract" => {
            let mut summary = RunSummary::default();
            pipeline.extract(&mut summary)?;
            finish(&config, &summary)?;
        }
        "transform" => {
            let mut summary = RunSummary::default();
            pipeline.transform(&mut summary)?;
            finish(&config, &summary)?;
        }
        "load" => {
            let mut summary = RunSummary::default();
            pipeline.load(&mut summary)?;
            finish(&config, &summary)?;
        }
        "init-db" => {
            let conn = Connection::open(&config.db_path)?;
            setup_database(&conn)?;
            println!("✅ Database initialized at {}", config.db_path.display());
        }
        other => {
            eprintln!("❌ Unknown command: {other}");
            eprintln!("   Usage: grants-etl [run|extract|transform|load|init-db] [--yes]");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Show the staged diff and ask for an explicit go-ahead before touching
/// the store. Anything other than YES cancels.
fn confirm_load(summary: &RunSummary) -> bool {
    println!("\n🔍 Review the staged changes before loading:");
    println!("   • INSERT (new): {} record(s)", summary.inserts);
    println!("   • UPDATE (changed): {} record(s)", summary.updates);
    println!("   • Term yields to update: {}", summary.term_updates);
    println!("   • Rubric reversals to update: {}", summary.rubric_updates);
    if summary.unmapped_sits > 0 {
        println!("   • Skipped (unmapped SIT): {}", summary.unmapped_sits);
    }

    print!("\n❓ Apply these changes? Type 'YES' to continue: ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("yes")
}

fn finish(config: &Config, summary: &RunSummary) -> Result<()> {
    let report = summary.write_report(config)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✨ Done");
    println!(
        "   Extracted: {} row(s) | Staged: {} insert(s), {} update(s), {} unchanged",
        summary.rows_extracted, summary.inserts, summary.updates, summary.unchanged
    );
    println!(
        "   Applied: {} insert(s), {} update(s), {} term(s), {} rubric(s)",
        summary.applied_inserts,
        summary.applied_updates,
        summary.applied_term_updates,
        summary.applied_rubric_updates
    );
    if summary.load_errors > 0 {
        println!("   ⚠️  {} row(s) failed during load", summary.load_errors);
    }
    println!("   📋 Report: {}", report.display());

    Ok(())
}
