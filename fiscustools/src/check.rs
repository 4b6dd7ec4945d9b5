use anyhow::Context;
use fiscus_ledger_engine::{checks::run_all_checks, SqliteDatabase};

pub async fn connect(database_url: Option<&str>) -> anyhow::Result<SqliteDatabase> {
    let db = match database_url {
        Some(url) => SqliteDatabase::new_with_url(url, 1).await,
        None => SqliteDatabase::new(1).await,
    };
    db.context("Could not open the ledger database")
}

pub async fn run_checks(database_url: Option<&str>, fix: bool) -> anyhow::Result<()> {
    let db = connect(database_url).await?;
    let report = run_all_checks(&db, fix).await.context("Check run aborted")?;
    for outcome in &report.outcomes {
        let verdict = match (outcome.stats.violations, outcome.stats.remaining()) {
            (0, _) => "ok".to_string(),
            (v, 0) => format!("{v} violations, all fixed"),
            (v, r) => format!("{v} violations, {r} remaining"),
        };
        println!("{:<40} {verdict} ({} ms)", outcome.name, outcome.elapsed_ms);
    }
    println!("{} checks, {} violations, {} fixed", report.outcomes.len(), report.total_violations(), report.total_fixed());
    db.close().await;
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
