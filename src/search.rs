//! `loglens search`: show what retrieval would hand the model.

use anyhow::Result;

use loglens_core::retrieval::{Retrieval, NO_RESULTS};

use crate::app::App;
use crate::config::Config;

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("{}", NO_RESULTS);
        return Ok(());
    }

    let app = App::open(config).await?;
    let mut retrieval = app.retrieval();
    if let Some(k) = limit {
        retrieval = retrieval.with_top_k(k);
    }
    let result = retrieval.search(query).await?;
    app.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_retrieval(&result);
    }
    Ok(())
}

fn format_epoch(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

fn print_retrieval(result: &Retrieval) {
    if let (Some(window), Some(filter)) = (result.window, result.filter) {
        println!(
            "time filter: {} (since {})",
            window.label(),
            format_epoch(filter.since)
        );
    }

    if result.lines.is_empty() {
        println!("{}", NO_RESULTS);
        return;
    }

    for (i, line) in result.lines.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, line.score, format_epoch(line.timestamp));
        println!("    {}", line.text.trim());
    }
}
