//! userdeck CLI - fetch the user list and print the derived view.
//!
//! This binary is deliberately thin: it wires the core together, applies
//! filter flags, and prints a table. All the interesting behavior lives in
//! the library.
//!
//! Usage: `userdeck [--search TEXT] [--company NAME] [--desc]`

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use userdeck::utils::truncate;
use userdeck::{ApiClient, App, Config, QueryCache, QueryStatus};

/// Column width for name/email/company cells
const CELL_WIDTH: usize = 28;

/// Initialize the tracing subscriber for logging.
/// Use the RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = Config::load()?;
    info!(base_url = %config.base_url, "userdeck starting");

    let cache = QueryCache::new();
    let api = ApiClient::new(&config)?;
    let mut app = App::new(cache, api);

    // Apply filter flags
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--search" => {
                let text = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--search requires a value"))?;
                app.on_search_change(text);
            }
            "--company" => {
                let name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--company requires a value"))?;
                app.on_company_filter_change(Some(name));
            }
            "--desc" => app.on_sort_toggle(),
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    if let Err(e) = app.refresh().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let snap = app.snapshot();
    if snap.status == QueryStatus::Error {
        eprintln!("Warning: showing last known data, the latest fetch failed");
    }

    println!(
        "{:<w$} {:<w$} {:<18} {:<w$}",
        "NAME",
        "EMAIL",
        "PHONE",
        "COMPANY",
        w = CELL_WIDTH
    );
    for row in &snap.rows {
        println!(
            "{:<w$} {:<w$} {:<18} {:<w$}",
            truncate(&row.name, CELL_WIDTH),
            truncate(&row.email, CELL_WIDTH),
            truncate(&row.phone, 18),
            truncate(&row.company.name, CELL_WIDTH),
            w = CELL_WIDTH
        );
    }

    info!(rows = snap.rows.len(), companies = snap.company_choices.len(), "Done");
    Ok(())
}
