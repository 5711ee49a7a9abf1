//! Status command handler: item counts per status.

use std::path::Path;

use anyhow::Result;
use catalog_dl::ItemStore;
use catalog_dl::store::StatusCounts;

use crate::cli::StatusArgs;

pub async fn run_status_command(db_path: &Path, args: &StatusArgs) -> Result<()> {
    let store = super::open_store(db_path).await?;
    let counts = store.status_counts().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        print!("{}", render_counts(&counts));
    }
    Ok(())
}

fn render_counts(counts: &StatusCounts) -> String {
    let rows = [
        ("unset", counts.unset),
        ("pending", counts.pending),
        ("in_progress", counts.in_progress),
        ("success", counts.success),
        ("failed", counts.failed),
        ("total", counts.total()),
    ];
    rows.iter()
        .map(|(label, count)| format!("{label:<12}{count:>8}\n"))
        .collect()
}
