//! List command handler: items with their outcome.

use std::path::Path;

use anyhow::Result;
use catalog_dl::{Item, ItemStatus, ItemStore};

use crate::cli::ListArgs;

const ALL_STATUSES: [ItemStatus; 5] = [
    ItemStatus::Unset,
    ItemStatus::Pending,
    ItemStatus::InProgress,
    ItemStatus::Success,
    ItemStatus::Failed,
];

pub async fn run_list_command(db_path: &Path, args: &ListArgs) -> Result<()> {
    let store = super::open_store(db_path).await?;

    let items = match args.status {
        Some(status) => store.list_by_status(status).await?,
        None => {
            let mut all = Vec::new();
            for status in ALL_STATUSES {
                all.extend(store.list_by_status(status).await?);
            }
            all.sort_by_key(|item| item.seq);
            all
        }
    };

    if items.is_empty() {
        if !args.json {
            println!("No items matched.");
        }
        return Ok(());
    }

    for item in &items {
        if args.json {
            println!("{}", serde_json::to_string(item)?);
        } else {
            println!("{}", render_item_row(item));
        }
    }
    Ok(())
}

/// One tab-separated row: key, status, then filename, error or title.
fn render_item_row(item: &Item) -> String {
    let detail = match item.status() {
        ItemStatus::Success => item.downloaded_filename.as_deref().unwrap_or(""),
        ItemStatus::Failed => item.error_message.as_deref().unwrap_or(""),
        _ => item.title.as_str(),
    };
    format!("{}\t{}\t{}", item.key, item.status(), detail)
}
