use anyhow::Result;
use clap::Parser;
use docintake_core::CategoryId;
use docintake_core::DocumentRegistry;
use serde::Serialize;

use crate::format_size;
use crate::print_json;

/// List the documents an application needs, in intake order.
#[derive(Debug, Parser)]
pub struct CategoriesCli {
    /// Emit JSON instead of a table.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CategoryRow<'a> {
    id: CategoryId,
    title: &'a str,
    accepted_media_types: &'a [String],
    max_size_bytes: u64,
}

pub fn run(cli: CategoriesCli) -> Result<()> {
    let registry = DocumentRegistry::standard();
    let rows: Vec<CategoryRow<'_>> = registry
        .categories_in_order()
        .iter()
        .map(|category| CategoryRow {
            id: category.id(),
            title: category.title(),
            accepted_media_types: category.accepted_media_types(),
            max_size_bytes: category.max_size_bytes(),
        })
        .collect();

    if cli.json {
        return print_json(&rows);
    }
    for (idx, row) in rows.iter().enumerate() {
        println!(
            "{}. {:<10} {:<46} {:<38} up to {}",
            idx + 1,
            row.id.as_str(),
            row.title,
            row.accepted_media_types.join(", "),
            format_size(row.max_size_bytes)
        );
    }
    Ok(())
}
