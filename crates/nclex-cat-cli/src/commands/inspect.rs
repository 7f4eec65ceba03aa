//! The `nclex-cat inspect` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use nclex_cat_core::bank::ItemBank;
use nclex_cat_core::irt;
use nclex_cat_core::parser;
use nclex_cat_core::selection::most_informative;

pub fn execute(bank_path: PathBuf, theta: f64, top: usize) -> Result<()> {
    anyhow::ensure!(theta.is_finite(), "theta must be a finite number");
    anyhow::ensure!(top >= 1, "top must be at least 1");

    let parsed = parser::parse_item_bank(&bank_path)?;
    let name = parsed.name.clone();
    let bank = parsed.into_bank()?;

    println!(
        "Item bank: {} ({} items, {} categories)",
        name,
        bank.len(),
        bank.categories().len()
    );
    println!("Most informative items at θ = {theta:+.2}:");

    let mut table = Table::new();
    table.set_header(vec![
        "Rank",
        "Item",
        "Category",
        "Type",
        "a",
        "b",
        "c",
        "P(correct)",
        "Information",
        "Exposure",
    ]);

    for (rank, (item, info)) in most_informative(&bank, theta, top).into_iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(item.id),
            Cell::new(&item.category),
            Cell::new(item.answer_type),
            Cell::new(format!("{:.2}", item.params.a)),
            Cell::new(format!("{:+.2}", item.params.b)),
            Cell::new(format!("{:.2}", item.params.c)),
            Cell::new(format!("{:.3}", irt::probability(&item.params, theta))),
            Cell::new(format!("{info:.4}")),
            Cell::new(bank.exposure(item.id)),
        ]);
    }
    println!("{table}");

    Ok(())
}
