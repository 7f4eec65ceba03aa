//! The `nclex-cat validate` command.

use std::path::PathBuf;

use anyhow::Result;
use nclex_cat_core::config::CatConfig;
use nclex_cat_core::parser;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        parser::load_bank_directory(&bank_path)?
    } else {
        vec![parser::parse_item_bank(&bank_path)?]
    };
    anyhow::ensure!(!banks.is_empty(), "no item banks found in {}", bank_path.display());

    let theta_bound = CatConfig::default().theta_bound;
    let mut total_warnings = 0;

    for bank in &banks {
        println!("Item bank: {} ({} items)", bank.name, bank.len());

        let warnings = parser::validate_item_bank(bank, theta_bound);
        for w in &warnings {
            let prefix = w
                .item_id
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All item banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
