//! TOML item bank parser.
//!
//! Loads calibrated item banks from TOML files and directories, and validates
//! them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::bank::InMemoryItemBank;
use crate::model::{AnswerOption, AnswerType, IrtParameters, Item, ItemId};

/// Intermediate TOML structure for parsing item bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: u32,
    category: String,
    stem: String,
    #[serde(default = "default_answer_type")]
    answer_type: String,
    a: f64,
    b: f64,
    #[serde(default)]
    c: f64,
    options: Vec<TomlOption>,
    correct: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    exposure_count: u64,
}

fn default_answer_type() -> String {
    "single_select".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    id: String,
    text: String,
}

/// A parsed item bank file: items with their historical exposure counts.
///
/// Kept separate from [`InMemoryItemBank`] so that files with problems (such
/// as duplicate ids) can still be inspected and validated.
#[derive(Debug, Clone)]
pub struct ParsedBank {
    pub name: String,
    pub description: String,
    pub entries: Vec<(Item, u64)>,
}

impl ParsedBank {
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.entries.iter().map(|(item, _)| item)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the in-memory bank. Fails on duplicate item ids and on
    /// calibrations the model cannot evaluate.
    pub fn into_bank(self) -> Result<InMemoryItemBank> {
        let name = self.name;
        InMemoryItemBank::from_entries(self.entries)
            .with_context(|| format!("invalid item bank '{name}'"))
    }
}

/// Parse a single TOML file into a `ParsedBank`.
pub fn parse_item_bank(path: &Path) -> Result<ParsedBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path)
}

/// Parse a TOML string into a `ParsedBank` (useful for testing).
pub fn parse_item_bank_str(content: &str, source_path: &Path) -> Result<ParsedBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let entries = parsed
        .items
        .into_iter()
        .map(|it| {
            let answer_type: AnswerType = it
                .answer_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!("item {}: {}", it.id, e))?;

            let item = Item {
                id: ItemId(it.id),
                category: it.category,
                stem: it.stem,
                params: IrtParameters {
                    a: it.a,
                    b: it.b,
                    c: it.c,
                },
                answer_type,
                options: it
                    .options
                    .into_iter()
                    .map(|o| AnswerOption {
                        id: o.id,
                        text: o.text,
                    })
                    .collect(),
                correct: it.correct.into_iter().collect(),
                explanation: it.explanation,
            };
            Ok((item, it.exposure_count))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedBank {
        name: parsed.bank.name,
        description: parsed.bank.description,
        entries,
    })
}

/// Recursively load all `.toml` item bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<ParsedBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// A warning from item bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<ItemId>,
    /// Warning message.
    pub message: String,
}

/// Validate an item bank for calibration and authoring problems.
///
/// `theta_bound` is the estimator's ability range; items whose difficulty lies
/// outside it can never be the most informative choice.
pub fn validate_item_bank(bank: &ParsedBank, theta_bound: f64) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |item: &Item, message: String| {
        warnings.push(ValidationWarning {
            item_id: Some(item.id),
            message,
        })
    };

    let mut seen_ids = HashSet::new();
    for item in bank.items() {
        if !seen_ids.insert(item.id) {
            warn(item, format!("duplicate item ID: {}", item.id));
        }

        if item.stem.trim().is_empty() {
            warn(item, "stem is empty".into());
        }

        let mut option_ids = HashSet::new();
        for option in &item.options {
            if !option_ids.insert(option.id.as_str()) {
                warn(item, format!("duplicate option ID: {}", option.id));
            }
        }
        for key in &item.correct {
            if !option_ids.contains(key.as_str()) {
                warn(item, format!("correct answer '{key}' is not an option"));
            }
        }
        match item.answer_type {
            AnswerType::SingleSelect if item.correct.len() != 1 => warn(
                item,
                format!(
                    "single-select item has {} correct options, expected 1",
                    item.correct.len()
                ),
            ),
            AnswerType::SelectAll if item.correct.is_empty() => {
                warn(item, "select-all item has no correct options".into())
            }
            _ => {}
        }

        let p = &item.params;
        if !(p.a.is_finite() && p.a > 0.0) {
            warn(item, format!("discrimination must be positive, got {}", p.a));
        }
        if !(0.0..1.0).contains(&p.c) {
            warn(item, format!("guessing parameter must be in [0, 1), got {}", p.c));
        }
        if !p.b.is_finite() || p.b.abs() > theta_bound {
            warn(
                item,
                format!("difficulty {} is outside the ability range ±{theta_bound}", p.b),
            );
        }
    }

    if bank.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: format!("item bank '{}' has no items", bank.name),
        });
    }

    warnings
}
