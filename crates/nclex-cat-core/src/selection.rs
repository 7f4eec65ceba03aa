//! Maximum-information item selection.
//!
//! Candidates are the items not yet administered in the session, filtered by
//! two constraints:
//!
//! - **Category balance**: a category may not run over its target share of
//!   the test by more than the configured slack. Shares are measured against
//!   the planned test length (`min_items`) until the test grows past it.
//! - **Exposure control**: items administered more than
//!   `exposure_ratio_cap` times the bank's mean exposure (and at least
//!   `exposure_floor` times) are withheld.
//!
//! The constraints are soft: when they would remove every unused item, the
//! exposure filter is dropped first and then the category filter. Only an
//! empty pool of unused items is an error. Among the survivors the item with
//! the highest Fisher information at θ wins; ties go to the lower exposure
//! count, then the lower id.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::bank::ItemBank;
use crate::config::CatConfig;
use crate::error::{CatError, Result};
use crate::irt;
use crate::model::{CategoryTally, Item, ItemId};

/// Selects the next item for a session.
#[derive(Debug, Clone)]
pub struct ItemSelector {
    /// Normalized target share per category.
    targets: BTreeMap<String, f64>,
    slack: f64,
    planned_length: u32,
    exposure_ratio_cap: f64,
    exposure_floor: u64,
}

impl ItemSelector {
    /// Build a selector. Category targets come from the config, or are uniform
    /// over the bank's categories when the config names none.
    pub fn new<B: ItemBank + ?Sized>(config: &CatConfig, bank: &B) -> Self {
        let raw: BTreeMap<String, f64> = if config.category_targets.is_empty() {
            bank.categories().into_iter().map(|c| (c, 1.0)).collect()
        } else {
            config.category_targets.clone()
        };
        let total: f64 = raw.values().sum();
        let targets = raw
            .into_iter()
            .map(|(c, w)| (c, if total > 0.0 { w / total } else { 0.0 }))
            .collect();

        Self {
            targets,
            slack: config.category_slack,
            planned_length: config.min_items.max(1),
            exposure_ratio_cap: config.exposure_ratio_cap,
            exposure_floor: config.exposure_floor,
        }
    }

    /// Target share of `category`, 0.0 for categories without a target.
    pub fn target(&self, category: &str) -> f64 {
        self.targets.get(category).copied().unwrap_or(0.0)
    }

    /// How many items of `category` may have been given once the test holds
    /// `answered + 1` items.
    pub fn category_cap(&self, category: &str, answered: u32) -> u32 {
        let length = (answered + 1).max(self.planned_length) as f64;
        ((self.target(category) + self.slack) * length).ceil() as u32
    }

    /// Pick the next item at ability `theta`.
    pub fn select_next<'b, B: ItemBank + ?Sized>(
        &self,
        theta: f64,
        administered: &BTreeSet<ItemId>,
        tally: &BTreeMap<String, CategoryTally>,
        bank: &'b B,
    ) -> Result<&'b Item> {
        let unused: Vec<&Item> = bank
            .items()
            .iter()
            .filter(|item| !administered.contains(&item.id))
            .collect();
        if unused.is_empty() {
            return Err(CatError::ExhaustedBank);
        }

        let answered: u32 = tally.values().map(|t| t.total).sum();
        let category_ok = |item: &Item| {
            let given = tally.get(&item.category).map(|t| t.total).unwrap_or(0);
            given < self.category_cap(&item.category, answered)
        };

        let exposure_cap = (self.exposure_ratio_cap * bank.mean_exposure())
            .max(self.exposure_floor as f64);
        let exposure_ok = |item: &Item| (bank.exposure(item.id) as f64) <= exposure_cap;

        let tiers: [(&str, Vec<&Item>); 3] = [
            (
                "all constraints",
                unused
                    .iter()
                    .copied()
                    .filter(|i| category_ok(i) && exposure_ok(i))
                    .collect(),
            ),
            (
                "category balance only",
                unused.iter().copied().filter(|i| category_ok(i)).collect(),
            ),
            ("unconstrained", unused),
        ];

        let (tier, pool) = tiers
            .into_iter()
            .find(|(_, pool)| !pool.is_empty())
            .ok_or(CatError::ExhaustedBank)?;
        if tier != "all constraints" {
            tracing::warn!(tier, answered, "relaxed selection constraints");
        }

        let best = pool
            .into_iter()
            .map(|item| (item, irt::information(&item.params, theta), bank.exposure(item.id)))
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.2.cmp(&a.2))
                    .then_with(|| b.0.id.cmp(&a.0.id))
            })
            .map(|(item, info, _)| {
                tracing::debug!(item = %item.id, theta, info, "selected item");
                item
            })
            .ok_or(CatError::ExhaustedBank)?;

        Ok(best)
    }
}

/// The `n` items with the highest information at `theta`, most informative first.
pub fn most_informative<B: ItemBank + ?Sized>(bank: &B, theta: f64, n: usize) -> Vec<(&Item, f64)> {
    let mut ranked: Vec<(&Item, f64)> = bank
        .items()
        .iter()
        .map(|item| (item, irt::information(&item.params, theta)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryItemBank;
    use crate::model::{AnswerOption, AnswerType, IrtParameters};

    fn item(id: u32, category: &str, a: f64, b: f64) -> Item {
        Item {
            id: ItemId(id),
            category: category.into(),
            stem: format!("item {id}"),
            params: IrtParameters { a, b, c: 0.0 },
            answer_type: AnswerType::SingleSelect,
            options: vec![AnswerOption {
                id: "A".into(),
                text: "A".into(),
            }],
            correct: ["A".to_string()].into_iter().collect(),
            explanation: String::new(),
        }
    }

    fn config() -> CatConfig {
        CatConfig {
            min_items: 10,
            max_items: 20,
            category_slack: 0.0,
            ..CatConfig::default()
        }
    }

    #[test]
    fn picks_item_closest_to_theta() {
        let bank = InMemoryItemBank::new(vec![
            item(1, "x", 1.0, -2.0),
            item(2, "x", 1.0, 0.1),
            item(3, "x", 1.0, 2.0),
        ])
        .unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        let chosen = selector
            .select_next(0.0, &BTreeSet::new(), &BTreeMap::new(), &bank)
            .unwrap();
        assert_eq!(chosen.id, ItemId(2));
    }

    #[test]
    fn prefers_higher_discrimination() {
        let bank =
            InMemoryItemBank::new(vec![item(1, "x", 0.8, 0.0), item(2, "x", 1.9, 0.0)]).unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        let chosen = selector
            .select_next(0.0, &BTreeSet::new(), &BTreeMap::new(), &bank)
            .unwrap();
        assert_eq!(chosen.id, ItemId(2));
    }

    #[test]
    fn skips_administered_items() {
        let bank =
            InMemoryItemBank::new(vec![item(1, "x", 1.0, 0.0), item(2, "x", 1.0, 1.0)]).unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        let used: BTreeSet<_> = [ItemId(1)].into_iter().collect();
        let chosen = selector
            .select_next(0.0, &used, &BTreeMap::new(), &bank)
            .unwrap();
        assert_eq!(chosen.id, ItemId(2));
    }

    #[test]
    fn exhausted_when_everything_is_used() {
        let bank = InMemoryItemBank::new(vec![item(1, "x", 1.0, 0.0)]).unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        let used: BTreeSet<_> = [ItemId(1)].into_iter().collect();
        let err = selector
            .select_next(0.0, &used, &BTreeMap::new(), &bank)
            .unwrap_err();
        assert_eq!(err, CatError::ExhaustedBank);
    }

    #[test]
    fn ties_break_on_exposure_then_id() {
        let bank = InMemoryItemBank::new(vec![
            item(5, "x", 1.0, 0.0),
            item(3, "x", 1.0, 0.0),
            item(4, "x", 1.0, 0.0),
        ])
        .unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        let none = BTreeSet::new();
        let tally = BTreeMap::new();

        assert_eq!(
            selector.select_next(0.0, &none, &tally, &bank).unwrap().id,
            ItemId(3)
        );
        bank.record_exposure(ItemId(3));
        assert_eq!(
            selector.select_next(0.0, &none, &tally, &bank).unwrap().id,
            ItemId(4)
        );
    }

    #[test]
    fn full_category_is_skipped() {
        let bank = InMemoryItemBank::new(vec![
            item(1, "a", 1.0, 0.0),
            item(2, "b", 1.0, 1.5),
        ])
        .unwrap();
        let selector = ItemSelector::new(&config(), &bank);
        // Two categories at 50% each over a planned length of 10: five items apiece.
        assert_eq!(selector.category_cap("a", 0), 5);
        let mut tally = BTreeMap::new();
        tally.insert(
            "a".to_string(),
            CategoryTally {
                correct: 5,
                total: 5,
            },
        );
        let chosen = selector
            .select_next(0.0, &BTreeSet::new(), &tally, &bank)
            .unwrap();
        assert_eq!(chosen.category, "b");
    }

    #[test]
    fn category_constraint_relaxes_instead_of_exhausting() {
        let bank = InMemoryItemBank::new(vec![item(1, "a", 1.0, 0.0)]).unwrap();
        let mut cfg = config();
        cfg.category_targets.insert("b".into(), 1.0);
        let selector = ItemSelector::new(&cfg, &bank);
        assert_eq!(selector.category_cap("a", 0), 0);
        let chosen = selector
            .select_next(0.0, &BTreeSet::new(), &BTreeMap::new(), &bank)
            .unwrap();
        assert_eq!(chosen.id, ItemId(1));
    }

    #[test]
    fn overexposed_items_are_withheld() {
        let mut cfg = config();
        cfg.exposure_floor = 2;
        cfg.exposure_ratio_cap = 1.5;
        let bank = InMemoryItemBank::from_entries(vec![
            (item(1, "x", 2.0, 0.0), 30),
            (item(2, "x", 1.0, 0.0), 0),
            (item(3, "x", 1.0, 2.0), 0),
        ])
        .unwrap();
        let selector = ItemSelector::new(&cfg, &bank);
        // Mean exposure is 10, so the cap is 15 and item 1 is withheld.
        let chosen = selector
            .select_next(0.0, &BTreeSet::new(), &BTreeMap::new(), &bank)
            .unwrap();
        assert_eq!(chosen.id, ItemId(2));
    }

    #[test]
    fn most_informative_ranks_by_information() {
        let bank = InMemoryItemBank::new(vec![
            item(1, "x", 1.0, 3.0),
            item(2, "x", 1.0, 0.0),
            item(3, "x", 1.0, 1.0),
        ])
        .unwrap();
        let ranked = most_informative(&bank, 0.0, 2);
        let ids: Vec<_> = ranked.iter().map(|(i, _)| i.id).collect();
        assert_eq!(ids, vec![ItemId(2), ItemId(3)]);
    }
}
