//! Item bank access.
//!
//! The bank is shared read-mostly state: sessions look items up concurrently
//! and the only mutation is the per-item exposure counter, which is atomic so
//! unrelated sessions never wait on each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::{AnswerOption, AnswerType, IrtParameters, Item, ItemId};

/// The eight NCLEX client-needs categories.
pub const NCLEX_CATEGORIES: [&str; 8] = [
    "Management of Care",
    "Safety and Infection Control",
    "Health Promotion and Maintenance",
    "Psychosocial Integrity",
    "Basic Care and Comfort",
    "Pharmacological and Parenteral Therapies",
    "Reduction of Risk Potential",
    "Physiological Adaptation",
];

/// Read access to calibrated items plus atomic exposure tracking.
pub trait ItemBank: Send + Sync {
    /// All items, ordered by id.
    fn items(&self) -> &[Item];

    fn get(&self, id: ItemId) -> Option<&Item>;

    /// How many times the item has been administered, across all sessions.
    fn exposure(&self, id: ItemId) -> u64;

    /// Count one more administration of the item. Returns the new count.
    fn record_exposure(&self, id: ItemId) -> u64;

    fn len(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Distinct categories present in the bank, sorted.
    fn categories(&self) -> Vec<String> {
        self.items()
            .iter()
            .map(|i| i.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Mean exposure over all items.
    fn mean_exposure(&self) -> f64 {
        let items = self.items();
        if items.is_empty() {
            return 0.0;
        }
        items.iter().map(|i| self.exposure(i.id)).sum::<u64>() as f64 / items.len() as f64
    }
}

/// An item bank held in memory.
#[derive(Debug)]
pub struct InMemoryItemBank {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
    exposures: Vec<AtomicU64>,
}

impl InMemoryItemBank {
    /// Build a bank with every exposure count at zero.
    pub fn new(items: Vec<Item>) -> Result<Self> {
        Self::from_entries(items.into_iter().map(|item| (item, 0)))
    }

    /// Build a bank from items paired with their historical exposure counts.
    pub fn from_entries(entries: impl IntoIterator<Item = (Item, u64)>) -> Result<Self> {
        let mut entries: Vec<(Item, u64)> = entries.into_iter().collect();
        entries.sort_by_key(|(item, _)| item.id);

        let mut index = HashMap::with_capacity(entries.len());
        for (pos, (item, _)) in entries.iter().enumerate() {
            check_calibration(item)?;
            if index.insert(item.id, pos).is_some() {
                anyhow::bail!("duplicate item id: {}", item.id);
            }
        }

        let (items, exposures) = entries
            .into_iter()
            .map(|(item, count)| (item, AtomicU64::new(count)))
            .unzip();

        Ok(Self {
            items,
            index,
            exposures,
        })
    }

    /// A seeded synthetic bank of `n` calibrated items spread evenly over the
    /// NCLEX categories, with difficulties covering [-3.5, 3.5].
    pub fn synthetic(n: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let items: Vec<Item> = (0..n)
            .map(|i| synthetic_item(i, n, &mut rng))
            .collect();
        let index = items.iter().enumerate().map(|(pos, it)| (it.id, pos)).collect();
        let exposures = (0..n).map(|_| AtomicU64::new(0)).collect();
        Self {
            items,
            index,
            exposures,
        }
    }

    /// Snapshot of all exposure counts.
    pub fn exposure_counts(&self) -> BTreeMap<ItemId, u64> {
        self.items
            .iter()
            .zip(&self.exposures)
            .map(|(item, count)| (item.id, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl ItemBank for InMemoryItemBank {
    fn items(&self) -> &[Item] {
        &self.items
    }

    fn get(&self, id: ItemId) -> Option<&Item> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    fn exposure(&self, id: ItemId) -> u64 {
        self.index
            .get(&id)
            .map(|&pos| self.exposures[pos].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn record_exposure(&self, id: ItemId) -> u64 {
        match self.index.get(&id) {
            Some(&pos) => self.exposures[pos].fetch_add(1, Ordering::Relaxed) + 1,
            None => 0,
        }
    }
}

/// Reject parameters the 3PL functions cannot evaluate to finite values.
fn check_calibration(item: &Item) -> Result<()> {
    let IrtParameters { a, b, c } = item.params;
    if !(a.is_finite() && a > 0.0) {
        anyhow::bail!("item {}: discrimination must be finite and positive, got {a}", item.id);
    }
    if !b.is_finite() {
        anyhow::bail!("item {}: difficulty must be finite, got {b}", item.id);
    }
    if !(0.0..1.0).contains(&c) {
        anyhow::bail!("item {}: guessing must be in [0, 1), got {c}", item.id);
    }
    Ok(())
}

fn synthetic_item(i: usize, n: usize, rng: &mut StdRng) -> Item {
    let category = NCLEX_CATEGORIES[i % NCLEX_CATEGORIES.len()];
    let spread = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
    let b = (-3.5 + 7.0 * spread + rng.gen_range(-0.1..0.1)).clamp(-3.9, 3.9);
    let a = rng.gen_range(0.8..2.0);

    let (answer_type, option_ids, correct, c): (_, &[&str], Vec<String>, f64) = if i % 5 == 4 {
        let ids: &[&str] = &["A", "B", "C", "D", "E"];
        let k = rng.gen_range(2..=3);
        let mut picked: Vec<String> = ids
            .choose_multiple(rng, k)
            .map(|s| s.to_string())
            .collect();
        picked.sort();
        (AnswerType::SelectAll, ids, picked, rng.gen_range(0.0..0.05))
    } else {
        let ids: &[&str] = &["A", "B", "C", "D"];
        let pick = ids[rng.gen_range(0..ids.len())].to_string();
        (AnswerType::SingleSelect, ids, vec![pick], rng.gen_range(0.1..0.25))
    };

    Item {
        id: ItemId(i as u32 + 1),
        category: category.to_string(),
        stem: format!("Synthetic item {} ({category})", i + 1),
        params: IrtParameters { a, b, c },
        answer_type,
        options: option_ids
            .iter()
            .map(|id| AnswerOption {
                id: id.to_string(),
                text: format!("Option {id}"),
            })
            .collect(),
        correct: correct.into_iter().collect(),
        explanation: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn synthetic_bank_is_deterministic() {
        let a = InMemoryItemBank::synthetic(50, 3);
        let b = InMemoryItemBank::synthetic(50, 3);
        assert_eq!(a.len(), 50);
        for (x, y) in a.items().iter().zip(b.items()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.params, y.params);
            assert_eq!(x.correct, y.correct);
        }
    }

    #[test]
    fn synthetic_bank_covers_categories_and_difficulties() {
        let bank = InMemoryItemBank::synthetic(400, 1);
        assert_eq!(bank.categories().len(), NCLEX_CATEGORIES.len());
        let min_b = bank.items().iter().map(|i| i.params.b).fold(f64::MAX, f64::min);
        let max_b = bank.items().iter().map(|i| i.params.b).fold(f64::MIN, f64::max);
        assert!(min_b < -3.0 && max_b > 3.0);
        for item in bank.items() {
            assert!(item.correct.iter().all(|c| item.options.iter().any(|o| &o.id == c)));
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let bank = InMemoryItemBank::synthetic(2, 0);
        let mut items = bank.items().to_vec();
        items[1].id = items[0].id;
        assert!(InMemoryItemBank::new(items).is_err());
    }

    #[test]
    fn invalid_calibrations_are_rejected() {
        let template = InMemoryItemBank::synthetic(1, 0).items()[0].clone();
        let cases = [
            (IrtParameters { a: 0.0, b: 0.0, c: 0.2 }, "discrimination"),
            (IrtParameters { a: -1.0, b: 0.0, c: 0.2 }, "discrimination"),
            (IrtParameters { a: f64::NAN, b: 0.0, c: 0.2 }, "discrimination"),
            (IrtParameters { a: 1.0, b: f64::INFINITY, c: 0.2 }, "difficulty"),
            (IrtParameters { a: 1.0, b: 0.0, c: 1.0 }, "guessing"),
            (IrtParameters { a: 1.0, b: 0.0, c: -0.1 }, "guessing"),
            (IrtParameters { a: 1.0, b: 0.0, c: f64::NAN }, "guessing"),
        ];
        for (params, field) in cases {
            let mut item = template.clone();
            item.params = params;
            let err = InMemoryItemBank::from_entries([(item, 0)]).unwrap_err();
            assert!(err.to_string().contains(field), "{params:?}: {err}");
        }

        let mut edge = template;
        edge.params = IrtParameters { a: 0.5, b: -3.9, c: 0.0 };
        assert!(InMemoryItemBank::new(vec![edge]).is_ok());
    }

    #[test]
    fn lookup_and_exposure() {
        let bank = InMemoryItemBank::synthetic(5, 0);
        let id = ItemId(3);
        assert_eq!(bank.get(id).map(|i| i.id), Some(id));
        assert!(bank.get(ItemId(99)).is_none());
        assert_eq!(bank.exposure(id), 0);
        assert_eq!(bank.record_exposure(id), 1);
        assert_eq!(bank.record_exposure(id), 2);
        assert_eq!(bank.exposure(id), 2);
        assert_eq!(bank.record_exposure(ItemId(99)), 0);
        assert!((bank.mean_exposure() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn historical_exposure_is_kept() {
        let items = InMemoryItemBank::synthetic(3, 0).items().to_vec();
        let bank =
            InMemoryItemBank::from_entries(items.into_iter().map(|it| (it, 7))).unwrap();
        assert!(bank.exposure_counts().values().all(|&c| c == 7));
    }

    #[test]
    fn concurrent_exposure_increments_are_not_lost() {
        let bank = Arc::new(InMemoryItemBank::synthetic(1, 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bank = Arc::clone(&bank);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        bank.record_exposure(ItemId(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bank.exposure(ItemId(1)), 8000);
    }
}
