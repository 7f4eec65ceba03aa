//! Engine configuration.
//!
//! Every field has a default matching the operational exam's policy, so an
//! empty TOML file is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for estimation, selection and stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatConfig {
    /// No verdict before this many items.
    #[serde(default = "default_min_items")]
    pub min_items: u32,
    /// Hard cap on test length.
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Passing standard θ₀ on the logit scale.
    #[serde(default)]
    pub passing_threshold: f64,
    /// Critical value for the two-sided confidence interval (1.96 = 95%).
    #[serde(default = "default_confidence_z")]
    pub confidence_z: f64,
    /// θ is clamped to `[-theta_bound, theta_bound]`.
    #[serde(default = "default_theta_bound")]
    pub theta_bound: f64,
    #[serde(default = "default_se_floor")]
    pub se_floor: f64,
    /// Standard error reported when the administered items carry no information.
    #[serde(default = "default_se_ceiling")]
    pub se_ceiling: f64,
    #[serde(default = "default_max_newton_iterations")]
    pub max_newton_iterations: u32,
    #[serde(default = "default_newton_tolerance")]
    pub newton_tolerance: f64,
    /// Grid size for the posterior-mean fallback.
    #[serde(default = "default_quadrature_points")]
    pub quadrature_points: usize,
    /// How far a category may run over its target share.
    #[serde(default = "default_category_slack")]
    pub category_slack: f64,
    /// Target share per category. Empty means uniform over the bank's categories.
    #[serde(default)]
    pub category_targets: BTreeMap<String, f64>,
    /// Items exposed more than this multiple of the bank's mean exposure are withheld.
    #[serde(default = "default_exposure_ratio_cap")]
    pub exposure_ratio_cap: f64,
    /// Exposure control only engages once an item has been shown this often.
    #[serde(default = "default_exposure_floor")]
    pub exposure_floor: u64,
}

fn default_min_items() -> u32 {
    75
}
fn default_max_items() -> u32 {
    150
}
fn default_confidence_z() -> f64 {
    1.96
}
fn default_theta_bound() -> f64 {
    4.0
}
fn default_se_floor() -> f64 {
    1e-3
}
fn default_se_ceiling() -> f64 {
    10.0
}
fn default_max_newton_iterations() -> u32 {
    50
}
fn default_newton_tolerance() -> f64 {
    1e-6
}
fn default_quadrature_points() -> usize {
    81
}
fn default_category_slack() -> f64 {
    0.05
}
fn default_exposure_ratio_cap() -> f64 {
    3.0
}
fn default_exposure_floor() -> u64 {
    10
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            max_items: default_max_items(),
            passing_threshold: 0.0,
            confidence_z: default_confidence_z(),
            theta_bound: default_theta_bound(),
            se_floor: default_se_floor(),
            se_ceiling: default_se_ceiling(),
            max_newton_iterations: default_max_newton_iterations(),
            newton_tolerance: default_newton_tolerance(),
            quadrature_points: default_quadrature_points(),
            category_slack: default_category_slack(),
            category_targets: BTreeMap::new(),
            exposure_ratio_cap: default_exposure_ratio_cap(),
            exposure_floor: default_exposure_floor(),
        }
    }
}

impl CatConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_items >= 1, "max_items must be at least 1");
        anyhow::ensure!(
            self.min_items <= self.max_items,
            "min_items ({}) must not exceed max_items ({})",
            self.min_items,
            self.max_items
        );
        anyhow::ensure!(
            self.confidence_z > 0.0 && self.confidence_z.is_finite(),
            "confidence_z must be positive"
        );
        anyhow::ensure!(
            self.theta_bound > 0.0 && self.theta_bound.is_finite(),
            "theta_bound must be positive"
        );
        anyhow::ensure!(
            self.passing_threshold.abs() < self.theta_bound,
            "passing_threshold must lie inside the theta bound"
        );
        anyhow::ensure!(
            self.se_floor > 0.0 && self.se_floor < self.se_ceiling,
            "se_floor must be positive and below se_ceiling"
        );
        anyhow::ensure!(
            self.quadrature_points >= 3,
            "quadrature_points must be at least 3"
        );
        anyhow::ensure!(self.newton_tolerance > 0.0, "newton_tolerance must be positive");
        anyhow::ensure!(self.category_slack >= 0.0, "category_slack must not be negative");
        anyhow::ensure!(
            self.exposure_ratio_cap >= 1.0,
            "exposure_ratio_cap must be at least 1.0"
        );
        if !self.category_targets.is_empty() {
            anyhow::ensure!(
                self.category_targets.values().all(|&w| w >= 0.0 && w.is_finite()),
                "category targets must be non-negative"
            );
            anyhow::ensure!(
                self.category_targets.values().sum::<f64>() > 0.0,
                "category targets must not all be zero"
            );
        }
        Ok(())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `nclex-cat.toml` in the current directory
/// 2. `~/.config/nclex-cat/config.toml`
///
/// Environment variable overrides: `NCLEX_CAT_MIN_ITEMS`, `NCLEX_CAT_MAX_ITEMS`.
pub fn load_config() -> Result<CatConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CatConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("nclex-cat.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CatConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CatConfig::default(),
    };

    if let Ok(value) = std::env::var("NCLEX_CAT_MIN_ITEMS") {
        config.min_items = value
            .parse()
            .with_context(|| format!("invalid NCLEX_CAT_MIN_ITEMS: '{value}'"))?;
    }
    if let Ok(value) = std::env::var("NCLEX_CAT_MAX_ITEMS") {
        config.max_items = value
            .parse()
            .with_context(|| format!("invalid NCLEX_CAT_MAX_ITEMS: '{value}'"))?;
    }

    config.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("nclex-cat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CatConfig::default();
        assert_eq!(config.min_items, 75);
        assert_eq!(config.max_items, 150);
        assert_eq!(config.passing_threshold, 0.0);
        assert!((config.confidence_z - 1.96).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        let config: CatConfig = toml::from_str("").unwrap();
        assert_eq!(config, CatConfig::default());
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
min_items = 60
max_items = 130
category_slack = 0.03

[category_targets]
"Management of Care" = 0.2
"Pharmacological Therapies" = 0.15
"#;
        let config: CatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.min_items, 60);
        assert_eq!(config.max_items, 130);
        assert_eq!(config.theta_bound, 4.0);
        assert_eq!(config.category_targets.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_item_bounds() {
        let config = CatConfig {
            min_items: 200,
            ..CatConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn validate_rejects_zero_targets() {
        let mut config = CatConfig::default();
        config.category_targets.insert("Basic Care and Comfort".into(), 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.toml");
        std::fs::write(&path, "min_items = 10\nmax_items = 20\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.min_items, 10);
        assert_eq!(config.max_items, 20);
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let err = load_config_from(Some(Path::new("/nonexistent/cat.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
