//! Asset universe: names, asset classes, and per-class transaction costs.

use crate::domain::error::NeutronError;
use std::collections::BTreeMap;

/// One tradable instrument and the asset class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    pub name: String,
    pub category: String,
}

/// The tradable universe plus per-category one-way cost assumptions.
#[derive(Debug, Clone)]
pub struct AssetUniverse {
    metas: Vec<AssetMeta>,
    cost_bps_by_category: BTreeMap<String, f64>,
    default_cost_bps: f64,
}

impl AssetUniverse {
    pub fn new(
        metas: Vec<AssetMeta>,
        cost_bps_by_category: BTreeMap<String, f64>,
        default_cost_bps: f64,
    ) -> Self {
        Self {
            metas,
            cost_bps_by_category,
            default_cost_bps,
        }
    }

    /// The stock/forex/metal/crypto reference universe with its cost table.
    pub fn default_universe() -> Self {
        let metas = [
            ("TSLA", "stock"),
            ("MCD", "stock"),
            ("NVDA", "stock"),
            ("GOOG", "stock"),
            ("SPY", "stock"),
            ("EURUSD", "forex"),
            ("AUDUSD", "forex"),
            ("GOLD", "metal"),
            ("SILVER", "metal"),
            ("COPPER", "metal"),
            ("BTC", "crypto"),
            ("ETH", "crypto"),
            ("SOL", "crypto"),
            ("XRP", "crypto"),
        ]
        .into_iter()
        .map(|(name, category)| AssetMeta {
            name: name.to_string(),
            category: category.to_string(),
        })
        .collect();

        let cost_bps_by_category = [
            ("stock", 2.0),
            ("forex", 1.0),
            ("metal", 2.0),
            ("crypto", 6.0),
        ]
        .into_iter()
        .map(|(category, bps)| (category.to_string(), bps))
        .collect();

        Self {
            metas,
            cost_bps_by_category,
            default_cost_bps: 4.0,
        }
    }

    /// Parse a universe spec of the form `NAME:category,NAME:category,...`.
    /// Whitespace around entries is ignored; duplicates are rejected.
    pub fn parse(spec: &str, section: &str, key: &str) -> Result<Self, NeutronError> {
        let mut metas: Vec<AssetMeta> = Vec::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((name, category)) = entry.split_once(':') else {
                return Err(NeutronError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("expected NAME:category, got '{entry}'"),
                });
            };
            let name = name.trim();
            let category = category.trim();
            if name.is_empty() || category.is_empty() {
                return Err(NeutronError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("expected NAME:category, got '{entry}'"),
                });
            }
            if metas.iter().any(|m| m.name == name) {
                return Err(NeutronError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("duplicate asset '{name}'"),
                });
            }
            metas.push(AssetMeta {
                name: name.to_string(),
                category: category.to_string(),
            });
        }
        if metas.is_empty() {
            return Err(NeutronError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: "no assets listed".to_string(),
            });
        }
        let defaults = Self::default_universe();
        Ok(Self {
            metas,
            cost_bps_by_category: defaults.cost_bps_by_category,
            default_cost_bps: defaults.default_cost_bps,
        })
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.metas.iter().map(|m| m.name.clone()).collect()
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.metas.iter().any(|m| m.name == asset)
    }

    /// Asset class for an asset; `"unknown"` when the asset is not listed.
    pub fn category(&self, asset: &str) -> &str {
        self.metas
            .iter()
            .find(|m| m.name == asset)
            .map(|m| m.category.as_str())
            .unwrap_or("unknown")
    }

    /// One-way transaction cost in bps of notional for an asset.
    pub fn cost_bps(&self, asset: &str) -> f64 {
        self.cost_bps_by_category
            .get(self.category(asset))
            .copied()
            .unwrap_or(self.default_cost_bps)
    }
}
