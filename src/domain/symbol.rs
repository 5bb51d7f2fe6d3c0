use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::period::{AssetClass, Period};

/// Per-source alias for a canonical ticker, e.g. the crypto-futures
/// provider wants `"BTCUSDT"` where the rich provider wants `"BTC-USD"`.
pub type SourceAliases = HashMap<String, String>;

/// Immutable once registered (§3). Created by external seeding, consumed
/// by the scheduler and aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDescriptor {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub periods: Vec<Period>,
    pub aliases: SourceAliases,
}

impl SymbolDescriptor {
    pub fn new(symbol: impl Into<String>, asset_class: AssetClass, periods: Vec<Period>) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            periods,
            aliases: SourceAliases::new(),
        }
    }

    pub fn with_alias(mut self, source: impl Into<String>, native_symbol: impl Into<String>) -> Self {
        self.aliases.insert(source.into(), native_symbol.into());
        self
    }

    pub fn alias_for(&self, source: &str) -> Option<&str> {
        self.aliases.get(source).map(String::as_str)
    }
}

/// The symbol-mapping table from §4.3: data, keyed by canonical ticker.
/// Read-only from the engine's perspective — populating it is external
/// seeding, per §6.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    by_symbol: HashMap<String, SymbolDescriptor>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: SymbolDescriptor) {
        self.by_symbol.insert(descriptor.symbol.clone(), descriptor);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolDescriptor> {
        self.by_symbol.get(symbol)
    }

    pub fn all(&self) -> impl Iterator<Item = &SymbolDescriptor> {
        self.by_symbol.values()
    }

    pub fn all_for_asset_class(&self, asset_class: AssetClass) -> Vec<&SymbolDescriptor> {
        self.by_symbol
            .values()
            .filter(|d| d.asset_class == asset_class)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_is_absent() {
        let registry = SymbolRegistry::new();
        assert!(registry.get("AAPL").is_none());
    }

    #[test]
    fn registered_symbol_carries_its_aliases() {
        let mut registry = SymbolRegistry::new();
        registry.register(
            SymbolDescriptor::new("BTC", AssetClass::Crypto, vec![Period::OneHour])
                .with_alias("crypto-futures", "BTCUSDT")
                .with_alias("rich", "BTC-USD"),
        );

        let d = registry.get("BTC").unwrap();
        assert_eq!(d.alias_for("crypto-futures"), Some("BTCUSDT"));
        assert_eq!(d.alias_for("rich"), Some("BTC-USD"));
        assert_eq!(d.alias_for("fallback"), None);
    }
}
