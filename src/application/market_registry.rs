//! Hydrated symbol → market metadata registry. Immutable after hydrate;
//! refresh builds a new snapshot and swaps it in atomically so readers never
//! observe a partially-updated registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::domain::errors::RegistryError;
use crate::domain::ports::ExchangeClient;
use crate::domain::types::MarketType;

struct RegistryInner {
    perp_by_symbol: HashMap<String, (String, u32)>,
    spot_by_symbol: HashMap<String, Vec<(String, String, u32)>>, // base -> [(market name, quote, decimals)]
}

/// Normalize a raw symbol: trim, uppercase, and strip a leading `U` prefix
/// when the remainder is a known asset (e.g. the wrapped/unit-asset prefix
/// some venues use, `UETH -> ETH`).
pub fn normalize_symbol(raw: &str, known_assets: &[String]) -> String {
    let trimmed = raw.trim().to_uppercase();
    if let Some(stripped) = trimmed.strip_prefix('U') {
        if known_assets.iter().any(|a| a == stripped) {
            return stripped.to_string();
        }
    }
    trimmed
}

pub struct MarketRegistry {
    inner: RwLock<Option<Arc<RegistryInner>>>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self { inner: RwLock::new(None) }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    fn snapshot(&self) -> Option<Arc<RegistryInner>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fetch `meta`/`spot_meta` from the exchange and build (or rebuild) the
    /// registry. Failure leaves any previously-hydrated snapshot untouched.
    pub async fn hydrate(&self, exchange: &dyn ExchangeClient) -> Result<(), RegistryError> {
        let perp_meta = exchange
            .meta()
            .await
            .map_err(|e| RegistryError::HydrationFailed { reason: e.to_string() })?;
        let spot_meta = exchange
            .spot_meta()
            .await
            .map_err(|e| RegistryError::HydrationFailed { reason: e.to_string() })?;

        let mut perp_by_symbol = HashMap::new();
        for m in perp_meta {
            perp_by_symbol.insert(m.name.clone(), (m.name, m.size_decimals));
        }

        let mut spot_by_symbol: HashMap<String, Vec<(String, String, u32)>> = HashMap::new();
        for m in spot_meta {
            spot_by_symbol
                .entry(m.base)
                .or_default()
                .push((m.name, m.quote, m.size_decimals));
        }

        let built = Arc::new(RegistryInner { perp_by_symbol, spot_by_symbol });
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(built);
        Ok(())
    }

    pub fn known_assets(&self) -> Vec<String> {
        let Some(snap) = self.snapshot() else { return Vec::new() };
        snap.perp_by_symbol.keys().cloned().collect()
    }

    pub fn get_market_name(&self, symbol: &str, market_type: MarketType, quote: &str) -> Result<String, RegistryError> {
        let snap = self.snapshot().ok_or(RegistryError::NotReady)?;
        let symbol = normalize_symbol(symbol, &self.known_assets());
        match market_type {
            MarketType::Perp => snap
                .perp_by_symbol
                .get(&symbol)
                .map(|(name, _)| name.clone())
                .ok_or(RegistryError::UnknownMarket { symbol }),
            MarketType::Spot => {
                let candidates = snap
                    .spot_by_symbol
                    .get(&symbol)
                    .ok_or_else(|| RegistryError::UnknownMarket { symbol: symbol.clone() })?;
                candidates
                    .iter()
                    .find(|(_, q, _)| q.eq_ignore_ascii_case(quote))
                    .or_else(|| candidates.first())
                    .map(|(name, _, _)| name.clone())
                    .ok_or(RegistryError::UnknownMarket { symbol })
            }
        }
    }

    pub fn get_size_decimals(&self, symbol: &str, market_type: MarketType) -> Result<u32, RegistryError> {
        let snap = self.snapshot().ok_or(RegistryError::NotReady)?;
        let symbol = normalize_symbol(symbol, &self.known_assets());
        match market_type {
            MarketType::Perp => snap
                .perp_by_symbol
                .get(&symbol)
                .map(|(_, d)| *d)
                .ok_or(RegistryError::UnknownMarket { symbol }),
            MarketType::Spot => snap
                .spot_by_symbol
                .get(&symbol)
                .and_then(|c| c.first())
                .map(|(_, _, d)| *d)
                .ok_or(RegistryError::UnknownMarket { symbol }),
        }
    }

    pub fn resolve_symbol(&self, raw_market_name: &str) -> Result<(String, MarketType), RegistryError> {
        let snap = self.snapshot().ok_or(RegistryError::NotReady)?;
        if let Some((symbol, _)) = snap.perp_by_symbol.iter().find(|(_, (name, _))| name == raw_market_name) {
            return Ok((symbol.clone(), MarketType::Perp));
        }
        for (base, candidates) in &snap.spot_by_symbol {
            if candidates.iter().any(|(name, _, _)| name == raw_market_name) {
                return Ok((base.clone(), MarketType::Spot));
            }
        }
        Err(RegistryError::UnknownMarket { symbol: raw_market_name.to_string() })
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
