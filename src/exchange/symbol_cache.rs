use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::client::{ExchangeClient, ExchangeError};
use super::types::SymbolInfo;

/// Short-TTL cache over the exchange symbol table. Symbol filters change
/// rarely; one fetch serves every job in a claim batch.
pub struct SymbolRulesCache {
    ttl: Duration,
    inner: RwLock<Option<(Instant, HashMap<String, SymbolInfo>)>>,
}

impl SymbolRulesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    pub async fn get(
        &self,
        client: &ExchangeClient,
        api_key: &str,
        symbol: &str,
    ) -> Result<Option<SymbolInfo>, ExchangeError> {
        let upper = symbol.to_uppercase();

        {
            let guard = self.inner.read().await;
            if let Some((loaded_at, table)) = guard.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(table.get(&upper).cloned());
                }
            }
        }

        // Double-checked refresh: only one task hits the exchange.
        let mut guard = self.inner.write().await;
        if let Some((loaded_at, table)) = guard.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(table.get(&upper).cloned());
            }
        }

        let symbols = client.list_symbols(api_key).await?;
        let table: HashMap<String, SymbolInfo> = symbols
            .into_iter()
            .map(|s| (s.symbol.to_uppercase(), s))
            .collect();

        let found = table.get(&upper).cloned();
        *guard = Some((Instant::now(), table));
        Ok(found)
    }
}
