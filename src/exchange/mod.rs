pub mod client;
pub mod rules;
pub mod symbol_cache;
pub mod types;

pub use client::{ExchangeClient, ExchangeError};
pub use symbol_cache::SymbolRulesCache;
pub use types::{OrderRequest, OrderResponse, SymbolFilter, SymbolInfo};
