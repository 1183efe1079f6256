use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::types::{OrderRequest, OrderResponse, SymbolInfo, ValidatedOrder};

const API_KEY_HEADER: &str = "X-EXCHANGE-APIKEY";
const API_SECRET_HEADER: &str = "X-EXCHANGE-SECRET";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("order rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("exchange server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid order response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Gateway responses arrive wrapped in a data envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

/// REST client for the futures exchange gateway. Per-follower credentials
/// travel as headers; the client itself is shared.
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: Client,
    base_url: String,
}

impl ExchangeClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Place a market order opening (or adding to) a position.
    pub async fn open_order(
        &self,
        api_key: &str,
        api_secret: &str,
        request: &OrderRequest,
    ) -> Result<ValidatedOrder, ExchangeError> {
        self.place(api_key, api_secret, "/order", request).await
    }

    /// Place a reduce-only market order shrinking an existing position.
    pub async fn close_order(
        &self,
        api_key: &str,
        api_secret: &str,
        request: &OrderRequest,
    ) -> Result<ValidatedOrder, ExchangeError> {
        self.place(api_key, api_secret, "/close-position", request).await
    }

    async fn place(
        &self,
        api_key: &str,
        api_secret: &str,
        path: &str,
        request: &OrderRequest,
    ) -> Result<ValidatedOrder, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .header(API_SECRET_HEADER, api_secret)
            .json(request)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let envelope: ApiEnvelope<OrderResponse> = resp.json().await?;
        validate_order(envelope.data)
    }

    /// Current symbol table with quantity/notional filters.
    pub async fn list_symbols(&self, api_key: &str) -> Result<Vec<SymbolInfo>, ExchangeError> {
        let url = format!("{}/symbols", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let envelope: ApiEnvelope<Vec<SymbolInfo>> = resp.json().await?;
        Ok(envelope.data)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ExchangeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExchangeError::RateLimited(body));
    }
    if status.is_client_error() {
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            message: body,
        });
    }
    Err(ExchangeError::Server {
        status: status.as_u16(),
        message: body,
    })
}

/// A response without an order id, symbol, positive average price and a
/// quantity is an external-service error, not a fill.
fn validate_order(resp: OrderResponse) -> Result<ValidatedOrder, ExchangeError> {
    let order_id = resp
        .order_id
        .ok_or_else(|| ExchangeError::InvalidResponse("missing orderId".into()))?;

    let symbol = match resp.symbol {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(ExchangeError::InvalidResponse("missing symbol".into())),
    };

    let avg_price = match resp.avg_price {
        Some(p) if p > Decimal::ZERO => p,
        _ => {
            return Err(ExchangeError::InvalidResponse(
                "missing or non-positive avgPrice".into(),
            ))
        }
    };

    let quantity = resp
        .orig_qty
        .or(resp.executed_qty)
        .ok_or_else(|| ExchangeError::InvalidResponse("missing quantity".into()))?;

    Ok(ValidatedOrder {
        order_id,
        symbol,
        avg_price,
        executed_qty: resp.executed_qty.unwrap_or(quantity),
        quantity,
        position_side: resp.position_side,
        update_time_ms: resp.update_time,
    })
}
