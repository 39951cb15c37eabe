use async_trait::async_trait;
use reqwest::{header, Client, Url};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use super::{read_reply, ClientError, HttpReply, RateSource};
use crate::domain::quote::decimal_from_number;
use crate::util::version::user_agent;

pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/JPY";
pub const DEFAULT_TARGET_CURRENCY: &str = "USD";

#[derive(Debug, Error)]
pub enum RateFetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(#[from] ClientError),
    #[error("Invalid FX payload")]
    InvalidPayload,
}

#[derive(Clone)]
pub struct ExchangeRateClient {
    http: Client,
    url: Url,
}

impl ExchangeRateClient {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_url(DEFAULT_RATES_URL)
    }

    pub fn with_url(url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url)?;
        let http = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl RateSource for ExchangeRateClient {
    async fn latest(&self) -> Result<HttpReply, ClientError> {
        let response = self
            .http
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        Ok(read_reply(response).await)
    }
}

/// Pull `rates[target]` out of a latest-rates reply.
pub fn parse_rate(reply: &HttpReply, target: &str) -> Result<Decimal, RateFetchError> {
    if !reply.is_success() {
        return Err(RateFetchError::Status(reply.status));
    }
    let payload: Value =
        serde_json::from_str(&reply.body).map_err(|_| RateFetchError::InvalidPayload)?;
    payload
        .get("rates")
        .and_then(|rates| rates.get(target))
        .and_then(|rate| match rate {
            Value::Number(number) => decimal_from_number(number),
            _ => None,
        })
        .ok_or(RateFetchError::InvalidPayload)
}
