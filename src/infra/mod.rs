//! Outbound boundaries: the carrier estimate service, the exchange-rate
//! service and the on-disk rate cache.

pub mod cache;
pub mod fx;
pub mod tenso;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::EstimateRequest;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Status and body text of a completed HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carrier estimate endpoint.
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    async fn estimate(&self, request: &EstimateRequest) -> Result<HttpReply, ClientError>;
}

/// Latest-rates endpoint for the source currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn latest(&self) -> Result<HttpReply, ClientError>;
}

/// Read a response body, tolerating failures as empty text.
pub(crate) async fn read_reply(response: reqwest::Response) -> HttpReply {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    HttpReply { status, body }
}
