//! Thin asynchronous client for the Tenso shipping estimate endpoint.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::debug;

use super::{read_reply, ClientError, HttpReply, QuoteTransport};
use crate::domain::EstimateRequest;
use crate::util::version::user_agent;

pub const DEFAULT_BASE_URL: &str = "https://www.tenso.com/";
pub const DEFAULT_ESTIMATE_PATH: &str = "api/en/estimate";

#[derive(Clone)]
pub struct TensoClient {
    http: Client,
    endpoint: Url,
}

impl TensoClient {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_base_url(DEFAULT_BASE_URL, DEFAULT_ESTIMATE_PATH)
    }

    pub fn with_base_url(base: &str, estimate_path: &str) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base)?.join(estimate_path)?;
        let http = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl QuoteTransport for TensoClient {
    async fn estimate(&self, request: &EstimateRequest) -> Result<HttpReply, ClientError> {
        debug!(url = %self.endpoint, weight = %request.weight, "posting estimate request");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .json(request)
            .send()
            .await?;
        Ok(read_reply(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let client = TensoClient::with_base_url("https://example.test/proxy/", "api/en/estimate")
            .unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://example.test/proxy/api/en/estimate"
        );
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(matches!(
            TensoClient::with_base_url("not a url", "api"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
