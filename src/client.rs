//! Balance API Client
//!
//! HTTP implementation of [`BalanceSource`] over the dashboard's REST API.

use crate::config::SourceConfig;
use crate::sync::{BalanceSource, SourceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

/// REST client for account balances
pub struct HttpBalanceSource {
    client: Client,
    base_url: String,
}

impl HttpBalanceSource {
    /// Create a new client with the given configuration
    pub fn new(config: &SourceConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn account_url(&self, account_id: &str, path: &str) -> String {
        format!(
            "{}/accounts/{}/{}",
            self.base_url,
            urlencoding::encode(account_id),
            path
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        tracing::trace!(url, "GET");

        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| SourceError::InvalidResponse(e.to_string()))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(status_error(status, text))
        }
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    async fn list_groves(&self, account_id: &str) -> Result<Vec<String>, SourceError> {
        let url = self.account_url(account_id, "groves");
        let body: GrovesResponse = self.get_json(&url).await?;
        Ok(body.groves)
    }

    async fn grove_token_balance(
        &self,
        account_id: &str,
        grove_id: &str,
    ) -> Result<u64, SourceError> {
        let path = format!("groves/{}/balance", urlencoding::encode(grove_id));
        let url = self.account_url(account_id, &path);
        let body: AmountResponse = self.get_json(&url).await?;
        Ok(body.balance)
    }

    async fn usdc_balance(&self, account_id: &str) -> Result<u64, SourceError> {
        let url = self.account_url(account_id, "usdc");
        let body: AmountResponse = self.get_json(&url).await?;
        Ok(body.balance)
    }

    async fn lp_token_balances(
        &self,
        account_id: &str,
    ) -> Result<BTreeMap<String, u64>, SourceError> {
        let url = self.account_url(account_id, "lp-tokens");
        let body: LpTokensResponse = self.get_json(&url).await?;
        Ok(body.balances)
    }

    async fn revenue_balance(&self, account_id: &str) -> Result<u64, SourceError> {
        let url = self.account_url(account_id, "revenue");
        let body: AmountResponse = self.get_json(&url).await?;
        Ok(body.balance)
    }

    async fn pending_distribution(&self, account_id: &str) -> Result<u64, SourceError> {
        let url = self.account_url(account_id, "distributions/pending");
        let body: AmountResponse = self.get_json(&url).await?;
        Ok(body.balance)
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else if e.is_decode() {
        SourceError::InvalidResponse(e.to_string())
    } else {
        SourceError::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, message: String) -> SourceError {
    let detail = format!("status {}: {}", status.as_u16(), message);
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => SourceError::Upstream(detail),
        _ if status.is_server_error() => SourceError::Upstream(detail),
        _ => SourceError::InvalidResponse(detail),
    }
}

// ============================================
// Response DTOs
// ============================================

#[derive(Debug, Deserialize)]
struct GrovesResponse {
    #[serde(default)]
    groves: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct LpTokensResponse {
    #[serde(default)]
    balances: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_urls() {
        let config = SourceConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            request_timeout_ms: 1000,
        };
        let client = HttpBalanceSource::new(&config);

        assert_eq!(client.base_url(), "https://api.example.com/v1");
        assert_eq!(
            client.account_url("0.0.1234", "usdc"),
            "https://api.example.com/v1/accounts/0.0.1234/usdc"
        );
        assert_eq!(
            client.account_url("a b", "revenue"),
            "https://api.example.com/v1/accounts/a%20b/revenue"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            SourceError::NotFound(_)
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, String::new()).is_transient());
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "no grove".into()).to_string(),
            "Not found: status 404: no grove"
        );
    }

    #[test]
    fn test_response_parsing() {
        let groves: GrovesResponse =
            serde_json::from_str(r#"{"groves":["g1","g2"]}"#).unwrap();
        assert_eq!(groves.groves, vec!["g1", "g2"]);

        let lp: LpTokensResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(lp.balances.is_empty());

        let amount: AmountResponse = serde_json::from_str(r#"{"balance":1500}"#).unwrap();
        assert_eq!(amount.balance, 1500);
    }
}
