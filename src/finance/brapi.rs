//! brapi.dev quote client

use super::MetricsSource;
use crate::error::AgentError;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BrapiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BrapiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent("FinanceAdvisor/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn query<'a>(&'a self, period: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("range", period),
            ("fundamental", "true"),
            ("dividends", "true"),
        ];
        if let Some(token) = self.token.as_deref() {
            params.push(("token", token));
        }
        params
    }
}

#[async_trait::async_trait]
impl MetricsSource for BrapiClient {
    async fn fetch_raw(&self, ticker: &str, period: &str) -> Result<Value> {
        let url = format!("{}/quote/{}", self.base_url, ticker);
        debug!(ticker, period, "Fetching quote from brapi");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&self.query(period))
            .send()
            .await
            .map_err(|e| {
                AgentError::DataUnavailable(format!("brapi request failed for {}: {}", ticker, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(ticker, %status, "brapi returned an error");
            return Err(AgentError::DataUnavailable(format!(
                "brapi returned {} for {}: {}",
                status, ticker, body
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            AgentError::DataUnavailable(format!("Invalid JSON from brapi for {}: {}", ticker, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_includes_token_only_when_configured() {
        let anonymous = BrapiClient::new("https://brapi.dev/api/", None).unwrap();
        assert_eq!(anonymous.base_url, "https://brapi.dev/api");
        assert!(!anonymous.query("1y").iter().any(|(k, _)| *k == "token"));

        let authed = BrapiClient::new("https://brapi.dev/api", Some("t0k".to_string())).unwrap();
        let params = authed.query("6mo");
        assert!(params.contains(&("range", "6mo")));
        assert!(params.contains(&("token", "t0k")));
    }
}
