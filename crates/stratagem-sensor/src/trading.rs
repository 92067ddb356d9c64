use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stratagem_core::config::ETH_GAS_RESERVE;

use crate::error::{Result, SensorError};
use crate::MetricSensor;

/// ERC-20 `balanceOf(address)` selector for the eth_call below.
const BALANCE_OF_SELECTOR: &str = "0x70a08231";

/// One wallet reading: native balance, enumerated token holdings, and the
/// USD valuation the price oracle gave us at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub eth_balance: f64,
    pub eth_balance_reserved: f64,
    pub eth_balance_available: f64,
    pub eth_price_usd: f64,
    pub tokens: HashMap<String, TokenHolding>,
    pub total_value_usd: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHolding {
    pub symbol: String,
    pub balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
}

/// Reads the agent's managed wallet: address from the signer service,
/// native balance from a JSON-RPC node, token holdings from a transfer
/// indexer, prices from a public oracle. Missing credentials or any
/// upstream failure degrade to [`PortfolioSnapshot::mock`].
pub struct TradingSensor {
    client: reqwest::Client,
    agent_id: String,
    signer_url: String,
    rpc_url: String,
    indexer_url: String,
    indexer_api_key: String,
    price_oracle_url: String,
}

impl TradingSensor {
    pub fn new(
        agent_id: impl Into<String>,
        signer_url: impl Into<String>,
        rpc_url: impl Into<String>,
        indexer_url: impl Into<String>,
        indexer_api_key: impl Into<String>,
        price_oracle_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            agent_id: agent_id.into(),
            signer_url: signer_url.into(),
            rpc_url: rpc_url.into(),
            indexer_url: indexer_url.into(),
            indexer_api_key: indexer_api_key.into(),
            price_oracle_url: price_oracle_url.into(),
        }
    }

    /// The wallet snapshot, or the mock portfolio if anything upstream
    /// fails.
    pub async fn portfolio_or_default(&self) -> PortfolioSnapshot {
        match self.portfolio().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "portfolio read failed, using mock portfolio");
                PortfolioSnapshot::mock()
            }
        }
    }

    /// The real read path. Fails fast when credentials are absent so the
    /// caller can fall back without network timeouts.
    pub async fn portfolio(&self) -> Result<PortfolioSnapshot> {
        if self.signer_url.is_empty() {
            return Err(SensorError::MissingCredentials("signer_url"));
        }
        if self.rpc_url.is_empty() {
            return Err(SensorError::MissingCredentials("rpc_url"));
        }

        let address = self.managed_address().await?;
        debug!(%address, "reading wallet state");

        let eth_balance = self.native_balance(&address).await?;
        let eth_balance_available = (eth_balance - ETH_GAS_RESERVE).max(0.0);

        let mut tokens = self.token_holdings(&address).await.unwrap_or_else(|e| {
            warn!(error = %e, "token enumeration failed, continuing with native only");
            HashMap::new()
        });

        let eth_price_usd = self.eth_price().await?;
        let mut total_value_usd = eth_balance * eth_price_usd;
        for (token_addr, holding) in tokens.iter_mut() {
            if let Ok(Some(price)) = self.token_price(token_addr).await {
                holding.price_usd = Some(price);
                total_value_usd += holding.balance * price;
            }
        }

        Ok(PortfolioSnapshot {
            eth_balance,
            eth_balance_reserved: ETH_GAS_RESERVE,
            eth_balance_available,
            eth_price_usd,
            tokens,
            total_value_usd,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// `GET {signer}/api/v1/addresses` with the agent header.
    async fn managed_address(&self) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/api/v1/addresses", self.signer_url))
            .header("x-superior-agent-id", &self.agent_id)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SensorError::Api { status, message });
        }

        let body: AddressResponse = resp.json().await?;
        Ok(body.evm)
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<String> {
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1,
            }))
            .send()
            .await?;

        let body: RpcResponse = resp.json().await?;
        body.result
            .ok_or_else(|| SensorError::Parse(format!("{} returned no result", method)))
    }

    async fn native_balance(&self, address: &str) -> Result<f64> {
        let hex = self
            .rpc_call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        wei_hex_to_ether(&hex)
    }

    /// Enumerate token contracts the wallet has ever received, then read
    /// each live balance with an `eth_call` to `balanceOf`.
    async fn token_holdings(&self, address: &str) -> Result<HashMap<String, TokenHolding>> {
        let url = format!(
            "{}?module=account&action=tokentx&address={}&sort=desc&apikey={}",
            self.indexer_url, address, self.indexer_api_key
        );
        let resp: IndexerResponse = self.client.get(&url).send().await?.json().await?;

        let mut tokens = HashMap::new();
        if resp.status != "1" {
            return Ok(tokens);
        }

        for tx in resp.result {
            if tokens.contains_key(&tx.contract_address) {
                continue;
            }
            let decimals: u32 = tx.token_decimal.parse().unwrap_or(18);
            match self.erc20_balance(&tx.contract_address, address, decimals).await {
                Ok(balance) if balance > 0.0 => {
                    tokens.insert(
                        tx.contract_address.clone(),
                        TokenHolding {
                            symbol: tx.token_symbol.clone(),
                            balance,
                            price_usd: None,
                        },
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(token = %tx.contract_address, error = %e, "balance read failed");
                }
            }
        }
        Ok(tokens)
    }

    async fn erc20_balance(&self, token: &str, holder: &str, decimals: u32) -> Result<f64> {
        let holder_padded = format!("{:0>64}", holder.trim_start_matches("0x"));
        let data = format!("{}{}", BALANCE_OF_SELECTOR, holder_padded);
        let hex = self
            .rpc_call(
                "eth_call",
                serde_json::json!([{ "to": token, "data": data }, "latest"]),
            )
            .await?;
        let raw = u128::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| SensorError::Parse(format!("balanceOf result: {}", e)))?;
        Ok(raw as f64 / 10f64.powi(decimals as i32))
    }

    async fn eth_price(&self) -> Result<f64> {
        let url = format!(
            "{}/simple/price?ids=ethereum&vs_currencies=usd",
            self.price_oracle_url
        );
        let body: serde_json::Value = self.client.get(&url).send().await?.json().await?;
        body.pointer("/ethereum/usd")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| SensorError::Parse("missing ethereum price".to_string()))
    }

    async fn token_price(&self, token_addr: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/simple/token_price/ethereum?contract_addresses={}&vs_currencies=usd",
            self.price_oracle_url, token_addr
        );
        let body: serde_json::Value = self.client.get(&url).send().await?.json().await?;
        Ok(body
            .pointer(&format!("/{}/usd", token_addr.to_lowercase()))
            .and_then(|v| v.as_f64()))
    }
}

impl PortfolioSnapshot {
    /// Synthetic wallet used when real data is unavailable: 100 USD total
    /// across ETH, USDT, and MATIC.
    pub fn mock() -> Self {
        let tokens = HashMap::from([
            (
                "0xdac17f958d2ee523a2206206994597c13d831ec7".to_string(),
                TokenHolding {
                    symbol: "USDT".to_string(),
                    balance: 30.0,
                    price_usd: Some(1.0),
                },
            ),
            (
                "0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0".to_string(),
                TokenHolding {
                    symbol: "MATIC".to_string(),
                    balance: 33.33,
                    price_usd: Some(0.90),
                },
            ),
        ]);

        Self {
            eth_balance: 0.0166,
            eth_balance_reserved: ETH_GAS_RESERVE,
            eth_balance_available: 0.0066,
            eth_price_usd: 2400.0,
            tokens,
            total_value_usd: 100.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
impl MetricSensor for TradingSensor {
    async fn metric_state(&self, metric_name: &str) -> String {
        match metric_name {
            "wallet" => {
                let snapshot = self.portfolio_or_default().await;
                serde_json::to_string(&snapshot).unwrap_or_default()
            }
            other => {
                warn!(metric = other, "unsupported trading metric, reporting empty state");
                String::new()
            }
        }
    }
}

fn wei_hex_to_ether(hex: &str) -> Result<f64> {
    let wei = u128::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| SensorError::Parse(format!("wei value: {}", e)))?;
    Ok(wei as f64 / 1e18)
}

// Wire types (deserialization only)

#[derive(Deserialize)]
struct AddressResponse {
    evm: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
}

#[derive(Deserialize)]
struct IndexerResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Vec<IndexerTransfer>,
}

#[derive(Deserialize)]
struct IndexerTransfer {
    #[serde(rename = "contractAddress")]
    contract_address: String,
    #[serde(rename = "tokenSymbol", default)]
    token_symbol: String,
    #[serde(rename = "tokenDecimal", default)]
    token_decimal: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_conversion() {
        assert_eq!(wei_hex_to_ether("0xde0b6b3a7640000").unwrap(), 1.0);
        assert_eq!(wei_hex_to_ether("0x0").unwrap(), 0.0);
        assert!(wei_hex_to_ether("not-hex").is_err());
    }

    #[test]
    fn mock_portfolio_is_the_documented_default() {
        let mock = PortfolioSnapshot::mock();
        assert_eq!(mock.eth_balance, 0.0166);
        assert_eq!(mock.total_value_usd, 100.0);
        assert_eq!(mock.eth_balance_reserved, ETH_GAS_RESERVE);
        assert_eq!(mock.tokens.len(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_degrade_to_mock_state() {
        let sensor = TradingSensor::new("phi", "", "", "", "", "");
        let state = sensor.metric_state("wallet").await;
        assert!(state.contains("eth_balance"));
        assert!(state.contains("100"));
    }

    #[tokio::test]
    async fn unknown_metric_reports_empty() {
        let sensor = TradingSensor::new("phi", "", "", "", "", "");
        assert_eq!(sensor.metric_state("followers").await, "");
    }
}
