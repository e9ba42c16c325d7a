use anyhow::{bail, Context};

/// Simple JSON-RPC 2.0 client used by the wallet to talk to a running node.
///
/// Uses raw HTTP POST with serde_json rather than the full jsonrpsee client
/// to keep the wallet binary lean and dependency-minimal.
pub struct WalletRpcClient {
    url: String,
    client: reqwest::Client,
}

impl WalletRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(&self, method: &str, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;

        let json: serde_json::Value = resp.json().await.context("parsing RPC response")?;

        if let Some(err) = json.get("error") {
            bail!("RPC error: {}", err);
        }

        Ok(json["result"].clone())
    }

    /// Get the next nonce an account should use. Unknown accounts are nonce 0.
    pub async fn get_nonce(&self, address_hex: &str) -> anyhow::Result<u64> {
        let result = self.call("chronx_getNonce", serde_json::json!([address_hex])).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    /// Get account balance, as a decimal string parsed into u128.
    pub async fn get_balance(&self, address_hex: &str) -> anyhow::Result<u128> {
        let result = self.call("chronx_getBalance", serde_json::json!([address_hex])).await?;
        let bal_str = result.as_str().context("expected string balance")?;
        bal_str.parse().context("parsing balance")
    }

    /// Submit a signed transaction (hex-encoded canonical bytes). Returns the
    /// transaction hash hex on success.
    pub async fn send_transaction(&self, tx_hex: &str) -> anyhow::Result<String> {
        let result = self.call("chronx_sendTransaction", serde_json::json!([tx_hex])).await?;
        result.as_str().map(|s| s.to_string()).context("expected hash string from sendTransaction")
    }

    /// Look up a transaction by hash hex.
    pub async fn get_transaction(&self, hash_hex: &str) -> anyhow::Result<serde_json::Value> {
        self.call("chronx_getTransaction", serde_json::json!([hash_hex])).await
    }

    /// Fetch chain/genesis info as raw JSON.
    pub async fn get_genesis_info(&self) -> anyhow::Result<serde_json::Value> {
        self.call("chronx_getGenesisInfo", serde_json::json!([])).await
    }

    /// Fetch resolved chain configuration as raw JSON.
    pub async fn get_chain_info(&self) -> anyhow::Result<serde_json::Value> {
        self.call("chronx_getChainInfo", serde_json::json!([])).await
    }
}
