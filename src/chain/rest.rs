//! Terra node client
//!
//! Reads chain state through the Tendermint RPC (`/status`, `/abci_query`)
//! and submits signed amino transactions through the LCD REST server
//! (`/auth/accounts`, `/txs`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::signing::FeederKey;
use super::types::{
    u64_from_str_or_num, AccountInfo, BroadcastResult, ChainStatus, Coin, OracleMsg, OracleParams,
    StdFee, StdSignDoc, StdTx,
};
use super::LedgerClient;
use crate::config::AppConfig;
use crate::types::{OnChainPrevote, ValidatorAddress};

const PARAMS_PATH: &str = "custom/oracle/parameters";
const PREVOTES_PATH: &str = "custom/oracle/prevotes";

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    latest_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct AbciQueryResult {
    response: AbciResponse,
}

#[derive(Debug, Deserialize)]
struct AbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrevoteEntry {
    hash: String,
    denom: String,
    #[serde(default)]
    voter: String,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    submit_block: u64,
}

#[derive(Debug, Serialize)]
struct PrevotesQuery<'a> {
    voter: &'a str,
    denom: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    result: AccountResult,
}

#[derive(Debug, Deserialize)]
struct AccountResult {
    value: AccountValue,
}

#[derive(Debug, Deserialize)]
struct AccountValue {
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    account_number: u64,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    sequence: u64,
}

#[derive(Debug, Serialize)]
struct BroadcastRequest<'a> {
    tx: &'a StdTx,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

fn parse_status(body: &str) -> Result<ChainStatus> {
    let envelope: RpcEnvelope<StatusResult> =
        serde_json::from_str(body).context("Failed to parse status response")?;
    if let Some(err) = envelope.error {
        bail!("status query failed: {}", err);
    }
    let result = envelope.result.context("status response has no result")?;
    Ok(ChainStatus {
        latest_block_height: result.sync_info.latest_block_height,
    })
}

/// Raw value of an ABCI query; `None` when the store holds nothing
fn parse_abci_value(path: &str, body: &str) -> Result<Option<Vec<u8>>> {
    let envelope: RpcEnvelope<AbciQueryResult> =
        serde_json::from_str(body).with_context(|| format!("Failed to parse {} response", path))?;
    if let Some(err) = envelope.error {
        bail!("abci query {} failed: {}", path, err);
    }
    let response = envelope
        .result
        .with_context(|| format!("abci query {} has no result", path))?
        .response;

    if response.code != 0 {
        bail!(
            "abci query {} returned code {}: {}",
            path,
            response.code,
            response.log
        );
    }

    match response.value {
        Some(v) if !v.is_empty() => general_purpose::STANDARD
            .decode(v.trim())
            .map(Some)
            .with_context(|| format!("abci query {} value is not base64", path)),
        _ => Ok(None),
    }
}

fn parse_prevotes(raw: Option<&[u8]>) -> Result<Vec<OnChainPrevote>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let entries: Option<Vec<PrevoteEntry>> =
        serde_json::from_slice(raw).context("Failed to parse prevotes")?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .map(|e| OnChainPrevote {
            denom: e.denom,
            hash: e.hash,
            voter: e.voter,
            submit_block: e.submit_block,
        })
        .collect())
}

fn parse_account(body: &str) -> Result<AccountInfo> {
    let envelope: AccountEnvelope =
        serde_json::from_str(body).context("Failed to parse account response")?;
    Ok(AccountInfo {
        account_number: envelope.result.value.account_number,
        sequence: envelope.result.value.sequence,
    })
}

fn parse_broadcast(body: &str) -> Result<BroadcastResult> {
    let response: BroadcastResponse =
        serde_json::from_str(body).context("Failed to parse broadcast response")?;
    Ok(BroadcastResult {
        tx_hash: response.txhash,
        code: response.code,
        raw_log: response.raw_log,
    })
}

/// Transaction settings applied to every broadcast
#[derive(Debug, Clone)]
pub struct TxSettings {
    pub chain_id: String,
    pub gas: u64,
    pub fee_amount: u64,
    pub fee_denom: String,
    pub memo: String,
    pub broadcast_mode: String,
}

/// Ledger client backed by a Terra full node
pub struct TerraClient {
    client: Client,
    rpc_url: String,
    lcd_url: String,
    feeder: String,
    key: FeederKey,
    settings: TxSettings,
}

impl TerraClient {
    pub fn new(
        client: Client,
        rpc_url: &str,
        lcd_url: &str,
        feeder: String,
        key: FeederKey,
        settings: TxSettings,
    ) -> Self {
        Self {
            client,
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            feeder,
            key,
            settings,
        }
    }

    /// Build from the application config
    pub fn from_config(client: Client, config: &AppConfig, feeder: String, key: FeederKey) -> Self {
        let settings = TxSettings {
            chain_id: config.feeder.chain_id.clone(),
            gas: config.tx.gas,
            fee_amount: config.tx.fee_amount,
            fee_denom: config.tx.fee_denom.clone(),
            memo: config.tx.memo.clone(),
            broadcast_mode: config.tx.broadcast_mode.clone(),
        };
        Self::new(
            client,
            &config.node.rpc_url,
            &config.node.lcd_url,
            feeder,
            key,
            settings,
        )
    }

    async fn get_text(&self, url: &str, what: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        if !response.status().is_success() {
            bail!("{} returned HTTP {}", what, response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {} body", what))
    }

    async fn abci_query(&self, path: &str, data: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let mut url = format!("{}/abci_query?path=\"{}\"", self.rpc_url, path);
        if let Some(data) = data {
            url.push_str(&format!("&data=0x{}", hex::encode(data)));
        }
        let body = self.get_text(&url, path).await?;
        parse_abci_value(path, &body)
    }

    async fn fetch_account(&self) -> Result<AccountInfo> {
        let url = format!("{}/auth/accounts/{}", self.lcd_url, self.feeder);
        let body = self.get_text(&url, "account").await?;
        parse_account(&body)
    }

    fn sign_doc(&self, msgs: &[OracleMsg], account: AccountInfo) -> StdSignDoc {
        StdSignDoc {
            account_number: account.account_number.to_string(),
            chain_id: self.settings.chain_id.clone(),
            fee: self.fee(),
            memo: self.settings.memo.clone(),
            msgs: msgs.to_vec(),
            sequence: account.sequence.to_string(),
        }
    }

    /// Zero-amount coins are dropped, as the SDK does when building coin sets
    fn fee(&self) -> StdFee {
        let amount = if self.settings.fee_amount == 0 {
            Vec::new()
        } else {
            vec![Coin {
                denom: self.settings.fee_denom.clone(),
                amount: self.settings.fee_amount.to_string(),
            }]
        };
        StdFee {
            amount,
            gas: self.settings.gas.to_string(),
        }
    }
}

#[async_trait]
impl LedgerClient for TerraClient {
    async fn fetch_oracle_params(&self) -> Result<OracleParams> {
        match self.abci_query(PARAMS_PATH, None).await? {
            Some(raw) => serde_json::from_slice(&raw).context("Failed to parse oracle params"),
            None => Ok(OracleParams::default()),
        }
    }

    async fn fetch_validator_prevotes(
        &self,
        validator: &ValidatorAddress,
    ) -> Result<Vec<OnChainPrevote>> {
        let query = serde_json::to_vec(&PrevotesQuery {
            voter: validator.as_str(),
            denom: "",
        })
        .context("Failed to encode prevotes query")?;

        let raw = self.abci_query(PREVOTES_PATH, Some(&query)).await?;
        parse_prevotes(raw.as_deref())
    }

    async fn current_status(&self) -> Result<ChainStatus> {
        let url = format!("{}/status", self.rpc_url);
        let body = self.get_text(&url, "status").await?;
        parse_status(&body)
    }

    async fn sign_and_broadcast(&self, msgs: &[OracleMsg]) -> Result<BroadcastResult> {
        if msgs.is_empty() {
            bail!("refusing to broadcast an empty transaction");
        }

        let account = self.fetch_account().await?;
        let doc = self.sign_doc(msgs, account);
        let signature = self.key.sign(&doc)?;

        let tx = StdTx {
            msg: msgs.to_vec(),
            fee: self.fee(),
            signatures: vec![signature],
            memo: self.settings.memo.clone(),
        };

        tracing::debug!(
            messages = msgs.len(),
            sequence = account.sequence,
            "Broadcasting oracle transaction"
        );

        let response = self
            .client
            .post(format!("{}/txs", self.lcd_url))
            .json(&BroadcastRequest {
                tx: &tx,
                mode: &self.settings.broadcast_mode,
            })
            .send()
            .await
            .context("Failed to broadcast transaction")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read broadcast response")?;
        if !status.is_success() {
            bail!("broadcast returned HTTP {}: {}", status, body);
        }

        parse_broadcast(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(fee_amount: u64) -> TerraClient {
        let key = FeederKey::from_hex(
            "0x59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59",
        )
        .unwrap();
        TerraClient::new(
            Client::new(),
            "http://localhost:26657/",
            "http://localhost:1317",
            "terra1hwjr0j6v5s8cuwtvza9jaqz7s3nfnxyw4vkdmf".to_string(),
            key,
            TxSettings {
                chain_id: "columbus-3".to_string(),
                gas: 200_000,
                fee_amount,
                fee_denom: "uluna".to_string(),
                memo: String::new(),
                broadcast_mode: "block".to_string(),
            },
        )
    }

    #[test]
    fn sign_doc_carries_account_and_fee() {
        let account = AccountInfo {
            account_number: 42,
            sequence: 9,
        };

        let doc = client(0).sign_doc(&[], account);
        assert_eq!(doc.account_number, "42");
        assert_eq!(doc.sequence, "9");
        assert_eq!(doc.chain_id, "columbus-3");
        assert!(doc.fee.amount.is_empty());
        assert_eq!(doc.fee.gas, "200000");

        let doc = client(3000).sign_doc(&[], account);
        assert_eq!(doc.fee.amount[0].amount, "3000");
        assert_eq!(doc.fee.amount[0].denom, "uluna");
    }

    #[test]
    fn status_height_is_parsed_from_string() {
        let body = r#"{"jsonrpc":"2.0","id":-1,"result":{"node_info":{},"sync_info":{"latest_block_hash":"AB","latest_block_height":"1234567","catching_up":false}}}"#;
        assert_eq!(parse_status(body).unwrap().latest_block_height, 1_234_567);
    }

    #[test]
    fn rpc_error_is_reported() {
        let body = r#"{"jsonrpc":"2.0","id":-1,"error":{"code":-32603,"message":"Internal error"}}"#;
        assert!(parse_status(body).is_err());
    }

    #[test]
    fn abci_value_is_base64_decoded() {
        let value = general_purpose::STANDARD.encode(br#"{"vote_period":"5"}"#);
        let body = format!(
            r#"{{"jsonrpc":"2.0","id":-1,"result":{{"response":{{"code":0,"log":"","value":"{}"}}}}}}"#,
            value
        );
        let raw = parse_abci_value(PARAMS_PATH, &body).unwrap().unwrap();
        let params: OracleParams = serde_json::from_slice(&raw).unwrap();
        assert_eq!(params.vote_period, 5);
    }

    #[test]
    fn abci_error_code_is_reported() {
        let body = r#"{"result":{"response":{"code":6,"log":"unknown query path","value":null}}}"#;
        assert!(parse_abci_value(PARAMS_PATH, body).is_err());
    }

    #[test]
    fn prevotes_parse_and_tolerate_null() {
        let raw = br#"[{"hash":"aa","denom":"ukrw","voter":"terravaloper1x","submit_block":"100"},{"hash":"bb","denom":"uusd","voter":"terravaloper1x","submit_block":"100"}]"#;
        let prevotes = parse_prevotes(Some(raw)).unwrap();
        assert_eq!(prevotes.len(), 2);
        assert_eq!(prevotes[1].denom, "uusd");
        assert_eq!(prevotes[1].hash, "bb");
        assert_eq!(prevotes[0].submit_block, 100);

        assert!(parse_prevotes(Some(b"null")).unwrap().is_empty());
        assert!(parse_prevotes(None).unwrap().is_empty());
    }

    #[test]
    fn account_and_broadcast_responses_parse() {
        let account = parse_account(
            r#"{"height":"10","result":{"type":"core/Account","value":{"address":"terra1x","account_number":"42","sequence":"9"}}}"#,
        )
        .unwrap();
        assert_eq!(account.account_number, 42);
        assert_eq!(account.sequence, 9);

        let ok = parse_broadcast(r#"{"height":"11","txhash":"ABCD","raw_log":"[]"}"#).unwrap();
        assert_eq!(ok.code, 0);
        assert_eq!(ok.tx_hash, "ABCD");

        let failed =
            parse_broadcast(r#"{"height":"11","txhash":"EF01","code":3,"raw_log":"invalid sequence"}"#)
                .unwrap();
        assert_eq!(failed.code, 3);
    }
}
