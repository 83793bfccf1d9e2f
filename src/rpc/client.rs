use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::Txid;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::error::RpcError;
use super::error::RpcResult;
use super::transport::Transport;
use super::BlockHeaderInfo;
use super::RpcClient;

/// `getblockheader <hash> true` as bitcoind writes it.
#[derive(Debug, Deserialize)]
struct RawBlockHeader {
    hash: String,
    height: u64,
    time: u32,
    bits: String,
    #[serde(rename = "previousblockhash")]
    previous_block_hash: Option<String>,
    confirmations: i64,
}

impl TryFrom<RawBlockHeader> for BlockHeaderInfo {
    type Error = RpcError;

    fn try_from(raw: RawBlockHeader) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: parse_hash(&raw.hash)?,
            height: raw.height,
            time: raw.time,
            bits: u32::from_str_radix(&raw.bits, 16)
                .map(CompactTarget::from_consensus)
                .map_err(|e| RpcError::InvalidResponse(format!("bits {}: {e}", raw.bits)))?,
            previous_block_hash: raw
                .previous_block_hash
                .as_deref()
                .map(parse_hash)
                .transpose()?,
            confirmations: raw.confirmations,
        })
    }
}

/// Parses a block hash or txid in the byte-reversed hex the node prints.
fn parse_hash<H: FromStr>(s: &str) -> RpcResult<H>
where
    H::Err: std::fmt::Display,
{
    H::from_str(s).map_err(|e| RpcError::InvalidResponse(format!("hash {s}: {e}")))
}

/// [`RpcClient`] on top of any JSON-RPC [`Transport`].
#[derive(Debug, Clone)]
pub struct BitcoindRpcClient<T: Transport> {
    transport: T,
}

impl<T: Transport> BitcoindRpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call_as<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> RpcResult<R> {
        let value = self.transport.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
    }

    async fn call_for_hex(&self, method: &str, params: serde_json::Value) -> RpcResult<Vec<u8>> {
        let hex_string: String = self.call_as(method, params).await?;
        Ok(hex::decode(hex_string)?)
    }
}

#[async_trait]
impl<T: Transport> RpcClient for BitcoindRpcClient<T> {
    async fn send_to_address(&self, address: &Address, amount: Amount) -> RpcResult<Txid> {
        let txid: String = self
            .call_as(
                "sendtoaddress",
                json!([address.to_string(), amount.to_btc()]),
            )
            .await?;
        parse_hash(&txid)
    }

    async fn get_raw_transaction_as_bytes(&self, txid: &Txid) -> RpcResult<Vec<u8>> {
        self.call_for_hex("getrawtransaction", json!([txid.to_string(), 0]))
            .await
    }

    async fn get_best_block_hash(&self) -> RpcResult<BlockHash> {
        let hash: String = self.call_as("getbestblockhash", json!([])).await?;
        parse_hash(&hash)
    }

    async fn get_block_header(&self, hash: &BlockHash) -> RpcResult<BlockHeaderInfo> {
        let raw: RawBlockHeader = self
            .call_as("getblockheader", json!([hash.to_string(), true]))
            .await?;
        raw.try_into()
    }

    async fn get_block_as_bytes(&self, hash: &BlockHash) -> RpcResult<Vec<u8>> {
        self.call_for_hex("getblock", json!([hash.to_string(), 0]))
            .await
    }

    async fn generate(&self, blocks: u32) -> RpcResult<Vec<BlockHash>> {
        let hashes: Vec<String> = self.call_as("generate", json!([blocks])).await?;
        hashes.iter().map(|h| parse_hash(h)).collect()
    }

    async fn submit_block(&self, block: &[u8]) -> RpcResult<Option<String>> {
        let value = self
            .transport
            .call("submitblock", json!([hex::encode(block)]))
            .await?;
        Ok(match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(reason) if reason.is_empty() => None,
            serde_json::Value::String(reason) => Some(reason),
            other => Some(other.to_string()),
        })
    }

    async fn get_block_count(&self) -> RpcResult<u64> {
        self.call_as("getblockcount", json!([])).await
    }

    async fn stop(&self) -> RpcResult<()> {
        self.transport.call("stop", json!([])).await?;
        Ok(())
    }
}
