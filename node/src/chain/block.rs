//! Blocks, transactions, receipts, and logs.

use alloy_eips::{eip2930::AccessList, eip7702::SignedAuthorization};
use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Block as returned by `eth_getBlockByNumber`.
///
/// Header fields are typed so the header hash can be recomputed; anything
/// else the node returns (`totalDifficulty`, L2 extensions) is carried in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(default)]
    pub sha3_uncles: B256,
    pub miner: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    #[serde(default)]
    pub difficulty: U256,
    #[serde(with = "alloy_serde::quantity")]
    pub gas_limit: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    pub extra_data: Bytes,
    #[serde(default)]
    pub mix_hash: B256,
    #[serde(default)]
    pub nonce: B64,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_fee_per_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<B256>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub blob_gas_used: Option<u64>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub excess_blob_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_hash: Option<B256>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    #[serde(default)]
    pub uncles: Vec<B256>,
    pub transactions: BlockTransactions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Block body transactions: full objects or hashes, depending on the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Full(Vec<Transaction>),
    Hashes(Vec<B256>),
}

impl BlockTransactions {
    pub fn len(&self) -> usize {
        match self {
            Self::Full(txs) => txs.len(),
            Self::Hashes(hashes) => hashes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hashes(&self) -> Vec<B256> {
        match self {
            Self::Full(txs) => txs.iter().map(|tx| tx.hash).collect(),
            Self::Hashes(hashes) => hashes.clone(),
        }
    }

    /// Full transaction objects, if the block was fetched with them.
    pub fn as_full(&self) -> Option<&[Transaction]> {
        match self {
            Self::Full(txs) => Some(txs),
            Self::Hashes(hashes) if hashes.is_empty() => Some(&[]),
            Self::Hashes(_) => None,
        }
    }
}

/// Transaction object covering every envelope the verification engine knows.
///
/// Fields outside a transaction's own envelope are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    #[serde(rename = "type", default, with = "alloy_serde::quantity")]
    pub tx_type: u64,
    #[serde(default, with = "alloy_serde::quantity")]
    pub nonce: u64,
    #[serde(default, with = "alloy_serde::quantity::opt")]
    pub transaction_index: Option<u64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default, with = "alloy_serde::quantity")]
    pub gas: u64,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<U256>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_list: Option<AccessList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_versioned_hashes: Option<Vec<B256>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_list: Option<Vec<SignedAuthorization>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<U256>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub y_parity: Option<u64>,

    // OP-stack deposits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system_tx: Option<bool>,

    // Arbitrum system envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_refund: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_fee_refund: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_base_fee: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_submission_fee: Option<U256>,

    /// Fields outside the envelopes above, e.g. `blockHash` or OP `l1Fee`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Receipt as returned by `eth_getBlockReceipts` / `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
    pub block_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(rename = "type", default, with = "alloy_serde::quantity")]
    pub tx_type: u64,
    /// Post-Byzantium outcome.
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<u64>,
    /// Pre-Byzantium intermediate state root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<B256>,
    #[serde(with = "alloy_serde::quantity")]
    pub cumulative_gas_used: u64,
    #[serde(default, with = "alloy_serde::quantity")]
    pub gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub deposit_nonce: Option<u64>,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub deposit_receipt_version: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub removed: bool,
}
