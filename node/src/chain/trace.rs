//! Parity-style traces and geth debug tracer output.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One frame of `trace_block` / `trace_replayBlockTransactions` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub subtraces: u64,
    pub trace_address: Vec<u64>,
    /// Absent on block and uncle reward frames.
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub transaction_position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// Per-account changes in a parity `stateDiff`. Each field is `"="` or a
/// `{"+": ..}`, `{"-": ..}`, `{"*": {"from": .., "to": ..}}` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDiff {
    pub balance: Value,
    pub code: Value,
    pub nonce: Value,
    #[serde(default)]
    pub storage: BTreeMap<B256, Value>,
}

pub type StateDiff = BTreeMap<Address, AccountDiff>;

/// Raw `trace_replayBlockTransactions` entry; some nodes omit the hash.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub trace: Option<Vec<TraceFrame>>,
    #[serde(default)]
    pub state_diff: Option<StateDiff>,
}

/// Trace output attached to one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceReplay {
    pub transaction_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<StateDiff>,
}

/// One entry of a `debug_traceBlockByHash` result.
///
/// Nodes differ: most wrap each result with the transaction hash, some return
/// bare results, and a failed tracer reports `error` instead of `result`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTxResult<T> {
    #[serde(default)]
    pub tx_hash: Option<B256>,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Call frame produced by `callTracer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<DebugFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<DebugLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<U256>,
}

/// `prestateTracer` output in diff mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugStateDiff {
    #[serde(default)]
    pub pre: BTreeMap<Address, DebugAccountState>,
    #[serde(default)]
    pub post: BTreeMap<Address, DebugAccountState>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugAccountState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<BTreeMap<B256, B256>>,
}

/// Call tree for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCallTrace {
    pub transaction_hash: B256,
    pub frame: DebugFrame,
}

/// Prestate diff for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStateDiff {
    pub transaction_hash: B256,
    pub diff: DebugStateDiff,
}
