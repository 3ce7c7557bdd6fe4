//! Scripted transport and chain fixtures shared by tests.

use crate::{
    chain::{Receipt, Transaction},
    rpc::{RpcErrorObject, RpcRequest, RpcResponse, RpcTransport, TransportError},
};
use alloy_primitives::{Bloom, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// What the mock answers for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Value(Value),
    Error(RpcErrorObject),
    /// Fails the whole call. Inside a batch it poisons the batch.
    Fail(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Single,
    Batch,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub kind: CallKind,
    pub requests: Vec<RpcRequest>,
    pub retry_attempts: Option<u32>,
}

type Handler = Arc<dyn Fn(&RpcRequest) -> MockReply + Send + Sync>;
type BatchGuard = Arc<dyn Fn(&[RpcRequest]) -> Option<TransportError> + Send + Sync>;
type Delay = Arc<dyn Fn(&RpcRequest) -> Duration + Send + Sync>;

/// In-process [`RpcTransport`] driven by per-method handlers.
#[derive(Clone)]
pub struct MockTransport {
    handlers: HashMap<&'static str, Handler>,
    batch_guard: Option<BatchGuard>,
    delay: Option<Delay>,
    concurrency: usize,
    log: Arc<Mutex<Vec<CallRecord>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            batch_guard: None,
            delay: None,
            concurrency: 4,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on(
        mut self,
        method: &'static str,
        handler: impl Fn(&RpcRequest) -> MockReply + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    pub fn fail_batches_when(
        mut self,
        guard: impl Fn(&[RpcRequest]) -> Option<TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.batch_guard = Some(Arc::new(guard));
        self
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&RpcRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.log.lock().clone()
    }

    /// Number of requests issued for `method`, counting batch members.
    pub fn request_count(&self, method: &str) -> usize {
        self.log
            .lock()
            .iter()
            .flat_map(|call| call.requests.iter())
            .filter(|request| request.method == method)
            .count()
    }

    fn reply(&self, request: &RpcRequest) -> MockReply {
        match self.handlers.get(request.method) {
            Some(handler) => handler(request),
            None => MockReply::Error(RpcErrorObject::new(-32601, "method not found")),
        }
    }

    async fn pause(&self, requests: &[RpcRequest]) {
        if let Some(delay) = &self.delay {
            let longest = requests.iter().map(|request| delay(request)).max();
            if let Some(longest) = longest.filter(|d| !d.is_zero()) {
                tokio::time::sleep(longest).await;
            }
        }
    }

    fn record(&self, kind: CallKind, requests: &[RpcRequest], retry_attempts: Option<u32>) {
        self.log.lock().push(CallRecord {
            kind,
            requests: requests.to_vec(),
            retry_attempts,
        });
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        request: &RpcRequest,
        retry_attempts: Option<u32>,
    ) -> Result<RpcResponse, TransportError> {
        self.record(CallKind::Single, std::slice::from_ref(request), retry_attempts);
        self.pause(std::slice::from_ref(request)).await;
        match self.reply(request) {
            MockReply::Value(value) => Ok(Ok(value)),
            MockReply::Error(err) => Ok(Err(err)),
            MockReply::Fail(err) => Err(err),
        }
    }

    async fn batch_call(
        &self,
        requests: &[RpcRequest],
        retry_attempts: Option<u32>,
    ) -> Result<Vec<RpcResponse>, TransportError> {
        self.record(CallKind::Batch, requests, retry_attempts);
        self.pause(requests).await;
        if let Some(err) = self.batch_guard.as_ref().and_then(|guard| guard(requests)) {
            return Err(err);
        }
        requests
            .iter()
            .map(|request| match self.reply(request) {
                MockReply::Value(value) => Ok(Ok(value)),
                MockReply::Error(err) => Ok(Err(err)),
                MockReply::Fail(err) => Err(err),
            })
            .collect()
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn is_connection_error(&self, err: &TransportError) -> bool {
        matches!(err, TransportError::Connection(_) | TransportError::Timeout)
    }
}

pub fn hash_from_u64(value: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&value.to_be_bytes());
    B256::from(bytes)
}

/// Canonical hash of fixture block `number`.
pub fn block_hash(number: u64) -> B256 {
    hash_from_u64(0x1000_0000 + number)
}

/// Hash of the `index`-th transaction of fixture block `number`.
pub fn tx_hash(number: u64, index: u64) -> B256 {
    hash_from_u64(0x2000_0000 + number * 1_000 + index)
}

/// Reads the block number out of a `eth_getBlockByNumber`-style first param.
pub fn number_param(request: &RpcRequest) -> u64 {
    let raw = request.params[0].as_str().expect("quantity param");
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).expect("hex quantity")
}

/// Block JSON as served by `eth_getBlockByNumber` with hash-only transactions.
pub fn block_json(number: u64, hash: B256, parent_hash: B256, tx_count: u64) -> Value {
    let transactions: Vec<B256> = (0..tx_count).map(|idx| tx_hash(number, idx)).collect();
    json!({
        "number": format!("{number:#x}"),
        "hash": hash,
        "parentHash": parent_hash,
        "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
        "miner": "0x0000000000000000000000000000000000000000",
        "stateRoot": B256::repeat_byte(0x22),
        "transactionsRoot": B256::repeat_byte(0x33),
        "receiptsRoot": B256::repeat_byte(0x44),
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "gasLimit": "0x1c9c380",
        "gasUsed": format!("{:#x}", 21_000 * tx_count),
        "timestamp": format!("{:#x}", 1_700_000_000 + number * 12),
        "extraData": "0x",
        "mixHash": B256::ZERO,
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x7",
        "uncles": [],
        "transactions": transactions,
    })
}

/// Receipt JSON for transaction `index` of fixture block `number`.
pub fn receipt_json(number: u64, block_hash: B256, index: u64) -> Value {
    json!({
        "transactionHash": tx_hash(number, index),
        "transactionIndex": format!("{index:#x}"),
        "blockHash": block_hash,
        "blockNumber": format!("{number:#x}"),
        "from": "0x1111111111111111111111111111111111111111",
        "to": "0x2222222222222222222222222222222222222222",
        "type": "0x2",
        "status": "0x1",
        "cumulativeGasUsed": format!("{:#x}", 21_000 * (index + 1)),
        "gasUsed": "0x5208",
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "logs": [],
    })
}

/// A linear fixture chain where every block has `tx_count` transactions.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    pub head: u64,
    pub tx_count: u64,
}

impl ChainFixture {
    pub fn new(head: u64, tx_count: u64) -> Self {
        Self { head, tx_count }
    }

    pub fn block(&self, number: u64) -> Option<Value> {
        (number <= self.head).then(|| {
            let parent = if number == 0 { B256::ZERO } else { block_hash(number - 1) };
            block_json(number, block_hash(number), parent, self.tx_count)
        })
    }

    pub fn receipts(&self, number: u64) -> Option<Value> {
        (number <= self.head).then(|| {
            Value::Array(
                (0..self.tx_count)
                    .map(|idx| receipt_json(number, block_hash(number), idx))
                    .collect(),
            )
        })
    }

    /// Transport serving blocks, receipts, and head queries for this chain.
    pub fn transport(&self) -> MockTransport {
        let blocks = self.clone();
        let receipts = self.clone();
        let latest = self.clone();
        let head = self.head;
        MockTransport::new()
            .on("eth_getBlockByNumber", move |request| {
                let block = match request.params[0].as_str() {
                    Some("latest" | "finalized") => latest.block(latest.head),
                    _ => blocks.block(number_param(request)),
                };
                MockReply::Value(block.unwrap_or(Value::Null))
            })
            .on("eth_getBlockReceipts", move |request| {
                MockReply::Value(receipts.receipts(number_param(request)).unwrap_or(Value::Null))
            })
            .on("eth_blockNumber", move |_| MockReply::Value(json!(format!("{head:#x}"))))
            .on("eth_chainId", |_| MockReply::Value(json!("0x1")))
    }
}

// Hand-computed consensus vectors. Transactions, receipts, and header agree:
// the header's roots and bloom commit to the two transactions below.

fn tx(value: Value) -> Transaction {
    serde_json::from_value(value).expect("transaction")
}

fn receipt(value: Value) -> Receipt {
    serde_json::from_value(value).expect("receipt")
}

pub fn zero_bloom() -> String {
    format!("0x{}", "00".repeat(256))
}

pub const SIG_R: &str = "0xb8d3f0c1b5e4a1f2c3d4e5f60718293a4b5c6d7e8f9001122334455667788990";
pub const SIG_S: &str = "0x1f2e3d4c5b6a79880716253443526170f0e1d2c3b4a59687786950413223140f";
pub const TRANSFER_BLOOM: &str = "0x00000000000000000000000000000000000000000000000000000000000000000000000000001000000000000000000000000000000000000000000000000000000000000000000000000008000000000000000000000000000000000000000000000000000010000000000000000000000000000000000000000010000000002000000000000000000000000000000000000000000000000000000200000000000000000000000000000000000000000000000000000000000000000000000000000002000000000000000000000000000000000000000000000000000000010000000000000000008000000000000000000000000000000000000000000000";

pub fn legacy_tx() -> Transaction {
    tx(json!({
        "hash": "0x33469b22e9f636356c4160a87eb19df52b7412e8eac32a4a55ffe88ea8350788",
        "type": "0x0",
        "nonce": "0x9",
        "from": "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
        "to": "0x3535353535353535353535353535353535353535",
        "value": "0xde0b6b3a7640000",
        "gas": "0x5208",
        "gasPrice": "0x4a817c800",
        "input": "0x",
        "v": "0x25",
        "r": "0x28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276",
        "s": "0x67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83",
    }))
}

pub fn eip1559_tx() -> Transaction {
    tx(json!({
        "hash": "0x825468ab913d9e1c7af77a867cdf6105dc6898ede26122830e15cc232151afb1",
        "type": "0x2",
        "chainId": "0x1",
        "nonce": "0x0",
        "from": "0x1111111111111111111111111111111111111111",
        "to": "0x61815774383099e24810ab832a5b2a5425c154d5",
        "value": "0x2386f26fc10000",
        "gas": "0x5208",
        "maxPriorityFeePerGas": "0x3b9aca00",
        "maxFeePerGas": "0x174876e800",
        "input": "0xa9059cbb",
        "accessList": [{
            "address": "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae",
            "storageKeys": [
                "0x0000000000000000000000000000000000000000000000000000000000000003",
                "0x0000000000000000000000000000000000000000000000000000000000000007",
            ],
        }],
        "v": "0x1",
        "yParity": "0x1",
        "r": SIG_R,
        "s": SIG_S,
    }))
}

pub fn transfer_bloom() -> Bloom {
    TRANSFER_BLOOM.parse().expect("bloom")
}

/// Receipts matching the legacy + EIP-1559 transaction fixtures.
pub fn block_receipts(block_hash: B256) -> Vec<Receipt> {
    vec![
        receipt(json!({
            "transactionHash": "0x33469b22e9f636356c4160a87eb19df52b7412e8eac32a4a55ffe88ea8350788",
            "transactionIndex": "0x0",
            "blockHash": block_hash,
            "blockNumber": "0x10",
            "from": "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
            "to": "0x3535353535353535353535353535353535353535",
            "type": "0x0",
            "status": "0x1",
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "logsBloom": zero_bloom(),
            "logs": [],
        })),
        receipt(json!({
            "transactionHash": "0x825468ab913d9e1c7af77a867cdf6105dc6898ede26122830e15cc232151afb1",
            "transactionIndex": "0x1",
            "blockHash": block_hash,
            "blockNumber": "0x10",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x61815774383099e24810ab832a5b2a5425c154d5",
            "type": "0x2",
            "status": "0x1",
            "cumulativeGasUsed": "0x10639",
            "gasUsed": "0xb411",
            "logsBloom": TRANSFER_BLOOM,
            "logs": [{
                "address": "0x61815774383099e24810ab832a5b2a5425c154d5",
                "topics": [
                    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                    "0x0000000000000000000000000000000000000000000000000000000000001234",
                ],
                "data": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "logIndex": "0x0",
            }],
        })),
    ]
}

/// Shanghai-era header whose roots commit to the legacy + EIP-1559
/// transaction fixtures and their receipts.
pub fn shanghai_block_json() -> Value {
    json!({
        "number": "0x10",
        "hash": "0xb5f3e45462eb8dc4e4666bf1186263c77f032c1e5d690907b2a23db28d90ec02",
        "parentHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
        "miner": "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5",
        "stateRoot": "0x2222222222222222222222222222222222222222222222222222222222222222",
        "transactionsRoot": "0xb08a0c7e9ed45c98ee60e1cc2b10b2e9af75b9662b63653492623f71114d6688",
        "receiptsRoot": "0xed6dc13e09ec3944a7b4f5553197925fda1f0da12f4707780f13debee59c2d78",
        "logsBloom": transfer_bloom(),
        "difficulty": "0x0",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x10639",
        "timestamp": "0x65000000",
        "extraData": "0xd883",
        "mixHash": "0x3333333333333333333333333333333333333333333333333333333333333333",
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x7",
        "withdrawalsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        "withdrawals": [],
        "uncles": [],
        "transactions": [],
    })
}
