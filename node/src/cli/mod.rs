//! CLI and config handling.

use crate::{
    rpc::HttpTransportConfig,
    sync::{DataRequest, ReceiptsApi},
};
use alloy_primitives::B256;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_STRIDE_SIZE: u64 = 10;
pub const DEFAULT_STRIDE_CONCURRENCY: usize = 2;
pub const DEFAULT_RPC_CONCURRENCY: usize = 8;
pub const DEFAULT_RPC_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_RPC_RETRY_BACKOFF_MS: u64 = 250;
pub const DEFAULT_RPC_MAX_RESPONSE_SIZE: u32 = u32::MAX;
pub const DEFAULT_RESUME_ATTEMPTS: u32 = 3;
pub const DEFAULT_RESUME_DELAY_MS: u64 = 2_000;

/// EVM JSON-RPC block ingestion configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "evm-rpc-ingest", about = "Verified block ingestion over EVM JSON-RPC")]
pub struct IngestConfig {
    /// JSON-RPC endpoint (HTTP).
    #[arg(long)]
    pub rpc_url: String,
    /// Chain id; queried with `eth_chainId` when omitted.
    #[arg(long)]
    pub chain_id: Option<u64>,
    /// First block to ingest.
    #[arg(long, default_value_t = 0)]
    pub from_block: u64,
    /// Last block to ingest (inclusive). Omit to follow until the node runs out.
    #[arg(long)]
    pub to_block: Option<u64>,
    /// Blocks per window.
    #[arg(long, default_value_t = DEFAULT_STRIDE_SIZE)]
    pub stride_size: u64,
    /// Windows in flight.
    #[arg(long, default_value_t = DEFAULT_STRIDE_CONCURRENCY)]
    pub stride_concurrency: usize,
    /// Concurrent requests the endpoint tolerates.
    #[arg(long, default_value_t = DEFAULT_RPC_CONCURRENCY)]
    pub rpc_concurrency: usize,
    /// Retries for single requests failing at the connection level.
    #[arg(long, default_value_t = DEFAULT_RPC_RETRY_ATTEMPTS)]
    pub rpc_retry_attempts: u32,
    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RPC_TIMEOUT_MS)]
    pub rpc_timeout_ms: u64,
    /// Largest RPC response body accepted, in bytes.
    #[arg(long, default_value_t = DEFAULT_RPC_MAX_RESPONSE_SIZE)]
    pub rpc_max_response_size: u32,
    /// Treat `latest - N` as finalized instead of asking for the `finalized` tag.
    #[arg(long)]
    pub finality_confirmation: Option<u64>,
    /// Parent hash the first ingested block must carry.
    #[arg(long)]
    pub expected_parent_hash: Option<B256>,
    /// Passes without progress before a closed range that ended early fails.
    #[arg(long, default_value_t = DEFAULT_RESUME_ATTEMPTS)]
    pub resume_attempts: u32,
    /// Wait before resuming a closed range, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RESUME_DELAY_MS)]
    pub resume_delay_ms: u64,

    /// Include full transaction objects.
    #[arg(long)]
    pub transactions: bool,
    /// Include receipts.
    #[arg(long)]
    pub receipts: bool,
    /// Include call traces.
    #[arg(long)]
    pub traces: bool,
    /// Include state diffs.
    #[arg(long)]
    pub state_diffs: bool,
    /// Use the parity `trace_*` namespace for traces.
    #[arg(long)]
    pub use_trace_api: bool,
    /// Use `prestateTracer` instead of `trace_replayBlockTransactions` for state diffs.
    #[arg(long)]
    pub use_debug_api_for_state_diffs: bool,
    /// Tracer timeout passed to `debug_traceBlockByHash`, e.g. `30s`.
    #[arg(long)]
    pub debug_trace_timeout: Option<String>,
    /// How receipts are fetched.
    #[arg(long, value_enum, default_value_t = ReceiptsApi::Block)]
    pub receipts_api: ReceiptsApi,

    /// Recompute and check each block hash.
    #[arg(long)]
    pub verify_block_hash: bool,
    /// Recompute and check each transactions root.
    #[arg(long)]
    pub verify_tx_root: bool,
    /// Recompute and check each receipts root.
    #[arg(long)]
    pub verify_receipts_root: bool,
    /// Recompute and check each logs bloom.
    #[arg(long)]
    pub verify_logs_bloom: bool,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
    /// Also write JSON-lines logs to this file.
    #[arg(long)]
    pub log_json: Option<PathBuf>,
}

impl IngestConfig {
    /// Parse configuration from CLI args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn data_request(&self) -> DataRequest {
        DataRequest {
            transactions: self.transactions,
            receipts: self.receipts,
            traces: self.traces,
            state_diffs: self.state_diffs,
            use_trace_api: self.use_trace_api,
            use_debug_api_for_state_diffs: self.use_debug_api_for_state_diffs,
            debug_trace_timeout: self.debug_trace_timeout.clone(),
            receipts_api: self.receipts_api,
            verify_block_hash: self.verify_block_hash,
            verify_tx_root: self.verify_tx_root,
            verify_receipts_root: self.verify_receipts_root,
            verify_logs_bloom: self.verify_logs_bloom,
        }
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            url: self.rpc_url.clone(),
            concurrency: self.rpc_concurrency.max(1),
            retry_attempts: self.rpc_retry_attempts,
            request_timeout: Duration::from_millis(self.rpc_timeout_ms),
            retry_backoff: Duration::from_millis(DEFAULT_RPC_RETRY_BACKOFF_MS),
            max_response_size: self.rpc_max_response_size,
        }
    }
}
