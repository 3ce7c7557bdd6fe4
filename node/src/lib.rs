//! Verified block ingestion from EVM JSON-RPC endpoints.
//!
//! [`sync::ingest`] walks a block range in fixed windows and yields ordered,
//! parent-linked batches of blocks with the receipts, traces, and state diffs a
//! [`sync::DataRequest`] asks for. Header hashes and trie roots can be
//! recomputed locally ([`verify`]) so a misbehaving node is caught instead of
//! trusted.

pub mod chain;
pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rpc;
pub mod sync;
pub mod verify;

#[cfg(test)]
mod test_utils;
