//! Recomputes header hashes, trie roots, and logs blooms from RPC data.

mod header;
mod receipt;
mod transaction;

pub use header::{block_hash, consensus_header};
pub use receipt::{encode_receipt, receipts_root};
pub use transaction::{encode_transaction, transactions_root};

use crate::chain::Log;
use alloy_primitives::{Bloom, BloomInput, B256};
use alloy_rlp::Encodable;

/// Transaction/receipt kinds, by EIP-2718 type byte.
pub mod tx_type {
    pub const LEGACY: u64 = 0x00;
    pub const EIP2930: u64 = 0x01;
    pub const EIP1559: u64 = 0x02;
    pub const EIP4844: u64 = 0x03;
    pub const EIP7702: u64 = 0x04;
    pub const ARBITRUM_DEPOSIT: u64 = 0x64;
    pub const ARBITRUM_UNSIGNED: u64 = 0x65;
    pub const ARBITRUM_CONTRACT: u64 = 0x66;
    pub const ARBITRUM_RETRY: u64 = 0x68;
    pub const ARBITRUM_SUBMIT_RETRYABLE: u64 = 0x69;
    pub const ARBITRUM_INTERNAL: u64 = 0x6a;
    pub const OPTIMISM_DEPOSIT: u64 = 0x7e;
}

/// Encoding failures. These are fatal: they mean the chain uses an envelope
/// this crate cannot reproduce, not that the node served bad data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("unexpected case: transaction {hash} has unknown type {tx_type:#x}")]
    UnknownTransactionType { tx_type: u64, hash: B256 },
    #[error("unexpected case: receipt of {hash} has unknown type {tx_type:#x}")]
    UnknownReceiptType { tx_type: u64, hash: B256 },
    #[error("{hash} (type {tx_type:#x}) is missing `{field}`")]
    MissingField {
        tx_type: u64,
        field: &'static str,
        hash: B256,
    },
}

/// Bloom over every log's address and topics.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::default();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_slice()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
    bloom
}

/// Root of the index-keyed trie over pre-encoded leaves.
pub(crate) fn ordered_root(leaves: &[Vec<u8>]) -> B256 {
    alloy_trie::root::ordered_trie_root_with_encoder(leaves, |leaf, buf| {
        buf.extend_from_slice(leaf)
    })
}

/// Accumulates RLP items and closes them into a list.
#[derive(Debug, Default)]
pub(crate) struct RlpList {
    payload: Vec<u8>,
}

impl RlpList {
    pub(crate) fn push<T: Encodable + ?Sized>(&mut self, item: &T) -> &mut Self {
        item.encode(&mut self.payload);
        self
    }

    pub(crate) fn push_list(&mut self, list: RlpList) -> &mut Self {
        list.finish(&mut self.payload);
        self
    }

    pub(crate) fn finish(self, out: &mut Vec<u8>) {
        alloy_rlp::Header {
            list: true,
            payload_length: self.payload.len(),
        }
        .encode(out);
        out.extend_from_slice(&self.payload);
    }
}
