//! Header hash recomputation.

use crate::chain::RawBlock;
use alloy_consensus::Header;
use alloy_primitives::{keccak256, B256};

/// Consensus header built from the RPC block fields.
pub fn consensus_header(block: &RawBlock) -> Header {
    Header {
        parent_hash: block.parent_hash,
        ommers_hash: block.sha3_uncles,
        beneficiary: block.miner,
        state_root: block.state_root,
        transactions_root: block.transactions_root,
        receipts_root: block.receipts_root,
        logs_bloom: block.logs_bloom,
        difficulty: block.difficulty,
        number: block.number,
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        timestamp: block.timestamp,
        extra_data: block.extra_data.clone(),
        mix_hash: block.mix_hash,
        nonce: block.nonce,
        base_fee_per_gas: block.base_fee_per_gas,
        withdrawals_root: block.withdrawals_root,
        blob_gas_used: block.blob_gas_used,
        excess_blob_gas: block.excess_blob_gas,
        parent_beacon_block_root: block.parent_beacon_block_root,
        requests_hash: block.requests_hash,
    }
}

/// Keccak of the RLP-encoded header.
pub fn block_hash(block: &RawBlock) -> B256 {
    keccak256(alloy_rlp::encode(consensus_header(block)))
}
