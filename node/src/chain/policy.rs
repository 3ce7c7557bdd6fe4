//! Per-chain adjustments to root and bloom verification.

use super::{RawBlock, Receipt, Transaction};
use crate::verify::{self, EncodeError};
use alloy_primitives::{Address, Bloom, B256};

pub const POLYGON_POS_CHAIN_ID: u64 = 137;

/// Which served items count towards the header's commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainPolicy {
    #[default]
    Standard,
    /// Bor state-sync transactions (zero sender, zero recipient) are served in
    /// the block body but are not part of the header's roots or bloom.
    ExcludeStateSync,
}

impl ChainPolicy {
    pub const fn for_chain(chain_id: u64) -> Self {
        match chain_id {
            POLYGON_POS_CHAIN_ID => Self::ExcludeStateSync,
            _ => Self::Standard,
        }
    }

    fn excludes(&self, from: Address, to: Option<Address>) -> bool {
        matches!(self, Self::ExcludeStateSync) && from.is_zero() && to == Some(Address::ZERO)
    }

    pub fn includes_transaction(&self, tx: &Transaction) -> bool {
        !self.excludes(tx.from, tx.to)
    }

    pub fn includes_receipt(&self, receipt: &Receipt) -> bool {
        !self.excludes(receipt.from, receipt.to)
    }

    pub fn block_hash(&self, block: &RawBlock) -> B256 {
        verify::block_hash(block)
    }

    pub fn transactions_root(&self, txs: &[Transaction]) -> Result<B256, EncodeError> {
        verify::transactions_root(txs.iter().filter(|tx| self.includes_transaction(tx)))
    }

    pub fn receipts_root(&self, receipts: &[Receipt]) -> Result<B256, EncodeError> {
        verify::receipts_root(receipts.iter().filter(|r| self.includes_receipt(r)))
    }

    pub fn logs_bloom(&self, receipts: &[Receipt]) -> Bloom {
        verify::logs_bloom(
            receipts
                .iter()
                .filter(|r| self.includes_receipt(r))
                .flat_map(|r| &r.logs),
        )
    }
}
