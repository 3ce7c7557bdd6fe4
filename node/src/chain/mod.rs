//! Chain data model as served over JSON-RPC.

mod block;
mod policy;
mod trace;

pub use block::{BlockTransactions, Log, RawBlock, Receipt, Transaction};
pub use policy::{ChainPolicy, POLYGON_POS_CHAIN_ID};
pub use trace::{
    AccountDiff, DebugAccountState, DebugFrame, DebugLog, DebugStateDiff, DebugTxResult,
    ReplayRecord, StateDiff, TraceFrame, TraceReplay, TxCallTrace, TxStateDiff,
};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Number and hash identifying one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    pub hash: B256,
}

impl BlockRef {
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ref_serializes_number_as_quantity() {
        let block = BlockRef::new(16, B256::repeat_byte(0x11));
        let value = serde_json::to_value(block).expect("encode");
        assert_eq!(value["number"], "0x10");
        let decoded: BlockRef = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded, block);
    }
}
