//! Consensus encoding of receipts and the receipts root.

use super::{ordered_root, tx_type, EncodeError, RlpList};
use crate::chain::{Log, Receipt};
use alloy_primitives::B256;

fn encode_log(log: &Log) -> RlpList {
    let mut list = RlpList::default();
    list.push(&log.address).push(&log.topics).push(&log.data);
    list
}

/// Appends the receipt-trie leaf for `receipt` to `out`.
pub fn encode_receipt(receipt: &Receipt, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let mut list = RlpList::default();
    match (receipt.status, receipt.root) {
        (Some(status), _) => list.push(&status),
        (None, Some(root)) => list.push(&root),
        (None, None) => {
            return Err(EncodeError::MissingField {
                tx_type: receipt.tx_type,
                field: "status",
                hash: receipt.transaction_hash,
            })
        }
    };
    let mut logs = RlpList::default();
    for log in &receipt.logs {
        logs.push_list(encode_log(log));
    }
    list.push(&receipt.cumulative_gas_used)
        .push(&receipt.logs_bloom)
        .push_list(logs);

    // Regolith receipts report a nonce without a version; their committed
    // leaf leaves the nonce out. From Canyon on both are encoded.
    if receipt.tx_type == tx_type::OPTIMISM_DEPOSIT {
        if let Some(version) = receipt.deposit_receipt_version {
            list.push(&receipt.deposit_nonce.unwrap_or_default())
                .push(&version);
        }
    }

    match receipt.tx_type {
        tx_type::LEGACY => {}
        tx_type::EIP2930
        | tx_type::EIP1559
        | tx_type::EIP4844
        | tx_type::EIP7702
        | tx_type::ARBITRUM_DEPOSIT
        | tx_type::ARBITRUM_UNSIGNED
        | tx_type::ARBITRUM_CONTRACT
        | tx_type::ARBITRUM_RETRY
        | tx_type::ARBITRUM_SUBMIT_RETRYABLE
        | tx_type::ARBITRUM_INTERNAL
        | tx_type::OPTIMISM_DEPOSIT => out.push(receipt.tx_type as u8),
        other => {
            return Err(EncodeError::UnknownReceiptType {
                tx_type: other,
                hash: receipt.transaction_hash,
            })
        }
    }
    list.finish(out);
    Ok(())
}

/// Receipts root over `receipts` in block order.
pub fn receipts_root<'a>(
    receipts: impl IntoIterator<Item = &'a Receipt>,
) -> Result<B256, EncodeError> {
    let leaves = receipts
        .into_iter()
        .map(|receipt| {
            let mut buf = Vec::new();
            encode_receipt(receipt, &mut buf)?;
            Ok(buf)
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;
    Ok(ordered_root(&leaves))
}
