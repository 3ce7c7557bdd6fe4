//! Consensus encoding of transactions and the transactions root.

use super::{ordered_root, tx_type, EncodeError, RlpList};
use crate::chain::Transaction;
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{BufMut, Encodable};

/// Appends the EIP-2718 encoding of `tx` (type byte + RLP payload) to `out`.
pub fn encode_transaction(tx: &Transaction, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let fields = Fields(tx);
    let mut list = RlpList::default();
    let empty_access_list = AccessList::default();
    let access_list = tx.access_list.as_ref().unwrap_or(&empty_access_list);

    match tx.tx_type {
        tx_type::LEGACY => {
            list.push(&tx.nonce)
                .push(&fields.require(tx.gas_price, "gasPrice")?)
                .push(&tx.gas)
                .push(&To(tx.to))
                .push(&tx.value)
                .push(&tx.input)
                .push(&fields.require(tx.v, "v")?)
                .push(&fields.require(tx.r, "r")?)
                .push(&fields.require(tx.s, "s")?);
        }
        tx_type::EIP2930 => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&tx.nonce)
                .push(&fields.require(tx.gas_price, "gasPrice")?)
                .push(&tx.gas)
                .push(&To(tx.to))
                .push(&tx.value)
                .push(&tx.input)
                .push(access_list);
            fields.signature(&mut list)?;
        }
        tx_type::EIP1559 => {
            fields.dynamic_fee_prefix(&mut list)?;
            list.push(access_list);
            fields.signature(&mut list)?;
        }
        tx_type::EIP4844 => {
            fields.dynamic_fee_prefix(&mut list)?;
            list.push(access_list)
                .push(&fields.require(tx.max_fee_per_blob_gas, "maxFeePerBlobGas")?)
                .push(fields.require_ref(&tx.blob_versioned_hashes, "blobVersionedHashes")?);
            fields.signature(&mut list)?;
        }
        tx_type::EIP7702 => {
            fields.dynamic_fee_prefix(&mut list)?;
            list.push(access_list)
                .push(fields.require_ref(&tx.authorization_list, "authorizationList")?);
            fields.signature(&mut list)?;
        }
        tx_type::OPTIMISM_DEPOSIT => {
            list.push(&fields.require(tx.source_hash, "sourceHash")?)
                .push(&tx.from)
                .push(&To(tx.to))
                .push(&tx.mint.unwrap_or_default())
                .push(&tx.value)
                .push(&tx.gas)
                .push(&tx.is_system_tx.unwrap_or(false))
                .push(&tx.input);
        }
        tx_type::ARBITRUM_DEPOSIT => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&fields.require(tx.request_id, "requestId")?)
                .push(&tx.from)
                .push(&To(tx.to))
                .push(&tx.value);
        }
        tx_type::ARBITRUM_UNSIGNED => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&tx.from)
                .push(&tx.nonce)
                .push(&fields.gas_fee_cap()?)
                .push(&tx.gas)
                .push(&To(tx.to))
                .push(&tx.value)
                .push(&tx.input);
        }
        tx_type::ARBITRUM_CONTRACT => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&fields.require(tx.request_id, "requestId")?)
                .push(&tx.from)
                .push(&fields.gas_fee_cap()?)
                .push(&tx.gas)
                .push(&To(tx.to))
                .push(&tx.value)
                .push(&tx.input);
        }
        tx_type::ARBITRUM_RETRY => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&tx.nonce)
                .push(&tx.from)
                .push(&fields.gas_fee_cap()?)
                .push(&tx.gas)
                .push(&To(tx.to))
                .push(&tx.value)
                .push(&tx.input)
                .push(&fields.require(tx.ticket_id, "ticketId")?)
                .push(&fields.require(tx.refund_to, "refundTo")?)
                .push(&fields.require(tx.max_refund, "maxRefund")?)
                .push(&fields.require(tx.submission_fee_refund, "submissionFeeRefund")?);
        }
        tx_type::ARBITRUM_SUBMIT_RETRYABLE => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&fields.require(tx.request_id, "requestId")?)
                .push(&tx.from)
                .push(&fields.require(tx.l1_base_fee, "l1BaseFee")?)
                .push(&fields.require(tx.deposit_value, "depositValue")?)
                .push(&fields.gas_fee_cap()?)
                .push(&tx.gas)
                .push(&To(tx.retry_to))
                .push(&fields.require(tx.retry_value, "retryValue")?)
                .push(&fields.require(tx.beneficiary, "beneficiary")?)
                .push(&fields.require(tx.max_submission_fee, "maxSubmissionFee")?)
                .push(&fields.require(tx.refund_to, "refundTo")?)
                .push(fields.require_ref(&tx.retry_data, "retryData")?);
        }
        tx_type::ARBITRUM_INTERNAL => {
            list.push(&fields.require(tx.chain_id, "chainId")?)
                .push(&tx.input);
        }
        other => {
            return Err(EncodeError::UnknownTransactionType {
                tx_type: other,
                hash: tx.hash,
            })
        }
    }

    if tx.tx_type != tx_type::LEGACY {
        // Every typed envelope here fits in one byte.
        out.push(tx.tx_type as u8);
    }
    list.finish(out);
    Ok(())
}

/// Transactions root over `txs` in block order.
pub fn transactions_root<'a>(
    txs: impl IntoIterator<Item = &'a Transaction>,
) -> Result<B256, EncodeError> {
    let leaves = txs
        .into_iter()
        .map(|tx| {
            let mut buf = Vec::new();
            encode_transaction(tx, &mut buf)?;
            Ok(buf)
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;
    Ok(ordered_root(&leaves))
}

/// Recipient field: an address, or the empty string for contract creation.
struct To(Option<Address>);

impl Encodable for To {
    fn encode(&self, out: &mut dyn BufMut) {
        match self.0 {
            Some(address) => address.encode(out),
            None => Bytes::new().encode(out),
        }
    }

    fn length(&self) -> usize {
        match self.0 {
            Some(address) => address.length(),
            None => 1,
        }
    }
}

struct Fields<'a>(&'a Transaction);

impl Fields<'_> {
    fn missing(&self, field: &'static str) -> EncodeError {
        EncodeError::MissingField {
            tx_type: self.0.tx_type,
            field,
            hash: self.0.hash,
        }
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, EncodeError> {
        value.ok_or_else(|| self.missing(field))
    }

    fn require_ref<'b, T>(
        &self,
        value: &'b Option<T>,
        field: &'static str,
    ) -> Result<&'b T, EncodeError> {
        value.as_ref().ok_or_else(|| self.missing(field))
    }

    /// Arbitrum reports the fee cap as `maxFeePerGas`, older nodes as `gasPrice`.
    fn gas_fee_cap(&self) -> Result<U256, EncodeError> {
        self.0
            .max_fee_per_gas
            .or(self.0.gas_price)
            .ok_or_else(|| self.missing("maxFeePerGas"))
    }

    fn y_parity(&self) -> Result<u64, EncodeError> {
        self.0
            .y_parity
            .or_else(|| self.0.v.and_then(|v| u64::try_from(v).ok()))
            .ok_or_else(|| self.missing("yParity"))
    }

    /// `chainId, nonce, maxPriorityFeePerGas, maxFeePerGas, gas, to, value, input`
    fn dynamic_fee_prefix(&self, list: &mut RlpList) -> Result<(), EncodeError> {
        let tx = self.0;
        list.push(&self.require(tx.chain_id, "chainId")?)
            .push(&tx.nonce)
            .push(&self.require(tx.max_priority_fee_per_gas, "maxPriorityFeePerGas")?)
            .push(&self.require(tx.max_fee_per_gas, "maxFeePerGas")?)
            .push(&tx.gas)
            .push(&To(tx.to))
            .push(&tx.value)
            .push(&tx.input);
        Ok(())
    }

    fn signature(&self, list: &mut RlpList) -> Result<(), EncodeError> {
        list.push(&self.y_parity()?)
            .push(&self.require(self.0.r, "r")?)
            .push(&self.require(self.0.s, "s")?);
        Ok(())
    }
}
