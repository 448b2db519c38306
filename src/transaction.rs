//! Implementation of the transaction and receipt types returned by the
//! client, and the confirmation logic that turns one into the other.

pub mod confirm;

pub use self::confirm::ConfirmParams;

use crate::contract::LogEntry;
use crate::errors::ClientError;
use contract_rpc_common::ContractDescriptor;
use std::time::SystemTime;
use web3::types::{TransactionReceipt, TransactionRequest, H256, U256};

/// A transaction that was broadcast to the node but is not known to be mined.
///
/// The hash is the identity of the transaction for its whole lifecycle, every
/// confirmation of a `Transaction` resolves to the receipt with this hash.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    /// The transaction hash returned by the node.
    pub hash: H256,
    /// The signature of the contract function that was called, for example
    /// `transfer(address,uint256)`.
    pub function: String,
    /// When the transaction was broadcast.
    pub submitted_at: SystemTime,
    /// The exact request that was broadcast.
    pub request: TransactionRequest,
}

/// Whether a mined transaction executed successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// The transaction executed successfully. Receipts of nodes that predate
    /// status codes are treated as successful.
    Success,
    /// The transaction reverted.
    Failure,
}

/// The receipt of a mined transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    /// The hash of the transaction.
    pub transaction_hash: H256,
    /// The hash of the block the transaction was mined in.
    pub block_hash: H256,
    /// The number of the block the transaction was mined in.
    pub block_number: u64,
    /// The gas used by the transaction, if reported.
    pub gas_used: Option<U256>,
    /// The execution status.
    pub status: ReceiptStatus,
    /// Events emitted by the contract, in log order.
    pub events: Vec<LogEntry>,
}

impl Receipt {
    /// Converts a mined `web3` receipt, decoding the logs emitted by the
    /// described contract. Logs of other contracts or with unknown topics are
    /// not part of the receipt events.
    pub fn decode(
        descriptor: &ContractDescriptor,
        receipt: TransactionReceipt,
    ) -> Result<Self, ClientError> {
        let block_hash = receipt
            .block_hash
            .ok_or_else(|| ClientError::decode("receipt", "missing block hash"))?;
        let block_number = receipt
            .block_number
            .ok_or_else(|| ClientError::decode("receipt", "missing block number"))?
            .as_u64();
        let status = match receipt.status {
            Some(status) if status.is_zero() => ReceiptStatus::Failure,
            _ => ReceiptStatus::Success,
        };

        let mut events = Vec::new();
        for log in receipt.logs {
            if let Some(entry) = LogEntry::decode(descriptor, log)? {
                events.push(entry);
            }
        }

        Ok(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_hash,
            block_number,
            gas_used: receipt.gas_used,
            status,
            events,
        })
    }

    /// Returns true if the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::prelude::*;
    use contract_rpc_common::StateMutability;
    use web3::types::{Address, H2048};

    fn descriptor() -> ContractDescriptor {
        ContractDescriptor::builder("Token", Address::repeat_byte(0x42))
            .function("mint", &["address", "uint256"], &["bool"], StateMutability::NonPayable)
            .and_then(|builder| builder.event("Mint", &[("address", true), ("uint256", false)]))
            .expect("valid descriptor")
            .build()
    }

    fn raw_receipt(status: &str, logs: Vec<serde_json::Value>) -> TransactionReceipt {
        serde_json::from_value(json!({
            "transactionHash": H256::repeat_byte(0xff),
            "transactionIndex": "0x0",
            "blockNumber": "0x7",
            "blockHash": H256::repeat_byte(0x07),
            "from": Address::repeat_byte(0x01),
            "to": Address::repeat_byte(0x42),
            "cumulativeGasUsed": "0x1337",
            "gasUsed": "0x1337",
            "logsBloom": H2048::zero(),
            "logs": logs,
            "status": status,
        }))
        .expect("valid receipt")
    }

    fn mint_log(address: Address, topic0: H256) -> serde_json::Value {
        json!({
            "address": address,
            "topics": [topic0, H256::from(Address::repeat_byte(0x01))],
            "data": format!("0x{:064x}", 1000),
            "blockHash": H256::repeat_byte(0x07),
            "blockNumber": "0x7",
            "transactionHash": H256::repeat_byte(0xff),
            "transactionIndex": "0x0",
            "logIndex": "0x0",
        })
    }

    #[test]
    fn decodes_successful_receipt_with_contract_events() {
        let descriptor = descriptor();
        let mint = descriptor.abi.event("Mint").expect("declared").signature();
        let receipt = Receipt::decode(
            &descriptor,
            raw_receipt(
                "0x1",
                vec![
                    mint_log(descriptor.address, mint),
                    mint_log(Address::repeat_byte(0x99), mint),
                    mint_log(descriptor.address, H256::repeat_byte(0xee)),
                ],
            ),
        )
        .expect("valid receipt");

        assert!(receipt.is_success());
        assert_eq!(receipt.block_number, 7);
        assert_eq!(receipt.block_hash, H256::repeat_byte(0x07));
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].event, "Mint");
    }

    #[test]
    fn zero_status_is_failure() {
        let receipt = Receipt::decode(&descriptor(), raw_receipt("0x0", vec![])).expect("valid");
        assert_eq!(receipt.status, ReceiptStatus::Failure);
        assert!(!receipt.is_success());
    }
}
