//! Decoded contract events.

use crate::errors::ClientError;
use contract_rpc_common::abi::{LogParam, RawLog};
use contract_rpc_common::ContractDescriptor;
use web3::types::{Address, Log, H256};

/// A decoded event emitted by the contract.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// The event name.
    pub event: String,
    /// The decoded event arguments in declaration order.
    pub params: Vec<LogParam>,
    /// The address of the contract that emitted the event.
    pub address: Address,
    /// The transaction that emitted the event.
    pub transaction_hash: H256,
    /// The hash of the block containing the transaction.
    pub block_hash: H256,
    /// The number of the block containing the transaction.
    pub block_number: u64,
    /// The index of the log within its block.
    pub log_index: u64,
}

impl LogEntry {
    /// Decodes a log emitted by the described contract.
    ///
    /// Returns `None` for logs that are not events of the contract: logs of
    /// another address, logs removed by a re-org, anonymous logs and logs
    /// whose first topic does not match a declared event.
    pub fn decode(descriptor: &ContractDescriptor, log: Log) -> Result<Option<Self>, ClientError> {
        if log.address != descriptor.address || log.removed == Some(true) {
            return Ok(None);
        }
        let event = match log
            .topics
            .first()
            .and_then(|topic| descriptor.event_by_topic(topic))
        {
            Some(event) => event,
            None => return Ok(None),
        };

        let transaction_hash = log
            .transaction_hash
            .ok_or_else(|| ClientError::decode(&event.name, "log without transaction hash"))?;
        let block_hash = log
            .block_hash
            .ok_or_else(|| ClientError::decode(&event.name, "log without block hash"))?;
        let block_number = log
            .block_number
            .ok_or_else(|| ClientError::decode(&event.name, "log without block number"))?
            .as_u64();
        let log_index = log
            .log_index
            .ok_or_else(|| ClientError::decode(&event.name, "log without log index"))?
            .as_u64();

        let decoded = event
            .parse_log(RawLog {
                topics: log.topics,
                data: log.data.0,
            })
            .map_err(|err| ClientError::decode(format!("{} event", event.name), err))?;

        Ok(Some(LogEntry {
            event: event.name.clone(),
            params: decoded.params,
            address: log.address,
            transaction_hash,
            block_hash,
            block_number,
            log_index,
        }))
    }

    /// The position of the log on chain, used for ordering.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::prelude::*;
    use contract_rpc_common::abi::Token;
    use web3::types::U256;

    fn descriptor() -> ContractDescriptor {
        ContractDescriptor::builder("Token", addr!("0x4242424242424242424242424242424242424242"))
            .event("Transfer", &[("address", true), ("address", true), ("uint256", false)])
            .expect("valid event")
            .build()
    }

    fn transfer_log(descriptor: &ContractDescriptor) -> Log {
        let topic = descriptor.abi.event("Transfer").expect("declared").signature();
        serde_json::from_value(json!({
            "address": descriptor.address,
            "topics": [
                topic,
                H256::from(Address::repeat_byte(0x01)),
                H256::from(Address::repeat_byte(0x02)),
            ],
            "data": format!("0x{:064x}", 50),
            "blockHash": H256::repeat_byte(0x0b),
            "blockNumber": "0x10",
            "transactionHash": hash!("0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            "transactionIndex": "0x0",
            "logIndex": "0x3",
        }))
        .expect("valid log")
    }

    #[test]
    fn decodes_declared_event() {
        let descriptor = descriptor();
        let entry = LogEntry::decode(&descriptor, transfer_log(&descriptor))
            .expect("decodes")
            .expect("is a contract event");

        assert_eq!(entry.event, "Transfer");
        assert_eq!(entry.position(), (16, 3));
        assert_eq!(
            entry
                .params
                .iter()
                .map(|param| param.value.clone())
                .collect::<Vec<_>>(),
            vec![
                Token::Address(Address::repeat_byte(0x01)),
                Token::Address(Address::repeat_byte(0x02)),
                Token::Uint(U256::from(50)),
            ]
        );
    }

    #[test]
    fn skips_foreign_and_removed_logs() {
        let descriptor = descriptor();

        let mut foreign = transfer_log(&descriptor);
        foreign.address = Address::repeat_byte(0x99);
        assert_eq!(LogEntry::decode(&descriptor, foreign).expect("decodes"), None);

        let mut removed = transfer_log(&descriptor);
        removed.removed = Some(true);
        assert_eq!(LogEntry::decode(&descriptor, removed).expect("decodes"), None);

        let mut unknown = transfer_log(&descriptor);
        unknown.topics[0] = H256::repeat_byte(0xee);
        assert_eq!(LogEntry::decode(&descriptor, unknown).expect("decodes"), None);
    }

    #[test]
    fn malformed_data_is_decode_failure() {
        let descriptor = descriptor();
        let mut log = transfer_log(&descriptor);
        log.data.0.truncate(4);

        assert!(matches!(
            LogEntry::decode(&descriptor, log),
            Err(ClientError::Decode { .. })
        ));
    }
}
