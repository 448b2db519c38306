//! JSON rendering of decoded contract values for console output.

use contract_rpc::common::abi::Token;
use contract_rpc::prelude::*;
use serde_json::{json, Map, Value};

/// Renders a token as JSON. Integers are decimal strings so that 256-bit
/// values survive JSON consumers that only know doubles.
pub fn token(token: &Token) -> Value {
    match token {
        Token::Address(address) => json!(address),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(signed(*value)),
        Token::Bool(value) => Value::Bool(*value),
        Token::String(value) => Value::String(value.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Array(tokens) | Token::FixedArray(tokens) | Token::Tuple(tokens) => {
            Value::Array(tokens.iter().map(self::token).collect())
        }
    }
}

/// Formats a two's complement 256-bit integer as a signed decimal.
fn signed(value: U256) -> String {
    if value.bit(255) {
        format!("-{}", (!value).overflowing_add(U256::one()).0)
    } else {
        value.to_string()
    }
}

/// Renders a decoded event.
pub fn log_entry(entry: &LogEntry) -> Value {
    let args = entry
        .params
        .iter()
        .map(|param| (param.name.clone(), token(&param.value)))
        .collect::<Map<_, _>>();

    json!({
        "event": entry.event,
        "args": args,
        "address": entry.address,
        "transactionHash": entry.transaction_hash,
        "blockHash": entry.block_hash,
        "blockNumber": entry.block_number,
        "logIndex": entry.log_index,
    })
}

/// Renders a broadcast transaction.
pub fn transaction(tx: &Transaction) -> Value {
    json!({
        "hash": tx.hash,
        "function": tx.function,
        "request": tx.request,
    })
}

/// Renders a transaction receipt.
pub fn receipt(receipt: &Receipt) -> Value {
    json!({
        "transactionHash": receipt.transaction_hash,
        "blockHash": receipt.block_hash,
        "blockNumber": receipt.block_number,
        "gasUsed": receipt.gas_used.map(|gas| gas.to_string()),
        "status": receipt.is_success(),
        "events": receipt.events.iter().map(log_entry).collect::<Vec<_>>(),
    })
}
