//! Module implements decoding of revert reasons reported by nodes, either as
//! ABI encoded `Error(string)` payloads or geth style error messages.

use contract_rpc_common::abi::{self, ParamType, Token};
use jsonrpc_core::Error as JsonrpcError;
use lazy_static::lazy_static;
use serde_json::Value;

const REVERTED: &str = "execution reverted";

lazy_static! {
    /// The ABI function selector for identifying encoded revert reasons.
    static ref ERROR_SELECTOR: [u8; 4] = abi::short_signature("Error", &[ParamType::String]);
}

/// Decodes an ABI encoded revert reason. Returns `Some(reason)` when the ABI
/// encoded bytes represent a revert reason and `None` otherwise.
///
/// These reasons are prefixed by a 4-byte error followed by an ABI encoded
/// string.
pub fn decode_reason(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 4 || (bytes.len() - 4) % 32 != 0 || bytes[0..4] != ERROR_SELECTOR[..] {
        return None;
    }

    match abi::decode(&[ParamType::String], &bytes[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

/// Extracts a revert reason from a JSON-RPC error, preferring the encoded
/// reason in the error data over the message text.
pub(crate) fn reason_from_rpc_error(err: &JsonrpcError) -> Option<String> {
    let encoded = match &err.data {
        Some(Value::String(data)) => data
            .strip_prefix("0x")
            .and_then(|digits| hex::decode(digits).ok()),
        _ => None,
    };
    if let Some(reason) = encoded.as_deref().and_then(decode_reason) {
        return Some(reason);
    }

    err.message
        .strip_prefix(REVERTED)?
        .strip_prefix(": ")
        .map(ToString::to_string)
}
