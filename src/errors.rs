//! Module with the client error type.

mod revert;

use crate::transaction::Receipt;
use contract_rpc_common::abi::Error as AbiError;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use web3::error::Error as Web3Error;
use web3::types::H256;

pub use contract_rpc_common::errors::*;
pub use self::revert::decode_reason;

/// Error that can occur while calling, sending or confirming contract
/// transactions or while retrieving contract logs.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The function is unknown to the contract descriptor or the arguments do
    /// not match its declared inputs. This is a caller error and is never
    /// retried.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaError),

    /// A transaction was requested without an explicit sender and the
    /// endpoint does not provide a default account.
    #[error("no sender for {function}: none given and the endpoint has no default account")]
    NoSenderResolved {
        /// The function that was being sent.
        function: String,
    },

    /// The endpoint could not be reached or answered with a JSON-RPC error.
    #[error("RPC {method} failed: {source}")]
    Rpc {
        /// The JSON-RPC method that failed.
        method: &'static str,
        /// The underlying transport or protocol error.
        #[source]
        source: Web3Error,
    },

    /// The endpoint answered but its payload could not be decoded, either as
    /// JSON-RPC data or against the declared contract types.
    #[error("failed to decode {context}: {reason}")]
    Decode {
        /// What was being decoded.
        context: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Arguments passed the type check but could not be ABI encoded.
    #[error("failed to encode arguments for {function}: {source}")]
    Abi {
        /// The function whose arguments were encoded.
        function: String,
        /// The encoding error.
        #[source]
        source: AbiError,
    },

    /// A confirmation did not finish within its bound.
    #[error("timed out confirming transaction {transaction:?} after {limit}")]
    Timeout {
        /// The transaction being confirmed.
        transaction: H256,
        /// The bound that was exceeded.
        limit: TimeoutLimit,
    },

    /// The transaction was included in a block but reverted.
    #[error("transaction {:?} reverted in block {}", .0.transaction_hash, .0.block_number)]
    TransactionFailed(Box<Receipt>),

    /// The node no longer knows about a transaction that was never mined.
    #[error("transaction {0:?} was dropped before being mined")]
    Dropped(H256),

    /// Waiting for the transaction was cancelled by the caller. The
    /// transaction itself is unaffected.
    #[error("confirmation of transaction {0:?} was cancelled")]
    Cancelled(H256),
}

/// The bound that was exceeded by a timed out confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutLimit {
    /// The transaction could not be confirmed within this many blocks.
    Blocks(usize),
    /// The confirmation did not finish within this wall-clock duration.
    Elapsed(Duration),
}

impl Display for TimeoutLimit {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TimeoutLimit::Blocks(blocks) => write!(f, "{} blocks", blocks),
            TimeoutLimit::Elapsed(duration) => write!(f, "{:?}", duration),
        }
    }
}

impl ClientError {
    /// Creates an error for a failed JSON-RPC round trip. Errors that happen
    /// while decoding a response that did arrive are reported as `Decode`.
    pub fn rpc(method: &'static str, err: Web3Error) -> Self {
        match err {
            Web3Error::Decoder(reason) | Web3Error::InvalidResponse(reason) => ClientError::Decode {
                context: format!("{} response", method),
                reason,
            },
            source => ClientError::Rpc { method, source },
        }
    }

    /// Creates a decoding error.
    pub fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        ClientError::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error is a transient transport failure that may
    /// succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Rpc { source, .. } => is_transient(source),
            _ => false,
        }
    }

    /// Returns the transaction hash the error refers to, if any.
    pub fn transaction_hash(&self) -> Option<H256> {
        match self {
            ClientError::Timeout { transaction, .. } => Some(*transaction),
            ClientError::TransactionFailed(receipt) => Some(receipt.transaction_hash),
            ClientError::Dropped(hash) | ClientError::Cancelled(hash) => Some(*hash),
            _ => None,
        }
    }

    /// Returns the revert reason reported by the node for a call or broadcast
    /// that was rejected because contract execution reverted.
    pub fn revert_reason(&self) -> Option<String> {
        match self {
            ClientError::Rpc {
                source: Web3Error::Rpc(err),
                ..
            } => revert::reason_from_rpc_error(err),
            _ => None,
        }
    }
}

/// Returns true if a `web3` error is a transport level failure, i.e. the
/// request may not have reached the node or the response was lost.
pub fn is_transient(err: &Web3Error) -> bool {
    matches!(
        err,
        Web3Error::Unreachable | Web3Error::Transport(_) | Web3Error::Io(_)
    )
}
