//! Module with common error types.

use serde_json::Error as JsonError;
use std::io::Error as IoError;
use thiserror::Error;

/// An error in loading or parsing a contract artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// An IO error occurred when loading an artifact from disk.
    #[error("failed to open contract artifact file: {0}")]
    Io(#[from] IoError),

    /// A JSON error occurred while parsing an artifact.
    #[error("failed to parse contract artifact JSON: {0}")]
    Json(#[from] JsonError),

    /// The requested contract is not part of the artifact repository.
    #[error("contract {0} not found in artifact")]
    ContractNotFound(String),

    /// The contract has no deployment on the requested network.
    #[error("contract {contract} has no deployment on network {network}")]
    NetworkNotFound {
        /// The name of the contract.
        contract: String,
        /// The network ID that was requested.
        network: String,
    },

    /// The contract entry does not carry a deployment address.
    #[error("contract {0} has no deployment address")]
    MissingAddress(String),
}

/// An error raised when arguments or type descriptions do not match the
/// contract interface.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// No function with this name is declared by the contract.
    #[error("function {0} is not declared by the contract")]
    UnknownFunction(String),

    /// The function exists but no overload accepts this many arguments.
    #[error("function {function} expects {expected:?} arguments but {actual} were given")]
    ArityMismatch {
        /// The name of the function.
        function: String,
        /// The argument counts of all declared overloads.
        expected: Vec<usize>,
        /// The number of arguments that were passed.
        actual: usize,
    },

    /// No overload of the function accepts arguments of these types.
    #[error("arguments do not match the input types of {0}")]
    TypeMismatch(String),

    /// A read-only call was requested for a state-changing function.
    #[error("function {0} changes contract state and must be sent as a transaction")]
    NotReadOnly(String),

    /// A transaction was requested for a read-only function.
    #[error("function {0} is read-only and cannot be sent as a transaction")]
    ReadOnly(String),

    /// A type string could not be parsed as a Solidity type.
    #[error("'{0}' is not a valid Solidity type")]
    InvalidType(String),

    /// An argument string could not be converted to its declared type.
    #[error("argument {index} of {function}: cannot parse '{value}' as {kind}")]
    InvalidArgument {
        /// The name of the function.
        function: String,
        /// The position of the argument.
        index: usize,
        /// The declared Solidity type.
        kind: String,
        /// The rejected input.
        value: String,
    },
}

/// An error parsing a hex encoded address.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid 20-byte hex address")]
pub struct ParseAddressError(pub String);
