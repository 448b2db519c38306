//! This module implements extensions to the `ethabi` API.

use crate::errors::SchemaError;
use crate::str::{parse_address, strip_hex_prefix};
use ethabi::param_type::Reader;
use ethabi::{Function, ParamType, StateMutability, Token};
use web3::types::U256;

/// Extension trait for `ethabi::Function`.
pub trait FunctionExt {
    /// Compute the method signature in the standard ABI format, e.g.
    /// `transfer(address,uint256)`.
    fn abi_signature(&self) -> String;

    /// The declared input types, in order.
    fn input_types(&self) -> Vec<ParamType>;

    /// The declared output types, in order.
    fn output_types(&self) -> Vec<ParamType>;

    /// Returns true if the function does not modify contract state. Legacy ABI
    /// entries that only carry `constant: true` count as read-only.
    fn is_read_only(&self) -> bool;
}

impl FunctionExt for Function {
    fn abi_signature(&self) -> String {
        format!(
            "{}({})",
            self.name,
            self.inputs
                .iter()
                .map(|input| input.kind.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    fn input_types(&self) -> Vec<ParamType> {
        self.inputs.iter().map(|param| param.kind.clone()).collect()
    }

    fn output_types(&self) -> Vec<ParamType> {
        self.outputs.iter().map(|param| param.kind.clone()).collect()
    }

    #[allow(deprecated)]
    fn is_read_only(&self) -> bool {
        matches!(
            self.state_mutability,
            StateMutability::View | StateMutability::Pure
        ) || self.constant == Some(true)
    }
}

/// Extension trait for parsing Solidity type strings and values.
pub trait ParamTypeExt: Sized {
    /// Parses a Solidity type string such as `uint256` or `address[]`.
    fn parse_type(value: &str) -> Result<Self, SchemaError>;

    /// Converts a human readable argument into a token of this type.
    ///
    /// Integers are decimal (or `0x` prefixed hex), addresses and byte
    /// strings are hex with an optional `0x` prefix. Arrays and tuples are not
    /// supported from plain strings.
    fn tokenize(&self, value: &str) -> Option<Token>;
}

impl ParamTypeExt for ParamType {
    fn parse_type(value: &str) -> Result<Self, SchemaError> {
        Reader::read(value.trim()).map_err(|_| SchemaError::InvalidType(value.to_owned()))
    }

    fn tokenize(&self, value: &str) -> Option<Token> {
        let value = value.trim();
        match self {
            ParamType::Address => parse_address(value).ok().map(Token::Address),
            ParamType::Uint(bits) => {
                let number = parse_uint(value)?;
                fits(number, *bits).then_some(Token::Uint(number))
            }
            ParamType::Int(bits) => {
                let (negative, digits) = match value.strip_prefix('-') {
                    Some(digits) => (true, digits),
                    None => (false, value),
                };
                let magnitude = parse_uint(digits)?;
                // the magnitude of a signed value has one bit less to work
                // with, except for the minimum value itself
                let limit = U256::one() << bits.checked_sub(1)?;
                if negative {
                    if magnitude > limit {
                        return None;
                    }
                    Some(Token::Int(magnitude.overflowing_neg().0))
                } else {
                    (magnitude < limit).then_some(Token::Int(magnitude))
                }
            }
            ParamType::Bool => match value {
                "true" | "1" => Some(Token::Bool(true)),
                "false" | "0" => Some(Token::Bool(false)),
                _ => None,
            },
            ParamType::String => Some(Token::String(value.to_owned())),
            ParamType::Bytes => hex::decode(strip_hex_prefix(value)).ok().map(Token::Bytes),
            ParamType::FixedBytes(len) => hex::decode(strip_hex_prefix(value))
                .ok()
                .filter(|bytes| bytes.len() == *len)
                .map(Token::FixedBytes),
            ParamType::Array(_) | ParamType::FixedArray(..) | ParamType::Tuple(_) => None,
        }
    }
}

fn parse_uint(value: &str) -> Option<U256> {
    match value.strip_prefix("0x") {
        Some(digits) => U256::from_str_radix(digits, 16).ok(),
        None => U256::from_dec_str(value).ok(),
    }
}

fn fits(value: U256, bits: usize) -> bool {
    bits >= 256 || value.bits() <= bits
}
