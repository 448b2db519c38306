//! Implementation of hex string utilities for addresses.
//!
//! Qtum style tooling writes addresses as bare 40 character hex strings while
//! Ethereum tooling prefixes them with `0x`; both forms are accepted here.

use crate::errors::ParseAddressError;
use serde::{Deserialize, Deserializer};
use web3::types::Address;

/// Strips an optional `0x` or `0X` prefix from a hex string.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parses a 20-byte address from a hex string with or without `0x` prefix.
pub fn parse_address(value: &str) -> Result<Address, ParseAddressError> {
    let digits = strip_hex_prefix(value.trim());
    if digits.len() != 40 {
        return Err(ParseAddressError(value.to_owned()));
    }
    let bytes = hex::decode(digits).map_err(|_| ParseAddressError(value.to_owned()))?;
    Ok(Address::from_slice(&bytes))
}

/// Extension trait for converting an `Address` into a hex string implementation.
pub trait AddressHexExt {
    /// Convert an address into a 40 character representation.
    fn to_fixed_hex(&self) -> String;
}

impl AddressHexExt for Address {
    fn to_fixed_hex(&self) -> String {
        format!("{:040x}", self)
    }
}

/// Serde helper for address fields that may or may not carry a `0x` prefix.
pub(crate) fn deserialize_lenient_address<'de, D>(
    deserializer: D,
) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_address(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
