//! Module for reading contract deployment repositories written by `solar`.
//!
//! A repository is a JSON file (conventionally `solar.<env>.json`) that maps
//! contract source paths to their deployment:
//!
//! ```text
//! {
//!   "contracts": {
//!     "contracts/MyToken.sol": {
//!       "name": "MyToken",
//!       "abi": [...],
//!       "address": "a7c1c8a6e4dc82ee1abe6a8fd2e1a0b8bc0c4b8b",
//!       "sender": "qUbxboqjBRp96j3La8D1RYkyqx5uQbJPoW"
//!     }
//!   }
//! }
//! ```
//!
//! Addresses are hex without the `0x` prefix. Fields other than `name`, `abi`
//! and `address` are ignored.

use crate::descriptor::ContractDescriptor;
use crate::errors::ArtifactError;
use crate::str::deserialize_lenient_address;
use crate::Abi;
use serde_derive::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use web3::types::Address;

/// A parsed deployment repository.
#[derive(Clone, Debug, Deserialize)]
pub struct SolarRepository {
    /// The deployed contracts keyed by source path.
    #[serde(default)]
    pub contracts: BTreeMap<String, SolarContract>,
}

/// One deployed contract in a repository.
#[derive(Clone, Debug, Deserialize)]
pub struct SolarContract {
    /// The contract name.
    #[serde(default)]
    pub name: String,
    /// The contract ABI.
    pub abi: Abi,
    /// The deployment address.
    #[serde(default, deserialize_with = "deserialize_lenient_address")]
    pub address: Option<Address>,
}

impl SolarRepository {
    /// Parses a repository from JSON text.
    pub fn from_json<S>(json: S) -> Result<Self, ArtifactError>
    where
        S: AsRef<str>,
    {
        Ok(serde_json::from_str(json.as_ref())?)
    }

    /// Parses a repository from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, ArtifactError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads a repository from disk.
    pub fn load<P>(path: P) -> Result<Self, ArtifactError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        SolarRepository::from_reader(BufReader::new(file))
    }

    /// Returns the descriptor for the contract deployed from the given source
    /// path. A bare contract name is accepted when it is unambiguous.
    pub fn descriptor(&self, key: &str) -> Result<ContractDescriptor, ArtifactError> {
        let (path, contract) = match self.contracts.get_key_value(key) {
            Some(entry) => entry,
            None => {
                let mut matches = self
                    .contracts
                    .iter()
                    .filter(|(_, contract)| contract.name == key);
                match (matches.next(), matches.next()) {
                    (Some(entry), None) => entry,
                    _ => return Err(ArtifactError::ContractNotFound(key.to_owned())),
                }
            }
        };

        let address = contract
            .address
            .ok_or_else(|| ArtifactError::MissingAddress(path.clone()))?;
        let name = if contract.name.is_empty() {
            path.clone()
        } else {
            contract.name.clone()
        };

        Ok(ContractDescriptor::new(name, address, contract.abi.clone()))
    }
}
