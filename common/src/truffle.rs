//! Module for reading and examining data produced by truffle.

use crate::descriptor::ContractDescriptor;
use crate::errors::ArtifactError;
use crate::str::deserialize_lenient_address;
use crate::Abi;
use serde_derive::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use web3::types::Address;

/// Represents a truffle artifact.
#[derive(Clone, Debug, Deserialize)]
pub struct TruffleArtifact {
    /// The contract name
    #[serde(rename = "contractName", default)]
    pub contract_name: String,
    /// The contract ABI
    pub abi: Abi,
    /// The configured networks by network ID for the contract.
    #[serde(default)]
    pub networks: HashMap<String, Network>,
}

impl TruffleArtifact {
    /// Parse a truffle artifact from JSON.
    pub fn from_json<S>(json: S) -> Result<TruffleArtifact, ArtifactError>
    where
        S: AsRef<str>,
    {
        let artifact = serde_json::from_str(json.as_ref())?;
        Ok(artifact)
    }

    /// Loads a truffle artifact from disk.
    pub fn load<P>(path: P) -> Result<TruffleArtifact, ArtifactError>
    where
        P: AsRef<Path>,
    {
        let json = BufReader::new(File::open(path)?);
        let artifact = serde_json::from_reader(json)?;
        Ok(artifact)
    }

    /// Returns the descriptor for the deployment on the given network ID.
    pub fn descriptor(&self, network_id: &str) -> Result<ContractDescriptor, ArtifactError> {
        let network = self
            .networks
            .get(network_id)
            .ok_or_else(|| ArtifactError::NetworkNotFound {
                contract: self.contract_name.clone(),
                network: network_id.to_owned(),
            })?;
        let address = network
            .address
            .ok_or_else(|| ArtifactError::MissingAddress(self.contract_name.clone()))?;

        Ok(ContractDescriptor::new(
            self.contract_name.clone(),
            address,
            self.abi.clone(),
        ))
    }
}

/// A contract's network configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Network {
    /// The address at which the contract is deployed on this network.
    #[serde(default, deserialize_with = "deserialize_lenient_address")]
    pub address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_for_network() {
        let artifact = TruffleArtifact::from_json(
            r#"{
                "contractName": "Adoption",
                "abi": [
                    {
                        "name": "adopt",
                        "type": "function",
                        "inputs": [{"name": "petId", "type": "uint256"}],
                        "outputs": [{"name": "", "type": "uint256"}],
                        "stateMutability": "nonpayable"
                    }
                ],
                "networks": {
                    "42": {"address": "0x0102030405060708091011121314151617181920"}
                }
            }"#,
        )
        .expect("valid artifact");

        let descriptor = artifact.descriptor("42").expect("deployed on network 42");
        assert_eq!(descriptor.name, "Adoption");
        assert_eq!(
            descriptor.address,
            "0102030405060708091011121314151617181920".parse().unwrap()
        );

        assert!(matches!(
            artifact.descriptor("1"),
            Err(ArtifactError::NetworkNotFound { network, .. }) if network == "1"
        ));
    }
}
