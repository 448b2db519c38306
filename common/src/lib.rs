#![deny(missing_docs, unsafe_code)]

//! Crate for the contract descriptor types shared between the `contract-rpc`
//! client crate and the `contract-rpc-cli` command line.
//!
//! A [`ContractDescriptor`] pairs the address of one deployed contract with its
//! ABI. Descriptors are either built by hand with a [`DescriptorBuilder`] or
//! loaded from compiled artifacts: [`SolarRepository`] for `solar.*.json`
//! deployment repositories and [`TruffleArtifact`] for truffle build files.

pub mod abiext;
pub mod descriptor;
pub mod errors;
pub mod solar;
pub mod str;
pub mod truffle;

pub use crate::abiext::{FunctionExt, ParamTypeExt};
pub use crate::descriptor::{ContractDescriptor, DescriptorBuilder};
pub use crate::solar::SolarRepository;
pub use crate::truffle::TruffleArtifact;
pub use ethabi::{self as abi, Contract as Abi, StateMutability};
pub use web3::types::Address;
pub use web3::types::H256 as TransactionHash;
